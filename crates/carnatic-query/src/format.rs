//! Plain-text rendering of retrieved chunks.

use carnatic_core::Chunk;

/// Rendered in place of an empty result list.
pub const NO_RESULTS: &str = "No results.";

/// Render chunks as `[i] (category | source) text`, 1-indexed, separated by
/// blank lines. Each body is trimmed and cut to `snippet_chars` characters.
pub fn format_chunks<'a, I>(chunks: I, snippet_chars: usize) -> String
where
    I: IntoIterator<Item = &'a Chunk>,
{
    let lines: Vec<String> = chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            let snippet: String = chunk.content.trim().chars().take(snippet_chars).collect();
            format!("[{}] ({} | {}) {}", i + 1, chunk.category(), chunk.source(), snippet)
        })
        .collect();

    if lines.is_empty() {
        NO_RESULTS.to_string()
    } else {
        lines.join("\n\n")
    }
}
