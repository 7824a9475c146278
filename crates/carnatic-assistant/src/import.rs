//! JSON Lines records of pre-chunked content.

use std::io::BufRead;

use serde::{Deserialize, Serialize};

use carnatic_core::{CarnaticError, Category, Chunk, ChunkMetadata, Result};

/// One line of an import file.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImportRecord {
    pub text: String,

    /// Category identifier, matched case-insensitively.
    pub category: String,

    #[serde(alias = "source_file", default)]
    pub source: String,

    #[serde(default)]
    pub page_num: Option<u32>,

    /// Defaults to the category's topic label.
    #[serde(default)]
    pub topic: Option<String>,
}

impl ImportRecord {
    pub fn into_chunk(self) -> Result<Chunk> {
        let category: Category = self.category.parse()?;
        if self.text.trim().is_empty() {
            return Err(CarnaticError::invalid_argument("record has empty text"));
        }

        let mut metadata = ChunkMetadata::for_category(category, &self.source);
        metadata.page_num = self.page_num;
        if self.topic.is_some() {
            metadata.topic = self.topic;
        }

        Ok(Chunk::new(&self.text, metadata))
    }
}

/// Parse every non-blank line of `reader` into a chunk. Errors name the
/// offending line.
pub fn read_records(reader: impl BufRead) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let chunk = serde_json::from_str::<ImportRecord>(&line)
            .map_err(CarnaticError::from)
            .and_then(ImportRecord::into_chunk)
            .map_err(|e| CarnaticError::invalid_argument(format!("line {}: {}", i + 1, e)))?;
        chunks.push(chunk);
    }

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_records() {
        let input = r#"{"text": "Kalyani is the 65th melakarta", "category": "raga", "source_file": "ragas.pdf", "page_num": 3}

{"text": "Endaro Mahanubhavulu", "category": "Krithis", "source": "pancharatna.pdf", "topic": "Pancharatna"}
"#;
        let chunks = read_records(input.as_bytes()).unwrap();
        assert_eq!(chunks.len(), 2);

        assert_eq!(chunks[0].metadata.category, "Raga");
        assert_eq!(chunks[0].metadata.source, "ragas.pdf");
        assert_eq!(chunks[0].metadata.page_num, Some(3));
        assert_eq!(chunks[0].metadata.topic.as_deref(), Some("Carnatic Raga"));

        assert_eq!(chunks[1].metadata.topic.as_deref(), Some("Pancharatna"));
        assert!(chunks[1].content_hash.is_some());
    }

    #[test]
    fn test_unknown_category_names_line() {
        let input = "{\"text\": \"a\", \"category\": \"Raga\"}\n{\"text\": \"b\", \"category\": \"Bhajan\"}\n";
        let err = read_records(input.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = read_records("not json\n".as_bytes()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }
}
