//! Tool reports and the prompts built from them.

use carnatic_core::{RetrievalOutcome, ToolId};
use carnatic_query::format_chunks;

/// Outcome of one tool call, labeled with the tool that produced it.
#[derive(Debug)]
pub struct ToolReport {
    pub tool: ToolId,
    pub outcome: RetrievalOutcome,
    snippet_chars: usize,
}

impl ToolReport {
    pub fn new(tool: ToolId, outcome: RetrievalOutcome, snippet_chars: usize) -> Self {
        Self {
            tool,
            outcome,
            snippet_chars,
        }
    }

    pub fn is_error(&self) -> bool {
        self.outcome.is_failed()
    }

    /// Text handed to the language model for this tool.
    pub fn render(&self) -> String {
        match &self.outcome {
            RetrievalOutcome::Failed(e) => format!("Error with {}: {}", self.tool, e),
            other => format!(
                "Results from {}:\n{}",
                self.tool,
                format_chunks(other.chunks(), self.snippet_chars)
            ),
        }
    }
}

fn rendered(reports: &[ToolReport]) -> String {
    reports
        .iter()
        .map(ToolReport::render)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Answer prompt: preamble, retrieved material, closing instruction.
pub fn compose_prompt(question: &str, reports: &[ToolReport]) -> String {
    format!(
        "You are an expert assistant on Carnatic music.\n\
         Answer the following question concisely:\n\
         Question: {}\n\n\
         Retrieved Information from Knowledge Base:\n\
         {}\n\n\
         Please provide a comprehensive answer based on the information above.",
        question,
        rendered(reports)
    )
}

const CRITIC_BRIEF: &str = "You are a critical reviewer of answers about Carnatic music. \
Judge the answer for accuracy, completeness, relevance, clarity, depth, \
and use of the retrieved sources.

Reply in this structure:

SCORE: [1-10]
STRENGTHS: [key strengths]
WEAKNESSES: [what to improve]
CRITIQUE: [detailed analysis]
SUGGESTIONS: [specific recommendations]";

const REFINER_BRIEF: &str = "You revise answers about Carnatic music. \
Using the reviewer's feedback, fix every weakness it names, keep what was \
done well, and cite the retrieved information where it supports the answer. \
Keep the core facts of the original answer.";

pub fn critique_prompt(question: &str, draft: &str, reports: &[ToolReport]) -> String {
    format!(
        "{}\n\nUSER QUESTION: {}\n\nRETRIEVED INFORMATION:\n{}\n\n\
         ANSWER TO EVALUATE:\n{}\n\n\
         Please provide your evaluation of this answer.",
        CRITIC_BRIEF,
        question,
        rendered(reports),
        draft
    )
}

pub fn refine_prompt(question: &str, draft: &str, critique: &str, reports: &[ToolReport]) -> String {
    format!(
        "{}\n\nUSER QUESTION: {}\n\nRETRIEVED INFORMATION:\n{}\n\n\
         ORIGINAL ANSWER:\n{}\n\nREVIEWER FEEDBACK:\n{}\n\n\
         Please write the improved answer.",
        REFINER_BRIEF,
        question,
        rendered(reports),
        draft,
        critique
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnatic_core::{CarnaticError, Category, Chunk, ChunkMetadata, ScoredChunk};

    fn ranked() -> RetrievalOutcome {
        RetrievalOutcome::Ranked(vec![ScoredChunk {
            chunk: Chunk::new(
                "Mayamalavagowla is the 15th melakarta.",
                ChunkMetadata::for_category(Category::Raga, "ragas.pdf"),
            ),
            score: 3.2,
        }])
    }

    #[test]
    fn test_render_success() {
        let report = ToolReport::new(ToolId::RagaIndexTool, ranked(), 800);
        assert_eq!(
            report.render(),
            "Results from raga_index_tool:\n[1] (Raga | ragas.pdf) Mayamalavagowla is the 15th melakarta."
        );
        assert!(!report.is_error());
    }

    #[test]
    fn test_render_no_results() {
        let report = ToolReport::new(ToolId::KrithiTool, RetrievalOutcome::NoResults, 800);
        assert_eq!(report.render(), "Results from krithi_tool:\nNo results.");
    }

    #[test]
    fn test_render_failure() {
        let report = ToolReport::new(
            ToolId::KnowledgeTool,
            RetrievalOutcome::Failed(CarnaticError::index_query("store offline")),
            800,
        );
        assert_eq!(
            report.render(),
            "Error with knowledge_tool: Index query failed: store offline"
        );
        assert!(report.is_error());
    }

    #[test]
    fn test_compose_prompt_layout() {
        let reports = vec![
            ToolReport::new(ToolId::RagaIndexTool, ranked(), 800),
            ToolReport::new(ToolId::KrithiTool, RetrievalOutcome::NoResults, 800),
        ];
        let prompt = compose_prompt("What is Mayamalavagowla?", &reports);

        assert!(prompt.contains("Question: What is Mayamalavagowla?"));
        assert!(prompt.contains(
            "Retrieved Information from Knowledge Base:\nResults from raga_index_tool:\n[1] (Raga | ragas.pdf)"
        ));
        assert!(prompt.contains("melakarta.\nResults from krithi_tool:\nNo results."));
        assert!(prompt.ends_with("Please provide a comprehensive answer based on the information above."));
    }

    #[test]
    fn test_review_prompts_carry_draft_and_feedback() {
        let reports = vec![ToolReport::new(ToolId::RagaIndexTool, ranked(), 800)];

        let critique = critique_prompt("q", "draft answer", &reports);
        assert!(critique.contains("SCORE: [1-10]"));
        assert!(critique.contains("ANSWER TO EVALUATE:\ndraft answer"));

        let refine = refine_prompt("q", "draft answer", "SCORE: 6", &reports);
        assert!(refine.contains("ORIGINAL ANSWER:\ndraft answer"));
        assert!(refine.contains("REVIEWER FEEDBACK:\nSCORE: 6"));
    }
}
