//! Keyword-driven tool selection.

use tracing::debug;

use carnatic_core::{SelectionConfig, ToolCall, ToolId, ToolParams};

/// Chooses tools for a question from a keyword rule table.
///
/// Matching is case-insensitive substring search on the raw question.
/// The policy:
///
/// 1. Each rule whose keywords occur in the question adds its tool, in rule
///    order.
/// 2. If more than one tool was chosen, or the fusion phrase occurs, the
///    fusion tool is added.
/// 3. If nothing was chosen, the default tool is used alone.
#[derive(Debug, Clone)]
pub struct ToolSelector {
    config: SelectionConfig,
}

impl ToolSelector {
    pub fn new(mut config: SelectionConfig) -> Self {
        for rule in &mut config.rules {
            for keyword in &mut rule.keywords {
                *keyword = keyword.to_lowercase();
            }
        }
        config.fusion_phrase = config.fusion_phrase.to_lowercase();
        Self { config }
    }

    pub fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Tool identifiers for `question`, in invocation order.
    pub fn select_tools(&self, question: &str) -> Vec<ToolId> {
        let question = question.to_lowercase();
        let mut selected: Vec<ToolId> = Vec::new();

        for rule in &self.config.rules {
            let hit = rule
                .keywords
                .iter()
                .any(|k| !k.is_empty() && question.contains(k.as_str()));
            if hit && !selected.contains(&rule.tool) {
                selected.push(rule.tool);
            }
        }

        let phrase = &self.config.fusion_phrase;
        let phrase_hit = !phrase.is_empty() && question.contains(phrase.as_str());
        if (selected.len() > 1 || phrase_hit) && !selected.contains(&ToolId::MultiSearch) {
            selected.push(ToolId::MultiSearch);
        }

        if selected.is_empty() {
            selected.push(self.config.default_tool);
        }

        debug!("Selected tools: {:?}", selected);
        selected
    }

    /// Tool calls for `question`. The fusion tool is called with the
    /// configured categories and per-category count.
    pub fn select(&self, question: &str) -> Vec<ToolCall> {
        self.select_tools(question)
            .into_iter()
            .map(|tool| ToolCall {
                tool,
                params: self.params_for(tool, question),
            })
            .collect()
    }

    fn params_for(&self, tool: ToolId, question: &str) -> ToolParams {
        match tool {
            ToolId::MultiSearch => ToolParams::MultiSearch {
                query: question.to_string(),
                categories: self.config.fusion_categories.clone(),
                k_each: self.config.fusion_k_each,
            },
            _ => ToolParams::Search {
                query: question.to_string(),
            },
        }
    }
}

impl Default for ToolSelector {
    fn default() -> Self {
        Self::new(SelectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use carnatic_core::SelectionRule;

    use ToolId::*;

    #[test]
    fn test_knowledge_and_raga_trigger_fusion() {
        let selector = ToolSelector::default();
        assert_eq!(
            selector.select_tools("What is raga Mayamalavagowla?"),
            vec![KnowledgeTool, RagaIndexTool, MultiSearch]
        );
    }

    #[test]
    fn test_composition_only() {
        let selector = ToolSelector::default();
        assert_eq!(
            selector.select_tools("Tell me about tala in krithis"),
            vec![KrithiTool]
        );
    }

    #[test]
    fn test_phrase_alone_selects_only_fusion() {
        let selector = ToolSelector::default();
        assert_eq!(selector.select_tools("Carnatic Music"), vec![MultiSearch]);
    }

    #[test]
    fn test_phrase_with_single_tool_adds_fusion() {
        let selector = ToolSelector::default();
        assert_eq!(
            selector.select_tools("Who is the greatest composer in carnatic music?"),
            vec![KrithiTool, MultiSearch]
        );
    }

    #[test]
    fn test_no_match_falls_back_to_default() {
        let selector = ToolSelector::default();
        assert_eq!(selector.select_tools("Hello there"), vec![KnowledgeTool]);
        assert_eq!(selector.select_tools(""), vec![KnowledgeTool]);
    }

    #[test]
    fn test_all_three_categories() {
        let selector = ToolSelector::default();
        assert_eq!(
            selector.select_tools("Explain the raga of this song"),
            vec![KnowledgeTool, RagaIndexTool, KrithiTool, MultiSearch]
        );
    }

    #[test]
    fn test_case_insensitive_and_pure() {
        let selector = ToolSelector::default();
        let a = selector.select_tools("LIST the JANYA ragas");
        let b = selector.select_tools("LIST the JANYA ragas");
        assert_eq!(a, b);
        assert_eq!(a, vec![KnowledgeTool, RagaIndexTool, MultiSearch]);
    }

    #[test]
    fn test_fusion_call_parameters() {
        let selector = ToolSelector::default();
        let calls = selector.select("carnatic music");

        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].params,
            ToolParams::MultiSearch {
                query: "carnatic music".to_string(),
                categories: vec!["Literature".into(), "Raga".into(), "Krithis".into()],
                k_each: 4,
            }
        );
    }

    #[test]
    fn test_rules_are_data() {
        let config = SelectionConfig {
            rules: vec![SelectionRule {
                tool: KrithiTool,
                keywords: vec!["Varnam".to_string()],
            }],
            fusion_phrase: "everything".to_string(),
            default_tool: RagaIndexTool,
            ..SelectionConfig::default()
        };
        let selector = ToolSelector::new(config);

        assert_eq!(selector.select_tools("a varnam"), vec![KrithiTool]);
        assert_eq!(selector.select_tools("what is a raga"), vec![RagaIndexTool]);
        assert_eq!(selector.select_tools("tell me everything"), vec![MultiSearch]);
    }
}
