//! Question answering over the retrieval tools.

use tracing::{info, warn};

use carnatic_core::{CarnaticError, Result, RetrievalOutcome, ToolCall, ToolId, ToolParams};
use carnatic_query::{CategorySearchTool, MultiSearchTool};

use crate::handle::Handle;
use crate::prompt::{compose_prompt, critique_prompt, refine_prompt, ToolReport};

/// A generated answer with the material it was built from.
#[derive(Debug)]
pub struct Answer {
    pub text: String,
    pub tools: Vec<ToolReport>,
    pub prompt: String,
}

/// Result of the critique/refine pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Review {
    pub critique: String,

    /// The refined answer, or the draft when refinement failed.
    pub refined: String,

    /// Whether `refined` came from a successful refinement.
    pub applied: bool,
}

#[derive(Debug)]
pub struct ReviewedAnswer {
    pub answer: Answer,
    pub review: Review,
}

/// Answers questions by selecting tools, retrieving, and prompting the
/// language model.
#[derive(Clone)]
pub struct Assistant {
    handle: Handle,
}

impl Assistant {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    pub fn into_handle(self) -> Handle {
        self.handle
    }

    /// Tool calls the selector picks for `question`.
    pub fn select(&self, question: &str) -> Vec<ToolCall> {
        self.handle.selector().select(question)
    }

    /// Invoke one tool. Never fails; failures are carried in the report.
    pub async fn run_tool(&self, call: &ToolCall) -> ToolReport {
        let ctx = self.handle.retrieval();
        let config = ctx.config();

        let outcome = match (&call.params, call.tool) {
            (ToolParams::MultiSearch { query, categories, k_each }, ToolId::MultiSearch) => {
                MultiSearchTool::from_config(config)
                    .search(ctx, query, categories, *k_each)
                    .await
            }
            (ToolParams::Search { query }, tool) => {
                match CategorySearchTool::from_config(tool, config) {
                    Ok(search) => search.search(ctx, query).await,
                    Err(e) => {
                        RetrievalOutcome::Failed(CarnaticError::tool(tool.name(), e.to_string()))
                    }
                }
            }
            (params, tool) => RetrievalOutcome::Failed(CarnaticError::tool(
                tool.name(),
                format!("unexpected parameters: {:?}", params),
            )),
        };

        ToolReport::new(call.tool, outcome, config.snippet_chars)
    }

    /// Select tools for `question` and run them one after another in
    /// selection order.
    pub async fn run_tools(&self, question: &str) -> Vec<ToolReport> {
        let calls = self.select(question);
        info!(
            "Running tools: {:?}",
            calls.iter().map(|c| c.tool.name()).collect::<Vec<_>>()
        );

        let mut reports = Vec::with_capacity(calls.len());
        for call in &calls {
            let report = self.run_tool(call).await;
            if report.is_error() {
                warn!("{}", report.render());
            }
            reports.push(report);
        }
        reports
    }

    /// Retrieve and generate an answer. Only a language model failure is
    /// returned as an error; tool failures are folded into the prompt.
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let llm = self.handle.llm()?;
        let tools = self.run_tools(question).await;
        let prompt = compose_prompt(question, &tools);

        info!("Asking {} ({} prompt chars)", llm.model_name(), prompt.len());

        let text = llm.generate(&prompt).await?;

        Ok(Answer {
            text,
            tools,
            prompt,
        })
    }

    /// Like [`Assistant::answer`], with errors rendered as `"Error: ..."`.
    pub async fn answer_text(&self, question: &str) -> String {
        match self.answer(question).await {
            Ok(answer) => answer.text,
            Err(e) => format!("Error: {}", e),
        }
    }

    /// Critique `draft`, then refine it using the critique.
    pub async fn review(&self, question: &str, draft: &str, reports: &[ToolReport]) -> Review {
        let critique = match self.generate(&critique_prompt(question, draft, reports)).await {
            Ok(critique) => critique,
            Err(e) => {
                warn!("Critique failed: {}", e);
                format!("Critique failed: {}", e)
            }
        };

        match self
            .generate(&refine_prompt(question, draft, &critique, reports))
            .await
        {
            Ok(refined) => Review {
                critique,
                refined,
                applied: true,
            },
            Err(e) => {
                warn!("Refinement failed, keeping draft: {}", e);
                Review {
                    critique,
                    refined: draft.to_string(),
                    applied: false,
                }
            }
        }
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        self.handle.llm()?.generate(prompt).await
    }

    /// Answer, then review the answer.
    pub async fn answer_reviewed(&self, question: &str) -> Result<ReviewedAnswer> {
        let answer = self.answer(question).await?;
        let review = self.review(question, &answer.text, &answer.tools).await;
        Ok(ReviewedAnswer { answer, review })
    }
}
