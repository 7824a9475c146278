//! carnatic-assistant - Question answering over the retrieval engine
//!
//! This crate owns the process lifecycle and the outer answer loop:
//!
//! - [`Handle`] loads the index and models once (`init` / `shutdown`)
//! - [`Assistant`] selects tools, runs them in order, and folds failures
//!   into labeled text so partial results still reach the language model
//! - Prompt composition and an optional critique/refine review pass
//! - JSON Lines import of pre-chunked content

mod assistant;
mod handle;
mod import;
mod prompt;

pub use assistant::{Answer, Assistant, Review, ReviewedAnswer};
pub use handle::{Components, Handle};
pub use import::{read_records, ImportRecord};
pub use prompt::{compose_prompt, critique_prompt, refine_prompt, ToolReport};
