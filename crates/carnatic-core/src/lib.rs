//! carnatic-core - Core types and traits for the Carnatic music assistant
//!
//! This crate provides the domain types, collaborator traits, configuration
//! and error handling shared by the retrieval engine and its providers.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{CarnaticError, Result};
pub use traits::*;
pub use types::*;
