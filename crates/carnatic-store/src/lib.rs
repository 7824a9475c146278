//! carnatic-store - SQLite vector index with sqlite-vec
//!
//! This crate persists embedded chunks and answers category-filtered
//! nearest-neighbour queries. KNN runs on the sqlite-vec `vec0` table when
//! the extension registers, and on an exact cosine scan otherwise.

mod schema;
mod sqlite;

pub use sqlite::SqliteStore;

// Re-export schema for testing/migrations
pub use schema::{vec_schema, SCHEMA, SCHEMA_VERSION};
