//! Database schema definitions.

/// Main schema SQL for initializing the database.
pub const SCHEMA: &str = r#"
-- Chunks table
CREATE TABLE IF NOT EXISTS chunks (
    id TEXT PRIMARY KEY,
    content TEXT NOT NULL,
    category TEXT NOT NULL,
    source TEXT NOT NULL DEFAULT '',
    page_num INTEGER,
    topic TEXT,
    content_hash BLOB
);

CREATE INDEX IF NOT EXISTS idx_chunks_category ON chunks(category);
CREATE INDEX IF NOT EXISTS idx_chunks_content_hash ON chunks(content_hash);

-- Embeddings, kept outside vec0 so the exact scan works without the extension
CREATE TABLE IF NOT EXISTS embeddings (
    chunk_id TEXT PRIMARY KEY REFERENCES chunks(id) ON DELETE CASCADE,
    category TEXT NOT NULL,
    embedding BLOB NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_embeddings_category ON embeddings(category);

CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Schema for the sqlite-vec virtual table.
///
/// `category` is a metadata column so the category filter is applied inside
/// the KNN search rather than after it.
pub fn vec_schema(dimension: usize) -> String {
    format!(
        r#"
CREATE VIRTUAL TABLE IF NOT EXISTS vec_chunks USING vec0(
    chunk_id TEXT PRIMARY KEY,
    category TEXT,
    embedding float[{dimension}] distance_metric=cosine
);
"#
    )
}

/// Schema version for migrations.
pub const SCHEMA_VERSION: u32 = 1;
