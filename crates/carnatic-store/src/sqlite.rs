//! SQLite-based vector index implementation.

use std::path::Path;
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, info, warn};
use ulid::Ulid;

use carnatic_core::{
    CarnaticError, Chunk, ChunkMetadata, ChunkStore, DatabaseConfig, IndexStats, Result,
};

use crate::schema::{vec_schema, SCHEMA, SCHEMA_VERSION};

static REGISTER_VEC: Once = Once::new();

/// Register sqlite-vec as an auto extension for every connection opened
/// by this process.
fn register_vec_extension() {
    REGISTER_VEC.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite_vec::sqlite3_vec_init as *const (),
        )));
    });
}

/// SQLite-based chunk store.
///
/// Uses a blocking Mutex for thread-safe access and runs SQLite operations
/// on the blocking thread pool via `spawn_blocking`, so a caller's timeout
/// can elapse while a query is in flight.
pub struct SqliteStore {
    /// Connection wrapped in blocking Mutex.
    conn: Arc<Mutex<Connection>>,

    /// Embedding dimension this index was built with.
    dimension: usize,

    /// Whether the sqlite-vec table is available.
    vec_enabled: bool,
}

impl SqliteStore {
    /// Open or create an index at the given path with default settings.
    pub fn open(path: impl AsRef<Path>, dimension: usize) -> Result<Self> {
        let config = DatabaseConfig {
            path: path.as_ref().to_path_buf(),
            ..DatabaseConfig::default()
        };
        Self::open_with_config(&config, dimension)
    }

    /// Open or create an index described by `config`.
    pub fn open_with_config(config: &DatabaseConfig, dimension: usize) -> Result<Self> {
        let path = config.path.as_path();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        register_vec_extension();

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| CarnaticError::database(format!("Failed to open database: {}", e)))?;

        Self::configure_connection(&conn, config)?;
        Self::init(conn, dimension, path)
    }

    /// Open an in-memory index (for testing).
    pub fn open_memory(dimension: usize) -> Result<Self> {
        register_vec_extension();

        let conn = Connection::open_in_memory().map_err(|e| {
            CarnaticError::database(format!("Failed to open in-memory database: {}", e))
        })?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| CarnaticError::database(e.to_string()))?;

        Self::init(conn, dimension, Path::new(":memory:"))
    }

    /// Initialize the schema and check the stored dimension.
    fn init(conn: Connection, dimension: usize, path: &Path) -> Result<Self> {
        if dimension == 0 {
            return Err(CarnaticError::invalid_argument("embedding dimension must be > 0"));
        }

        conn.execute_batch(SCHEMA)
            .map_err(|e| CarnaticError::database(format!("Failed to initialize schema: {}", e)))?;

        Self::check_dimension(&conn, dimension)?;

        let vec_enabled = Self::try_create_vec_table(&conn, dimension);

        if vec_enabled {
            info!("sqlite-vec available - using vec0 for KNN search");
        } else {
            warn!("sqlite-vec not available - falling back to exact cosine scan");
        }

        info!("Index opened at {:?} (dim={})", path, dimension);

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            dimension,
            vec_enabled,
        })
    }

    /// Configure SQLite connection for optimal performance.
    fn configure_connection(conn: &Connection, config: &DatabaseConfig) -> Result<()> {
        let journal = if config.wal_mode { "WAL" } else { "DELETE" };
        conn.execute_batch(&format!(
            r#"
            PRAGMA journal_mode = {journal};
            PRAGMA synchronous = NORMAL;
            PRAGMA cache_size = {cache};
            PRAGMA busy_timeout = {busy};
            PRAGMA temp_store = MEMORY;
            PRAGMA foreign_keys = ON;
            "#,
            cache = config.cache_size,
            busy = config.busy_timeout_ms,
        ))
        .map_err(|e| CarnaticError::database(format!("Failed to configure connection: {}", e)))?;

        Ok(())
    }

    /// Record the dimension on first open; reject a mismatch afterwards.
    fn check_dimension(conn: &Connection, dimension: usize) -> Result<()> {
        let stored: Option<String> = conn
            .query_row(
                "SELECT value FROM index_meta WHERE key = 'dimension'",
                [],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| CarnaticError::database(e.to_string()))?;

        match stored {
            Some(value) => {
                let stored_dim: usize = value
                    .parse()
                    .map_err(|_| CarnaticError::database(format!("corrupt dimension: {}", value)))?;
                if stored_dim != dimension {
                    return Err(CarnaticError::config(format!(
                        "index was built with dimension {}, embedder produces {}",
                        stored_dim, dimension
                    )));
                }
            }
            None => {
                conn.execute(
                    "INSERT INTO index_meta (key, value) VALUES ('dimension', ?1), ('schema_version', ?2)",
                    params![dimension.to_string(), SCHEMA_VERSION.to_string()],
                )
                .map_err(|e| CarnaticError::database(e.to_string()))?;
            }
        }

        Ok(())
    }

    /// Create the vec0 table if the extension is loaded.
    fn try_create_vec_table(conn: &Connection, dimension: usize) -> bool {
        let version: std::result::Result<String, _> =
            conn.query_row("SELECT vec_version()", [], |row| row.get(0));

        match version {
            Ok(v) => {
                debug!("sqlite-vec version {}", v);
                match conn.execute_batch(&vec_schema(dimension)) {
                    Ok(()) => true,
                    Err(e) => {
                        warn!("Failed to create vec table: {}", e);
                        false
                    }
                }
            }
            Err(_) => false,
        }
    }

    /// Check if sqlite-vec KNN is in use.
    pub fn vec_enabled(&self) -> bool {
        self.vec_enabled
    }

    /// Embedding dimension of this index.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Flush the WAL into the main database file.
    pub fn checkpoint(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
                .optional()
                .map_err(|e| CarnaticError::database(e.to_string()))?;
            Ok(())
        })
    }

    /// Execute a blocking operation on the connection in the calling thread.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| CarnaticError::database(e.to_string()))?;
        f(&conn)
    }

    /// Execute a blocking operation on the connection on the blocking
    /// thread pool.
    async fn spawn_with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|e| CarnaticError::database(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| CarnaticError::database(format!("Blocking task failed: {}", e)))?
    }

    /// Force the exact-scan backend (for testing the fallback).
    #[cfg(test)]
    fn without_vec(mut self) -> Self {
        self.vec_enabled = false;
        self
    }
}

#[async_trait]
impl ChunkStore for SqliteStore {
    async fn insert_chunks(&self, chunks: &[Chunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(CarnaticError::invalid_argument(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if let Some(bad) = embeddings.iter().find(|e| e.len() != self.dimension) {
            return Err(CarnaticError::invalid_argument(format!(
                "embedding has dimension {}, index expects {}",
                bad.len(),
                self.dimension
            )));
        }

        let vec_enabled = self.vec_enabled;
        let chunks = chunks.to_vec();
        let embeddings = embeddings.to_vec();

        self.spawn_with_conn(move |conn| {
            let tx = conn
                .transaction()
                .map_err(|e| CarnaticError::database(e.to_string()))?;

            {
                let mut chunk_stmt = tx
                    .prepare(
                        r#"
                        INSERT INTO chunks (id, content, category, source, page_num, topic, content_hash)
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                        "#,
                    )
                    .map_err(|e| CarnaticError::database(e.to_string()))?;

                let mut emb_stmt = tx
                    .prepare(
                        "INSERT INTO embeddings (chunk_id, category, embedding) VALUES (?1, ?2, ?3)",
                    )
                    .map_err(|e| CarnaticError::database(e.to_string()))?;

                for (chunk, embedding) in chunks.iter().zip(&embeddings) {
                    let id = chunk.id.to_string();
                    let bytes = vec_to_bytes(embedding);

                    chunk_stmt
                        .execute(params![
                            id,
                            chunk.content,
                            chunk.metadata.category,
                            chunk.metadata.source,
                            chunk.metadata.page_num,
                            chunk.metadata.topic,
                            chunk.content_hash.map(|h| h.to_vec()),
                        ])
                        .map_err(|e| CarnaticError::database(e.to_string()))?;

                    emb_stmt
                        .execute(params![id, chunk.metadata.category, bytes])
                        .map_err(|e| CarnaticError::database(e.to_string()))?;

                    if vec_enabled {
                        tx.execute(
                            "INSERT INTO vec_chunks (chunk_id, category, embedding) VALUES (?1, ?2, ?3)",
                            params![id, chunk.metadata.category, bytes],
                        )
                        .map_err(|e| CarnaticError::database(e.to_string()))?;
                    }
                }
            }

            tx.commit()
                .map_err(|e| CarnaticError::database(e.to_string()))?;

            debug!("Inserted {} chunks", chunks.len());
            Ok(())
        })
        .await
    }

    async fn get_chunk(&self, id: Ulid) -> Result<Option<Chunk>> {
        self.spawn_with_conn(move |conn| {
            conn.query_row(
                r#"
                SELECT id, content, category, source, page_num, topic, content_hash
                FROM chunks WHERE id = ?1
                "#,
                params![id.to_string()],
                row_to_chunk,
            )
            .optional()
            .map_err(|e| CarnaticError::database(e.to_string()))
        })
        .await
    }

    async fn get_chunks(&self, ids: &[Ulid]) -> Result<Vec<Chunk>> {
        let ids = ids.to_vec();

        self.spawn_with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    r#"
                    SELECT id, content, category, source, page_num, topic, content_hash
                    FROM chunks WHERE id = ?1
                    "#,
                )
                .map_err(|e| CarnaticError::database(e.to_string()))?;

            let mut chunks = Vec::with_capacity(ids.len());
            for id in &ids {
                let chunk = stmt
                    .query_row(params![id.to_string()], row_to_chunk)
                    .optional()
                    .map_err(|e| CarnaticError::database(e.to_string()))?;
                match chunk {
                    Some(c) => chunks.push(c),
                    None => warn!("Chunk {} has an embedding but no row", id),
                }
            }
            Ok(chunks)
        })
        .await
    }

    async fn vector_search(
        &self,
        embedding: &[f32],
        k: u32,
        category: &str,
    ) -> Result<Vec<(Ulid, f32)>> {
        if embedding.len() != self.dimension {
            return Err(CarnaticError::index_query(format!(
                "query embedding has dimension {}, index expects {}",
                embedding.len(),
                self.dimension
            )));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let embedding = embedding.to_vec();
        let category = category.to_string();

        if self.vec_enabled {
            self.spawn_with_conn(move |conn| vec_knn(conn, &embedding, k, &category))
                .await
        } else {
            self.spawn_with_conn(move |conn| exact_scan(conn, &embedding, k, &category))
                .await
        }
    }

    async fn stats(&self) -> Result<IndexStats> {
        let vec_enabled = self.vec_enabled;

        self.spawn_with_conn(move |conn| {
            let chunks: u64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(|e| CarnaticError::database(e.to_string()))?;

            let embeddings: u64 = conn
                .query_row("SELECT COUNT(*) FROM embeddings", [], |row| row.get(0))
                .map_err(|e| CarnaticError::database(e.to_string()))?;

            let mut stmt = conn
                .prepare("SELECT category, COUNT(*) FROM chunks GROUP BY category ORDER BY category")
                .map_err(|e| CarnaticError::database(e.to_string()))?;
            let by_category = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?)))
                .map_err(|e| CarnaticError::database(e.to_string()))?
                .collect::<std::result::Result<_, _>>()
                .map_err(|e| CarnaticError::database(e.to_string()))?;

            // Get page count and page size to estimate storage
            let page_count: u64 = conn
                .query_row("PRAGMA page_count", [], |row| row.get(0))
                .unwrap_or(0);
            let page_size: u64 = conn
                .query_row("PRAGMA page_size", [], |row| row.get(0))
                .unwrap_or(4096);

            Ok(IndexStats {
                chunks,
                embeddings,
                by_category,
                storage_bytes: page_count * page_size,
                vector_backend: if vec_enabled { "sqlite-vec" } else { "exact-scan" }.to_string(),
            })
        })
        .await
    }
}

/// KNN on the vec0 table, filtered by the category metadata column.
fn vec_knn(
    conn: &Connection,
    embedding: &[f32],
    k: u32,
    category: &str,
) -> Result<Vec<(Ulid, f32)>> {
    let embedding_bytes = vec_to_bytes(embedding);

    let mut stmt = conn
        .prepare(
            r#"
            SELECT chunk_id, distance
            FROM vec_chunks
            WHERE embedding MATCH ?1
            AND k = ?2
            AND category = ?3
            ORDER BY distance
            "#,
        )
        .map_err(|e| CarnaticError::index_query(e.to_string()))?;

    let rows = stmt
        .query_map(params![embedding_bytes, k, category], |row| {
            let id_str: String = row.get(0)?;
            let distance: f64 = row.get(1)?;
            Ok((id_str, 1.0 - distance as f32))
        })
        .map_err(|e| CarnaticError::index_query(e.to_string()))?;

    let mut results = Vec::new();
    for row in rows {
        let (id_str, similarity) = row.map_err(|e| CarnaticError::index_query(e.to_string()))?;
        match Ulid::from_string(&id_str) {
            Ok(id) => results.push((id, similarity)),
            Err(_) => warn!("Skipping malformed chunk id {:?}", id_str),
        }
    }
    Ok(results)
}

/// Exact cosine similarity over every embedding of the category.
fn exact_scan(
    conn: &Connection,
    embedding: &[f32],
    k: u32,
    category: &str,
) -> Result<Vec<(Ulid, f32)>> {
    let mut stmt = conn
        .prepare("SELECT chunk_id, embedding FROM embeddings WHERE category = ?1 ORDER BY rowid")
        .map_err(|e| CarnaticError::index_query(e.to_string()))?;

    let rows = stmt
        .query_map(params![category], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
        })
        .map_err(|e| CarnaticError::index_query(e.to_string()))?;

    let mut scored = Vec::new();
    for row in rows {
        let (id_str, bytes) = row.map_err(|e| CarnaticError::index_query(e.to_string()))?;
        let Ok(id) = Ulid::from_string(&id_str) else {
            warn!("Skipping malformed chunk id {:?}", id_str);
            continue;
        };
        let candidate = bytes_to_vec(&bytes);
        scored.push((id, cosine_similarity(embedding, &candidate)));
    }

    // Stable: equal similarities keep insertion order.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k as usize);
    Ok(scored)
}

/// Convert a row to a Chunk.
fn row_to_chunk(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let id_str: String = row.get(0)?;
    let content_hash: Option<Vec<u8>> = row.get(6)?;

    Ok(Chunk {
        id: Ulid::from_string(&id_str).unwrap_or_else(|_| Ulid::nil()),
        content: row.get(1)?,
        metadata: ChunkMetadata {
            category: row.get(2)?,
            source: row.get(3)?,
            page_num: row.get(4)?,
            topic: row.get(5)?,
        },
        content_hash: content_hash.and_then(|v| v.try_into().ok()),
    })
}

/// Convert f32 vector to bytes (little-endian).
fn vec_to_bytes(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Convert little-endian bytes back to an f32 vector.
fn bytes_to_vec(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
