mod briefing_repository;
mod models;

use crate::errors::Error;
use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use briefing_repository::*;
pub use models::*;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS feeds (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    title TEXT,
    link TEXT NOT NULL,
    published TEXT,
    summary TEXT,
    source TEXT NOT NULL,
    feed_url TEXT,
    fetched_at TEXT NOT NULL,
    scraped_text TEXT,
    summarized_article TEXT,
    UNIQUE (source, link)
);
CREATE TABLE IF NOT EXISTS topics (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT,
    generated_at TEXT NOT NULL,
    summary TEXT
);
CREATE TABLE IF NOT EXISTS topic_feeds (
    topic_id TEXT NOT NULL,
    feed_id INTEGER NOT NULL,
    used_for_summarization BOOLEAN NOT NULL DEFAULT 0,
    PRIMARY KEY (topic_id, feed_id)
);
CREATE TABLE IF NOT EXISTS briefings (
    id TEXT PRIMARY KEY NOT NULL,
    title TEXT,
    generated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS briefing_topics (
    briefing_id TEXT NOT NULL,
    topic_id TEXT NOT NULL,
    PRIMARY KEY (briefing_id, topic_id)
);
CREATE INDEX IF NOT EXISTS idx_feeds_published ON feeds (published);
CREATE INDEX IF NOT EXISTS idx_topics_generated_at ON topics (generated_at);
";

pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Pooled handle to the SQLite store, cheap to clone.
#[derive(Clone, Debug)]
pub struct Database {
    pool: Arc<Pool<ConnectionManager<SqliteConnection>>>,
}

impl Database {
    /// Opens (and creates, if needed) the database at `db_path` and ensures the schema exists.
    ///
    /// `:memory:` keeps a single pooled connection so every caller sees the same data.
    pub fn new(db_path: &str) -> Result<Self, Error> {
        let in_memory = db_path == ":memory:";
        if !in_memory {
            if let Some(parent) = Path::new(db_path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
        }

        let manager = ConnectionManager::<SqliteConnection>::new(db_path);
        let mut builder = Pool::builder();
        if in_memory {
            builder = builder.max_size(1);
        }
        let pool = builder.build(manager)?;

        let db = Database {
            pool: Arc::new(pool),
        };
        db.initialize_schema()?;
        info!("Database ready at {}", db_path);
        Ok(db)
    }

    pub fn get_conn(&self) -> Result<DbConnection, Error> {
        Ok(self.pool.get()?)
    }

    fn initialize_schema(&self) -> Result<(), Error> {
        let mut conn = self.get_conn()?;
        conn.batch_execute(SCHEMA_SQL)?;
        Ok(())
    }
}
