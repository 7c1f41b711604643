//! SQLite lookaside cache for paper records.
//!
//! A single table keyed by paper id, storing the serialized record plus
//! a write timestamp. Writes are atomic upserts — last-write-wins, no
//! versioning — so independent runs sharing the store cannot interleave
//! partial state. The pool holds one connection, which also serializes
//! writers.

use std::str::FromStr;

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};

use crate::errors::Result;
use crate::models::PaperRecord;

/// Durable key/value store mapping paper id to its last-known record.
/// Survives process restarts.
#[derive(Debug, Clone)]
pub struct PaperCache {
    pool: SqlitePool,
}

impl PaperCache {
    /// Open the cache database at `url`, creating the file and schema if
    /// missing. Accepts `sqlite://path/to/cache.db` or `sqlite::memory:`.
    pub async fn connect(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS papers (
                id TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                fetched_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    /// Last-known record for `id`, if any.
    pub async fn get(&self, id: &str) -> Result<Option<PaperRecord>> {
        let row = sqlx::query("SELECT record FROM papers WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let json: String = row.get("record");
                Ok(Some(serde_json::from_str(&json)?))
            }
            None => Ok(None),
        }
    }

    /// Upsert `record` keyed by its paper id, stamping the write time.
    pub async fn put(&self, record: &PaperRecord) -> Result<()> {
        let json = serde_json::to_string(record)?;
        sqlx::query(
            r#"
            INSERT INTO papers (id, record, fetched_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(id) DO UPDATE SET
                record = excluded.record,
                fetched_at = excluded.fetched_at
            "#,
        )
        .bind(&record.paper_id)
        .bind(&json)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
