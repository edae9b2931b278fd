#![forbid(unsafe_code)]

//! Persistence layer for the relay: the API-key allow-list and the request
//! audit log. Both tables are owned exclusively by [`RelayStore`]; handlers
//! never touch the connection directly.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use libsql::{Builder, Connection, Row, params};
use serde::Serialize;

/// One row of the `keys` table. Row existence is the entire authorization
/// model: keys carry no scopes, expiry, or rate limits.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKey {
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

/// One row of the append-only `logs` table. Written once per relay request,
/// never updated or deleted.
#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub id: i64,
    pub key_used: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub ip: String,
}

async fn configure_connection(conn: &Connection) -> Result<()> {
    // `PRAGMA journal_mode=WAL` returns the resulting mode as a row, so it
    // must go through `query` rather than `execute`/`execute_batch`, which
    // treat any returned row as an error.
    let mut rows = conn.query("PRAGMA journal_mode=WAL;", params![]).await?;
    rows.next().await?;
    conn.execute("PRAGMA synchronous=NORMAL;", params![])
        .await?;
    Ok(())
}

async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS keys (
            key TEXT PRIMARY KEY,
            created_at TEXT NOT NULL,
            created_by TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            key_used TEXT NOT NULL,
            url TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            ip TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON logs(timestamp);
        "#,
    )
    .await?;
    Ok(())
}

/// Wrapper around the SQLite connection exposing the four relay operations
/// plus the gate's key lookup.
pub struct RelayStore {
    conn: Connection,
    seed_key: String,
}

impl RelayStore {
    /// Opens (and if necessary creates) the database, provisions the schema,
    /// and seeds the protected key. Re-opening an existing database is a
    /// no-op for both steps, so restarts are idempotent.
    pub async fn open(path: &Path, seed_key: &str) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating database directory {}", parent.display()))?;
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening relay DB {}", path.display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;

        let store = Self {
            conn,
            seed_key: seed_key.to_string(),
        };
        store.create_key(seed_key, "bootstrap").await?;
        Ok(store)
    }

    /// The protected key inserted at first startup.
    pub fn seed_key(&self) -> &str {
        &self.seed_key
    }

    /// True when `value` has a matching row. This is the whole auth predicate.
    pub async fn key_exists(&self, value: &str) -> Result<bool> {
        let mut rows = self
            .conn
            .query("SELECT 1 FROM keys WHERE key = ?1", params![value])
            .await?;
        Ok(rows.next().await?.is_some())
    }

    /// Inserts a key. Duplicate values are silently absorbed rather than
    /// treated as a conflict.
    pub async fn create_key(&self, value: &str, created_by: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO keys (key, created_at, created_by) VALUES (?1, ?2, ?3)",
                params![value, Utc::now().to_rfc3339(), created_by],
            )
            .await?;
        Ok(())
    }

    /// Deletes a key and reports whether a row went away. The seed key is
    /// protected: deleting it is a refused no-op.
    pub async fn delete_key(&self, value: &str) -> Result<bool> {
        if value == self.seed_key {
            return Ok(false);
        }
        let affected = self
            .conn
            .execute("DELETE FROM keys WHERE key = ?1", params![value])
            .await?;
        Ok(affected > 0)
    }

    /// Every key, most recently created first.
    pub async fn list_keys(&self) -> Result<Vec<ApiKey>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT key, created_at, created_by
                FROM keys
                ORDER BY created_at DESC, rowid DESC
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![]).await?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            keys.push(row_to_api_key(&row)?);
        }
        Ok(keys)
    }

    /// Appends one audit-log row stamped with the current time.
    pub async fn record_request(&self, key_used: &str, url: &str, ip: &str) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO logs (key_used, url, timestamp, ip)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                params![key_used, url, Utc::now().to_rfc3339(), ip],
            )
            .await?;
        Ok(())
    }

    /// The most recent `limit` audit rows, newest first.
    pub async fn list_recent_logs(&self, limit: u32) -> Result<Vec<LogEntry>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT id, key_used, url, timestamp, ip
                FROM logs
                ORDER BY timestamp DESC, id DESC
                LIMIT ?1
                "#,
            )
            .await?;

        let mut rows = stmt.query(params![limit as i64]).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(row_to_log_entry(&row)?);
        }
        Ok(entries)
    }
}

fn row_to_api_key(row: &Row) -> Result<ApiKey> {
    let created_at: String = row.get(1)?;
    Ok(ApiKey {
        value: row.get(0)?,
        created_at: parse_timestamp(&created_at)?,
        created_by: row.get(2)?,
    })
}

fn row_to_log_entry(row: &Row) -> Result<LogEntry> {
    let timestamp: String = row.get(3)?;
    Ok(LogEntry {
        id: row.get(0)?,
        key_used: row.get(1)?,
        url: row.get(2)?,
        timestamp: parse_timestamp(&timestamp)?,
        ip: row.get(4)?,
    })
}

/// Timestamps are stored as RFC 3339 TEXT so that SQL ordering matches
/// chronological ordering.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("parsing stored timestamp {raw:?}"))?
        .with_timezone(&Utc))
}
