//! Durable cycle and raw-frame log (SQLite)
//!
//! Two append-only tables whose layout is shared with external readers:
//!
//! ```text
//! cycle_data(id, timestamp, cycle_number, data)
//! raw_data(id, timestamp, broker, topic, raw_data)
//! ```
//!
//! `timestamp` is local time as `YYYY-MM-DD HH:MM:SS.ffffff`, which sorts
//! lexically in chronological order. `data` is the comma-joined sample list.
//!
//! The database runs in WAL mode behind a small pool, so HTTP readers never
//! block the dispatch task's writes. Writes report success as a `bool` and
//! log failures; reads return `Result` for the API layer to map.

use chrono::{DateTime, Local};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::types::{sort_ascending, CycleRecord, DbStats, RawRecord};

/// `strftime` pattern for stored timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

const MAX_CONNECTIONS: u32 = 4;

const CREATE_CYCLE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cycle_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    cycle_number INTEGER NOT NULL,
    data TEXT NOT NULL
)";

const CREATE_RAW_TABLE: &str = "CREATE TABLE IF NOT EXISTS raw_data (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    broker TEXT NOT NULL,
    topic TEXT NOT NULL,
    raw_data TEXT NOT NULL
)";

const CREATE_CYCLE_TS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_cycle_data_timestamp ON cycle_data(timestamp)";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open database at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Format a wall-clock time the way rows store it.
pub fn format_timestamp(at: &DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Serialize samples to the stored `data` column.
pub fn encode_samples(samples: &[f64]) -> String {
    samples
        .iter()
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Parse a stored `data` column. Unparseable fields are skipped.
pub fn decode_samples(text: &str) -> Vec<f64> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<f64>().ok())
        .collect()
}

#[derive(sqlx::FromRow)]
struct CycleRow {
    id: i64,
    timestamp: String,
    cycle_number: i64,
    data: String,
}

impl From<CycleRow> for CycleRecord {
    fn from(row: CycleRow) -> Self {
        Self {
            id: row.id,
            timestamp: row.timestamp,
            cycle_number: row.cycle_number,
            data: decode_samples(&row.data),
        }
    }
}

#[derive(sqlx::FromRow)]
struct RawRow {
    id: i64,
    timestamp: String,
    broker: String,
    topic: String,
    raw_data: String,
}

impl From<RawRow> for RawRecord {
    fn from(row: RawRow) -> Self {
        Self {
            id: row.id,
            timestamp: row.timestamp,
            broker: row.broker,
            topic: row.topic,
            raw_data: row.raw_data,
        }
    }
}

/// Handle to the cycle/raw log. Cheap to clone (pool inside).
#[derive(Clone, Debug)]
pub struct CycleLog {
    pool: SqlitePool,
    path: PathBuf,
}

impl CycleLog {
    /// Open (creating if missing) the database and ensure both tables exist.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let open_err = |source: sqlx::Error| StorageError::Open {
            path: path.clone(),
            source,
        };

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(open_err)?;

        for ddl in [CREATE_CYCLE_TABLE, CREATE_RAW_TABLE, CREATE_CYCLE_TS_INDEX] {
            sqlx::query(ddl).execute(&pool).await.map_err(open_err)?;
        }

        info!("Cycle log opened at {}", path.display());
        Ok(Self { pool, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Append one cycle stamped with the current time.
    pub async fn save_cycle(&self, cycle_number: i64, samples: &[f64]) -> bool {
        self.save_cycle_at(&Local::now(), cycle_number, samples).await
    }

    /// Append one cycle with an explicit timestamp.
    pub async fn save_cycle_at(
        &self,
        at: &DateTime<Local>,
        cycle_number: i64,
        samples: &[f64],
    ) -> bool {
        let result = sqlx::query(
            "INSERT INTO cycle_data (timestamp, cycle_number, data) VALUES (?, ?, ?)",
        )
        .bind(format_timestamp(at))
        .bind(cycle_number)
        .bind(encode_samples(samples))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(cycle_number, error = %e, "[CycleLog] Failed to save cycle");
                false
            }
        }
    }

    /// Append one raw frame stamped with the current time.
    pub async fn save_raw(&self, broker: &str, topic: &str, hex_payload: &str) -> bool {
        let result = sqlx::query(
            "INSERT INTO raw_data (timestamp, broker, topic, raw_data) VALUES (?, ?, ?, ?)",
        )
        .bind(format_timestamp(&Local::now()))
        .bind(broker)
        .bind(topic)
        .bind(hex_payload)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => true,
            Err(e) => {
                warn!(broker, topic, error = %e, "[CycleLog] Failed to save raw frame");
                false
            }
        }
    }

    /// Delete every row from both tables.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM cycle_data").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM raw_data").execute(&mut *tx).await?;
        tx.commit().await?;
        warn!("[CycleLog] All persisted cycles and raw frames deleted");
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cycle reads
    // ------------------------------------------------------------------

    /// Latest `count` cycles, newest first (store order).
    pub async fn query_latest_cycles(&self, count: i64) -> Result<Vec<CycleRecord>, StorageError> {
        let rows = sqlx::query_as::<_, CycleRow>(
            "SELECT id, timestamp, cycle_number, data FROM cycle_data
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(count.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CycleRecord::from).collect())
    }

    /// Latest `count` cycles, oldest first. This is the order every consumer
    /// of "recent cycles" sees.
    pub async fn latest_cycles_ascending(
        &self,
        count: i64,
    ) -> Result<Vec<CycleRecord>, StorageError> {
        let mut records = self.query_latest_cycles(count).await?;
        sort_ascending(&mut records);
        Ok(records)
    }

    /// Cycles with `start <= timestamp <= end`, oldest first.
    pub async fn query_cycles_by_time(
        &self,
        start: &str,
        end: &str,
    ) -> Result<Vec<CycleRecord>, StorageError> {
        let rows = sqlx::query_as::<_, CycleRow>(
            "SELECT id, timestamp, cycle_number, data FROM cycle_data
             WHERE timestamp BETWEEN ? AND ?
             ORDER BY timestamp ASC, id ASC",
        )
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CycleRecord::from).collect())
    }

    /// Up to `limit` of the newest cycles with `id > after_id`, oldest first.
    pub async fn cycles_after(
        &self,
        after_id: i64,
        limit: i64,
    ) -> Result<Vec<CycleRecord>, StorageError> {
        let rows = sqlx::query_as::<_, CycleRow>(
            "SELECT id, timestamp, cycle_number, data FROM cycle_data
             WHERE id > ?
             ORDER BY timestamp DESC, id DESC
             LIMIT ?",
        )
        .bind(after_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        let mut records: Vec<CycleRecord> = rows.into_iter().map(CycleRecord::from).collect();
        sort_ascending(&mut records);
        Ok(records)
    }

    /// One page of cycles, newest first (history browsing).
    pub async fn query_cycles_page(
        &self,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<CycleRecord>, StorageError> {
        let rows = sqlx::query_as::<_, CycleRow>(
            "SELECT id, timestamp, cycle_number, data FROM cycle_data
             ORDER BY timestamp DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(CycleRecord::from).collect())
    }

    /// Highest cycle id, or 0 for an empty table.
    pub async fn max_cycle_id(&self) -> Result<i64, StorageError> {
        let max: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM cycle_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(max.unwrap_or(0))
    }

    pub async fn count_cycles(&self) -> Result<i64, StorageError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cycle_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    // ------------------------------------------------------------------
    // Raw reads and diagnostics
    // ------------------------------------------------------------------

    pub async fn count_raw(&self) -> Result<i64, StorageError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_data")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    /// One page of raw frames, newest first.
    pub async fn query_raw_page(&self, limit: i64, offset: i64) -> Result<Vec<RawRecord>, StorageError> {
        let rows = sqlx::query_as::<_, RawRow>(
            "SELECT id, timestamp, broker, topic, raw_data FROM raw_data
             ORDER BY timestamp DESC, id DESC
             LIMIT ? OFFSET ?",
        )
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(RawRecord::from).collect())
    }

    pub async fn db_stats(&self) -> Result<DbStats, StorageError> {
        let (earliest, latest): (Option<String>, Option<String>) =
            sqlx::query_as("SELECT MIN(timestamp), MAX(timestamp) FROM cycle_data")
                .fetch_one(&self.pool)
                .await?;

        Ok(DbStats {
            cycle_count: self.count_cycles().await?,
            raw_count: self.count_raw().await?,
            latest_cycle: latest,
            earliest_cycle: earliest,
        })
    }

    /// User tables in the database file.
    pub async fn table_names(&self) -> Result<Vec<String>, StorageError> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Close the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
