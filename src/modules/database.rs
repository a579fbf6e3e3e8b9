use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{migrate::MigrateDatabase, sqlite::SqliteRow, Pool, Row, Sqlite, SqlitePool};
use std::str::FromStr;

use crate::modules::error::Result;

/// One analysed frame. Written once, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureRecord {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub description: String,
    pub goal: Option<String>,
    pub nudge: Option<String>,
}

/// Append-only SQLite log of analysed frames.
pub struct SessionStore {
    pub pool: Pool<Sqlite>,
}

impl SessionStore {
    pub async fn open(db_path: &str) -> Result<Self> {
        if !Sqlite::database_exists(db_path).await.unwrap_or(false) {
            Sqlite::create_database(db_path).await?;
        }

        let pool = SqlitePool::connect(db_path).await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    /// Private database that lives as long as the store. A single pinned
    /// connection keeps every query on the same in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;
        Ok(store)
    }

    async fn initialize_schema(&self) -> Result<()> {
        let schema = r#"
        CREATE TABLE IF NOT EXISTS captures (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp INTEGER NOT NULL,
            image_description TEXT NOT NULL,
            current_goal TEXT,
            nudge TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_captures_timestamp ON captures(timestamp);
        "#;

        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn insert(&self, record: &CaptureRecord) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO captures (timestamp, image_description, current_goal, nudge)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(record.timestamp)
        .bind(&record.description)
        .bind(&record.goal)
        .bind(&record.nudge)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// The `limit` newest records, newest first.
    pub async fn recent(&self, limit: u32) -> Result<Vec<CaptureRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, image_description, current_goal, nudge
            FROM captures
            ORDER BY timestamp DESC, id DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Everything strictly newer than `cutoff_ms`, newest first.
    pub async fn newer_than(&self, cutoff_ms: i64) -> Result<Vec<CaptureRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, image_description, current_goal, nudge
            FROM captures
            WHERE timestamp > ?1
            ORDER BY timestamp DESC, id DESC
            "#,
        )
        .bind(cutoff_ms)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    /// Context window for an analysis call: bounded by age and by count.
    pub async fn recent_window(&self, cutoff_ms: i64, limit: u32) -> Result<Vec<CaptureRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT timestamp, image_description, current_goal, nudge
            FROM captures
            WHERE timestamp > ?1
            ORDER BY timestamp DESC, id DESC
            LIMIT ?2
            "#,
        )
        .bind(cutoff_ms)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }

    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS total FROM captures")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("total")?)
    }

    /// Returns how many records were removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM captures").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

fn record_from_row(row: &SqliteRow) -> Result<CaptureRecord> {
    Ok(CaptureRecord {
        timestamp: row.try_get("timestamp")?,
        description: row.try_get("image_description")?,
        goal: row.try_get("current_goal")?,
        nudge: row.try_get("nudge")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(timestamp: i64, description: &str) -> CaptureRecord {
        CaptureRecord {
            timestamp,
            description: description.to_string(),
            goal: Some("write report".to_string()),
            nudge: None,
        }
    }

    #[tokio::test]
    async fn insert_and_read_newest_first() {
        let store = SessionStore::in_memory().await.unwrap();
        for (ts, desc) in [(1_000, "a"), (3_000, "c"), (2_000, "b")] {
            store.insert(&record(ts, desc)).await.unwrap();
        }

        let recent = store.recent(2).await.unwrap();
        let descriptions: Vec<&str> = recent.iter().map(|r| r.description.as_str()).collect();
        assert_eq!(descriptions, vec!["c", "b"]);
        assert_eq!(store.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn nullable_fields_survive() {
        let store = SessionStore::in_memory().await.unwrap();
        let stored = CaptureRecord {
            timestamp: 5,
            description: "user editing a document".to_string(),
            goal: None,
            nudge: Some("Stay focused on your report".to_string()),
        };
        store.insert(&stored).await.unwrap();
        assert_eq!(store.recent(10).await.unwrap(), vec![stored]);
    }

    #[tokio::test]
    async fn window_is_bounded_by_age_and_count() {
        let store = SessionStore::in_memory().await.unwrap();
        for ts in 1..=10 {
            store.insert(&record(ts * 1_000, &format!("r{}", ts))).await.unwrap();
        }

        let newer = store.newer_than(7_000).await.unwrap();
        assert_eq!(newer.len(), 3);
        assert!(newer.iter().all(|r| r.timestamp > 7_000));

        let window = store.recent_window(2_000, 5).await.unwrap();
        let stamps: Vec<i64> = window.iter().map(|r| r.timestamp).collect();
        assert_eq!(stamps, vec![10_000, 9_000, 8_000, 7_000, 6_000]);

        let window = store.recent_window(8_500, 5).await.unwrap();
        assert_eq!(window.len(), 2);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let store = SessionStore::in_memory().await.unwrap();
        store.insert(&record(1, "a")).await.unwrap();
        store.insert(&record(2, "b")).await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert_eq!(store.count().await.unwrap(), 0);
        assert!(store.recent(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn file_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lockin.db");
        let path = path.to_str().unwrap();

        {
            let store = SessionStore::open(path).await.unwrap();
            store.insert(&record(42, "kept")).await.unwrap();
            store.pool.close().await;
        }

        let store = SessionStore::open(path).await.unwrap();
        let records = store.recent(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "kept");
    }
}
