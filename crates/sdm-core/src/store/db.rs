//! SQLite-backed task catalogue implementation.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::{Path, PathBuf};

use super::types::{MediaBlob, TaskRecord};
use crate::task::{unix_timestamp, Schedule, TaskStatus};

/// Handle to the SQLite-backed task catalogue.
#[derive(Clone)]
pub struct TaskStore {
    pool: Pool<Sqlite>,
}

impl TaskStore {
    /// Open (or create) the database at `path` and run migrations.
    pub async fn open_at(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("create state dir {}", parent.display()))?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("open task database {}", path.display()))?;

        let store = TaskStore { pool };
        store.init().await?;
        Ok(store)
    }

    /// In-memory store; used by tests and throwaway runs.
    pub async fn open_memory() -> Result<Self> {
        // Single connection so the pool cannot hand back a different empty DB.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = TaskStore { pool };
        store.init().await?;
        Ok(store)
    }

    /// Create the base table if missing and add columns introduced after the
    /// first release (`scheduled_start`, `scheduled_end`, `repeat_interval`,
    /// `media_json`).
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                dest_folder TEXT NOT NULL,
                filename TEXT NOT NULL,
                threads INTEGER NOT NULL DEFAULT 4,
                total_size INTEGER NOT NULL DEFAULT 0,
                downloaded INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'queued',
                error TEXT,
                temp_root TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(url, dest_folder)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        let existing: Vec<String> = sqlx::query("PRAGMA table_info(downloads)")
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(|row| row.get::<String, _>("name"))
            .collect();

        let wanted = [
            ("scheduled_start", "TEXT"),
            ("scheduled_end", "TEXT"),
            ("repeat_interval", "INTEGER NOT NULL DEFAULT 0"),
            ("media_json", "TEXT"),
        ];
        for (name, decl) in wanted {
            if !existing.iter().any(|c| c == name) {
                sqlx::query(&format!(
                    "ALTER TABLE downloads ADD COLUMN {} {}",
                    name, decl
                ))
                .execute(&self.pool)
                .await
                .with_context(|| format!("add column {}", name))?;
            }
        }

        Ok(())
    }

    /// Insert or update one task row, keyed by `(url, dest_folder)`.
    pub async fn upsert(&self, rec: &TaskRecord) -> Result<()> {
        let now = unix_timestamp();
        let media_json = rec
            .media
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        sqlx::query(
            r#"
            INSERT INTO downloads (
                url, dest_folder, filename, threads, total_size, downloaded,
                status, error, temp_root,
                scheduled_start, scheduled_end, repeat_interval, media_json,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT(url, dest_folder) DO UPDATE SET
                filename = excluded.filename,
                threads = excluded.threads,
                total_size = excluded.total_size,
                downloaded = excluded.downloaded,
                status = excluded.status,
                error = excluded.error,
                temp_root = excluded.temp_root,
                scheduled_start = excluded.scheduled_start,
                scheduled_end = excluded.scheduled_end,
                repeat_interval = excluded.repeat_interval,
                media_json = excluded.media_json,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&rec.url)
        .bind(path_str(&rec.dest_folder))
        .bind(&rec.filename)
        .bind(rec.threads as i64)
        .bind(rec.total_size as i64)
        .bind(rec.downloaded as i64)
        .bind(rec.status.as_str())
        .bind(&rec.error)
        .bind(path_str(&rec.temp_root))
        .bind(rec.schedule.start.map(|t| t.to_rfc3339()))
        .bind(rec.schedule.end.map(|t| t.to_rfc3339()))
        .bind(rec.schedule.repeat_secs as i64)
        .bind(media_json)
        .bind(rec.created_at)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a task row permanently. File cleanup is the manager's job.
    pub async fn delete(&self, url: &str, dest_folder: &Path) -> Result<()> {
        sqlx::query("DELETE FROM downloads WHERE url = ?1 AND dest_folder = ?2")
            .bind(url)
            .bind(path_str(dest_folder))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All rows with `status != completed`, newest first.
    pub async fn load_unfinished(&self) -> Result<Vec<TaskRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT url, dest_folder, filename, threads, total_size, downloaded,
                   status, error, temp_root,
                   scheduled_start, scheduled_end, repeat_interval, media_json,
                   created_at
            FROM downloads
            WHERE status != 'completed'
            ORDER BY created_at DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(record_from_row(&row));
        }
        Ok(out)
    }

    /// Number of rows in the table (any status).
    pub async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM downloads")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

fn path_str(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

fn parse_rfc3339(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn record_from_row(row: &sqlx::sqlite::SqliteRow) -> TaskRecord {
    let media_json: Option<String> = row.get("media_json");
    let media = media_json
        .as_deref()
        .filter(|s| !s.is_empty())
        .and_then(|s| match serde_json::from_str::<MediaBlob>(s) {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring unreadable media_json column");
                None
            }
        });
    TaskRecord {
        url: row.get("url"),
        dest_folder: PathBuf::from(row.get::<String, _>("dest_folder")),
        filename: row.get("filename"),
        threads: row.get::<i64, _>("threads").max(1) as u32,
        total_size: row.get::<i64, _>("total_size").max(0) as u64,
        downloaded: row.get::<i64, _>("downloaded").max(0) as u64,
        status: TaskStatus::from_str(&row.get::<String, _>("status")),
        error: row.get("error"),
        temp_root: PathBuf::from(row.get::<String, _>("temp_root")),
        schedule: Schedule {
            start: parse_rfc3339(row.get("scheduled_start")),
            end: parse_rfc3339(row.get("scheduled_end")),
            repeat_secs: row.get::<i64, _>("repeat_interval").max(0) as u64,
        },
        media,
        created_at: row.get("created_at"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{MediaInfo, MediaState};
    use chrono::TimeZone;

    fn record(url: &str, folder: &str) -> TaskRecord {
        TaskRecord {
            url: url.to_string(),
            dest_folder: PathBuf::from(folder),
            filename: "file.bin".to_string(),
            threads: 4,
            total_size: 0,
            downloaded: 0,
            status: TaskStatus::Queued,
            error: None,
            temp_root: PathBuf::from("/tmp/sdm-temp"),
            schedule: Schedule::default(),
            media: None,
            created_at: unix_timestamp(),
        }
    }

    #[tokio::test]
    async fn upsert_and_load_roundtrip() {
        let store = TaskStore::open_memory().await.unwrap();
        let mut rec = record("https://example.com/file.bin", "/dl");
        rec.total_size = 1000;
        rec.downloaded = 250;
        rec.status = TaskStatus::Paused;
        rec.error = Some("HTTP 503".to_string());
        store.upsert(&rec).await.unwrap();

        let loaded = store.load_unfinished().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0], rec);
    }

    #[tokio::test]
    async fn key_is_unique_per_url_and_folder() {
        let store = TaskStore::open_memory().await.unwrap();
        let rec = record("https://example.com/f", "/a");
        store.upsert(&rec).await.unwrap();

        // Same key: updates in place.
        let mut again = rec.clone();
        again.downloaded = 10;
        store.upsert(&again).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);

        // Same URL, different folder: separate row.
        let other = record("https://example.com/f", "/b");
        store.upsert(&other).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn load_unfinished_skips_completed_and_orders_newest_first() {
        let store = TaskStore::open_memory().await.unwrap();
        let mut first = record("https://a/f", "/dl");
        first.created_at = 100;
        store.upsert(&first).await.unwrap();

        let mut done = record("https://b/f", "/dl");
        done.created_at = 200;
        done.status = TaskStatus::Completed;
        store.upsert(&done).await.unwrap();

        let mut second = record("https://c/f", "/dl");
        second.created_at = 300;
        store.upsert(&second).await.unwrap();

        let loaded = store.load_unfinished().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].url, "https://c/f");
        assert_eq!(loaded[1].url, "https://a/f");
    }

    #[tokio::test]
    async fn schedule_roundtrips_as_rfc3339() {
        let store = TaskStore::open_memory().await.unwrap();
        let mut rec = record("https://a/f", "/dl");
        rec.schedule = Schedule {
            start: Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()),
            repeat_secs: 86_400,
        };
        store.upsert(&rec).await.unwrap();
        let loaded = store.load_unfinished().await.unwrap();
        assert_eq!(loaded[0].schedule, rec.schedule);
    }

    #[tokio::test]
    async fn media_blob_roundtrips() {
        let store = TaskStore::open_memory().await.unwrap();
        let mut rec = record("https://cdn/x.m3u8", "/dl");
        rec.media = Some(MediaBlob {
            info: MediaInfo {
                media_type: "hls".to_string(),
                manifest_url: "https://cdn/x.m3u8".to_string(),
                source_url: Some("https://site/watch".to_string()),
                title: Some("Show".to_string()),
                headers: Default::default(),
            },
            state: MediaState {
                segments_total: 10,
                segments_done: 3,
            },
        });
        store.upsert(&rec).await.unwrap();
        let loaded = store.load_unfinished().await.unwrap();
        assert_eq!(loaded[0].media, rec.media);
    }

    #[tokio::test]
    async fn delete_removes_row() {
        let store = TaskStore::open_memory().await.unwrap();
        let rec = record("https://a/f", "/dl");
        store.upsert(&rec).await.unwrap();
        store.delete(&rec.url, &rec.dest_folder).await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn migration_adds_schedule_columns_to_legacy_table() {
        // Simulate a database created before the schedule/media columns.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        sqlx::query(
            r#"
            CREATE TABLE downloads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                dest_folder TEXT NOT NULL,
                filename TEXT NOT NULL,
                threads INTEGER NOT NULL DEFAULT 4,
                total_size INTEGER NOT NULL DEFAULT 0,
                downloaded INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'queued',
                error TEXT,
                temp_root TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(url, dest_folder)
            );
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO downloads (url, dest_folder, filename, temp_root, created_at, updated_at)
             VALUES ('https://a/f', '/dl', 'f', '/tmp', 1, 1)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let store = TaskStore { pool };
        store.init().await.unwrap();

        let loaded = store.load_unfinished().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].schedule, Schedule::default());
        assert_eq!(loaded[0].media, None);
    }
}
