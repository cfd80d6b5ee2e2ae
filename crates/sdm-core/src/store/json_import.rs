//! One-time import of the legacy JSON task snapshot.
//!
//! Earlier releases kept the catalogue as a JSON array. When that file still
//! exists and the SQLite table is empty, its non-completed entries are
//! imported once; the JSON file is left untouched as a backup.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use super::db::TaskStore;
use super::types::{MediaBlob, TaskRecord};
use crate::task::{unix_timestamp, MediaInfo, MediaState, Schedule, TaskStatus};

/// Task entry as the legacy snapshot serialized it.
#[derive(Debug, Deserialize)]
struct LegacyTask {
    url: String,
    dest_folder: PathBuf,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default = "default_threads")]
    threads: u32,
    #[serde(default)]
    total_size: u64,
    #[serde(default)]
    downloaded: u64,
    #[serde(default = "default_status")]
    status: String,
    #[serde(default)]
    error: Option<String>,
    #[serde(default = "default_temp_root")]
    temp_root: PathBuf,
    #[serde(default)]
    scheduled_start: Option<String>,
    #[serde(default)]
    scheduled_end: Option<String>,
    #[serde(default)]
    repeat_interval: u64,
    #[serde(default)]
    media_info: Option<MediaInfo>,
    #[serde(default)]
    media_state: Option<MediaState>,
}

fn default_threads() -> u32 {
    4
}

fn default_status() -> String {
    "paused".to_string()
}

fn default_temp_root() -> PathBuf {
    PathBuf::from("data/temp")
}

/// Import `json_path` into `store` if the file exists and the table is empty.
/// Completed entries are skipped. Returns the number of rows imported.
pub async fn import_legacy_json(store: &TaskStore, json_path: &Path) -> Result<u64> {
    if !json_path.exists() {
        return Ok(0);
    }
    if store.count().await? > 0 {
        return Ok(0);
    }

    let data = std::fs::read_to_string(json_path)
        .with_context(|| format!("read legacy snapshot {}", json_path.display()))?;
    let entries: Vec<LegacyTask> = serde_json::from_str(&data)
        .with_context(|| format!("parse legacy snapshot {}", json_path.display()))?;

    let mut imported = 0u64;
    for entry in entries {
        if entry.status == "completed" {
            continue;
        }
        let record = record_from_legacy(entry);
        store.upsert(&record).await?;
        imported += 1;
    }
    if imported > 0 {
        tracing::info!(count = imported, from = %json_path.display(), "imported legacy JSON catalogue");
    }
    Ok(imported)
}

fn record_from_legacy(entry: LegacyTask) -> TaskRecord {
    let filename = entry
        .filename
        .filter(|f| !f.is_empty())
        .unwrap_or_else(|| match &entry.media_info {
            Some(info) => crate::url_model::media_filename(
                info.title.as_deref(),
                info.source_url.as_deref(),
                &info.manifest_url,
            ),
            None => crate::url_model::derive_filename(&entry.url),
        });
    let media = entry.media_info.map(|info| MediaBlob {
        info,
        state: entry.media_state.unwrap_or_default(),
    });
    TaskRecord {
        url: entry.url,
        dest_folder: entry.dest_folder,
        filename,
        threads: entry.threads.max(1),
        total_size: entry.total_size,
        downloaded: entry.downloaded,
        status: TaskStatus::from_str(&entry.status),
        error: entry.error,
        temp_root: entry.temp_root,
        schedule: Schedule {
            start: parse_lenient(entry.scheduled_start.as_deref()),
            end: parse_lenient(entry.scheduled_end.as_deref()),
            repeat_secs: entry.repeat_interval,
        },
        media,
        created_at: unix_timestamp(),
    }
}

fn parse_lenient(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn imports_non_completed_entries_once() {
        let dir = tempfile::tempdir().unwrap();
        let json_path = dir.path().join("downloads.json");
        std::fs::write(
            &json_path,
            r#"[
                {"url": "https://a/one.bin", "dest_folder": "/dl", "status": "paused",
                 "total_size": 100, "downloaded": 40},
                {"url": "https://a/two.bin", "dest_folder": "/dl", "status": "completed"},
                {"url": "https://cdn/x.m3u8", "dest_folder": "/dl", "status": "queued",
                 "media_info": {"media_type": "hls", "manifest_url": "https://cdn/x.m3u8"}}
            ]"#,
        )
        .unwrap();

        let store = TaskStore::open_memory().await.unwrap();
        let imported = import_legacy_json(&store, &json_path).await.unwrap();
        assert_eq!(imported, 2);

        let rows = store.load_unfinished().await.unwrap();
        assert_eq!(rows.len(), 2);
        let media_row = rows.iter().find(|r| r.url.ends_with(".m3u8")).unwrap();
        assert!(media_row.media.is_some());
        assert_eq!(media_row.filename, "x.m3u8.ts");

        // Second call is a no-op: table is no longer empty.
        let imported = import_legacy_json(&store, &json_path).await.unwrap();
        assert_eq!(imported, 0);
    }

    #[tokio::test]
    async fn missing_file_is_fine() {
        let store = TaskStore::open_memory().await.unwrap();
        let imported = import_legacy_json(&store, Path::new("/nonexistent/downloads.json"))
            .await
            .unwrap();
        assert_eq!(imported, 0);
    }
}
