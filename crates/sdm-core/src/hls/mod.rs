//! HLS media pipeline: manifest → variant selection → sequential segments.
//!
//! Segments are fetched strictly in playlist order and appended to a single
//! `.downloading` temp file, which is atomically renamed over the destination
//! on success. Media downloads are not resumable: a paused run restarts from
//! segment zero.

mod playlist;

pub use playlist::{best_variant, parse, Playlist, Variant};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::http::StreamEnd;
use crate::task::{MediaState, SpeedMeter, Task, TaskStatus};
use crate::worker::READ_TIMEOUT;

const PLAYLIST_TIMEOUT: Duration = Duration::from_secs(15);

/// Temp-file suffix used while the media pipeline is appending segments.
pub const DOWNLOADING_SUFFIX: &str = ".downloading";

#[derive(Debug, Error)]
pub enum HlsError {
    #[error("Invalid HLS playlist")]
    InvalidPlaylist,
    #[error("Playlist has no segments")]
    NoSegments,
    #[error("Unsupported playlist feature: {0}")]
    Unsupported(&'static str),
    #[error("invalid URI in playlist: {0}")]
    BadUri(String),
    #[error("master playlist did not resolve to a media playlist")]
    NestedMaster,
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),
}

/// Path of the temp output file for a media task.
pub fn downloading_path(task: &Task) -> PathBuf {
    let mut s = task.dest_path().into_os_string();
    s.push(DOWNLOADING_SUFFIX);
    PathBuf::from(s)
}

/// Run a media task to completion, pause, or error. Called on the task's
/// worker thread; `media_info` must be present.
pub(crate) fn run_media_task(task: &Arc<Task>) -> Result<()> {
    let Some(info) = task.media_info.as_ref() else {
        anyhow::bail!("media task without media info");
    };

    if !info.media_type.eq_ignore_ascii_case("hls") {
        return Err(HlsError::UnsupportedMediaType(info.media_type.clone()).into());
    }

    // Media runs restart from scratch; reset progress before any I/O.
    task.set_downloaded(0);
    {
        let mut st = task.state();
        st.total_size = 0;
        st.speed_bps = 0.0;
        st.media_state = MediaState::default();
    }

    let extra: Vec<(&str, String)> = info
        .headers
        .iter()
        .map(|(k, v)| (k.as_str(), v.clone()))
        .collect();

    let manifest_url = if info.manifest_url.is_empty() {
        task.url.clone()
    } else {
        info.manifest_url.clone()
    };

    let segments = match fetch_playlist(task, &manifest_url, &extra)? {
        Playlist::Media(segments) => segments,
        Playlist::Master(variants) => {
            // One level of indirection only: the chosen variant must itself
            // be a media playlist.
            let best = best_variant(&variants).ok_or(HlsError::NoSegments)?;
            tracing::debug!(
                bandwidth = best.bandwidth,
                uri = %best.uri,
                "selected highest-bandwidth variant"
            );
            match fetch_playlist(task, &best.uri, &extra)? {
                Playlist::Media(segments) => segments,
                Playlist::Master(_) => return Err(HlsError::NestedMaster.into()),
            }
        }
    };

    {
        let mut st = task.state();
        st.media_state.segments_total = segments.len() as u64;
        st.media_state.segments_done = 0;
    }

    std::fs::create_dir_all(&task.dest_folder)
        .with_context(|| format!("create folder {}", task.dest_folder.display()))?;
    let temp_path = downloading_path(task);
    let mut out = File::create(&temp_path)
        .with_context(|| format!("create {}", temp_path.display()))?;

    task.set_status(TaskStatus::Downloading);
    let counter = task.downloaded_counter();
    let mut meter = SpeedMeter::new(0);

    for (done, segment_url) in segments.iter().enumerate() {
        if task.cancel_flag().is_set() {
            pause(task);
            return Ok(());
        }
        let end = task
            .session()
            .stream_get(segment_url, &extra, READ_TIMEOUT, task.cancel_flag(), |chunk| {
                out.write_all(chunk)?;
                counter.fetch_add(chunk.len() as u64, Ordering::Relaxed);
                Ok(())
            })
            .with_context(|| format!("fetch segment {}", segment_url))?;
        if end == StreamEnd::Cancelled {
            pause(task);
            return Ok(());
        }
        let mut st = task.state();
        st.media_state.segments_done = (done + 1) as u64;
        drop(st);
        if let Some(bps) = meter.sample(task.downloaded()) {
            task.state().speed_bps = bps;
        }
    }

    out.flush()?;
    drop(out);
    std::fs::rename(&temp_path, task.dest_path()).with_context(|| {
        format!(
            "rename {} to {}",
            temp_path.display(),
            task.dest_path().display()
        )
    })?;

    let mut st = task.state();
    st.status = TaskStatus::Completed;
    st.speed_bps = 0.0;
    drop(st);
    tracing::info!(file = %task.dest_path().display(), "media download completed");
    Ok(())
}

fn fetch_playlist(
    task: &Task,
    manifest_url: &str,
    extra: &[(&str, String)],
) -> Result<Playlist> {
    let base = Url::parse(manifest_url)
        .map_err(|_| HlsError::BadUri(manifest_url.to_string()))?;
    let text = task
        .session()
        .fetch_text(manifest_url, extra, PLAYLIST_TIMEOUT)
        .with_context(|| format!("fetch playlist {}", manifest_url))?;
    Ok(parse(&text, &base)?)
}

/// Pause leaves the temp file in place; the next run restarts from segment 0.
fn pause(task: &Task) {
    let mut st = task.state();
    st.status = TaskStatus::Paused;
    st.speed_bps = 0.0;
}
