//! Task model: one URL-addressed download plus its shared runtime state.
//!
//! A `Task` is shared between the manager, the scheduler tick, and the worker
//! thread that runs the actual transfer. Byte progress is an atomic counter;
//! the remaining mutable fields live behind one mutex. The worker thread is
//! cooperative: `pause()` raises the cancel flag and joins with a deadline.

mod schedule;

pub use schedule::Schedule;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::control::CancelFlag;
use crate::http::HttpSession;
use crate::store::{MediaBlob, TaskRecord};

/// High-level task state, stored as a string in the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Scheduled,
    Starting,
    Downloading,
    Paused,
    Completed,
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Starting => "starting",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Paused => "paused",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "queued" => TaskStatus::Queued,
            "scheduled" => TaskStatus::Scheduled,
            "starting" => TaskStatus::Starting,
            "downloading" => TaskStatus::Downloading,
            "paused" => TaskStatus::Paused,
            "completed" => TaskStatus::Completed,
            _ => TaskStatus::Error,
        }
    }

    /// A worker thread is (or is about to be) running.
    pub fn is_active(self) -> bool {
        matches!(self, TaskStatus::Starting | TaskStatus::Downloading)
    }
}

/// Describes a captured media stream; presence selects the HLS pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaInfo {
    pub media_type: String,
    pub manifest_url: String,
    #[serde(default)]
    pub source_url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Segment progress of a media download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaState {
    pub segments_total: u64,
    pub segments_done: u64,
}

/// Mutable task fields; one mutex per task.
#[derive(Debug)]
pub struct TaskState {
    pub status: TaskStatus,
    pub error: Option<String>,
    pub total_size: u64,
    pub schedule: Schedule,
    pub media_state: MediaState,
    pub speed_bps: f64,
}

/// One download job, shared between manager, scheduler, and its worker.
pub struct Task {
    pub url: String,
    pub dest_folder: PathBuf,
    pub filename: String,
    pub threads: u32,
    pub temp_root: PathBuf,
    pub media_info: Option<MediaInfo>,
    pub created_at: i64,
    session: HttpSession,
    downloaded: AtomicU64,
    cancel: CancelFlag,
    state: Mutex<TaskState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Inputs for creating a fresh task.
pub struct NewTask {
    pub url: String,
    pub dest_folder: PathBuf,
    /// Overrides the filename derived from the URL path.
    pub filename: Option<String>,
    pub threads: u32,
    pub temp_root: PathBuf,
    pub headers: HashMap<String, String>,
    pub media_info: Option<MediaInfo>,
}

impl Task {
    pub fn create(new: NewTask) -> Arc<Self> {
        let filename = new.filename.unwrap_or_else(|| match &new.media_info {
            Some(info) => crate::url_model::media_filename(
                info.title.as_deref(),
                info.source_url.as_deref(),
                &info.manifest_url,
            ),
            None => crate::url_model::derive_filename(&new.url),
        });
        let session = HttpSession::for_url(&new.url, &new.headers);
        Arc::new(Self {
            url: new.url,
            dest_folder: new.dest_folder,
            filename,
            threads: new.threads.max(1),
            temp_root: new.temp_root,
            media_info: new.media_info,
            created_at: unix_timestamp(),
            session,
            downloaded: AtomicU64::new(0),
            cancel: CancelFlag::new(),
            state: Mutex::new(TaskState {
                status: TaskStatus::Queued,
                error: None,
                total_size: 0,
                schedule: Schedule::default(),
                media_state: MediaState::default(),
                speed_bps: 0.0,
            }),
            worker: Mutex::new(None),
        })
    }

    /// Rebuild a task from its stored row. Byte progress is recomputed from
    /// the part files on disk, and a status left over from a crashed run
    /// (`starting`/`downloading`) is normalized to `paused`.
    pub fn restore(record: &TaskRecord) -> Arc<Self> {
        let headers = record
            .media
            .as_ref()
            .map(|m| m.info.headers.clone())
            .unwrap_or_default();
        let session = HttpSession::for_url(&record.url, &headers);
        let status = if record.status.is_active() {
            TaskStatus::Paused
        } else {
            record.status
        };
        let task = Self {
            url: record.url.clone(),
            dest_folder: record.dest_folder.clone(),
            filename: record.filename.clone(),
            threads: record.threads.max(1),
            temp_root: record.temp_root.clone(),
            media_info: record.media.as_ref().map(|m| m.info.clone()),
            created_at: record.created_at,
            session,
            downloaded: AtomicU64::new(record.downloaded),
            cancel: CancelFlag::new(),
            state: Mutex::new(TaskState {
                status,
                error: record.error.clone(),
                total_size: record.total_size,
                schedule: record.schedule,
                media_state: record
                    .media
                    .as_ref()
                    .map(|m| m.state)
                    .unwrap_or_default(),
                speed_bps: 0.0,
            }),
            worker: Mutex::new(None),
        };
        let task = Arc::new(task);
        task.recompute_downloaded_from_disk();
        task
    }

    // ---- paths ----

    /// Final artifact path.
    pub fn dest_path(&self) -> PathBuf {
        self.dest_folder.join(&self.filename)
    }

    /// Per-task parts directory, exclusively owned by this task.
    pub fn parts_dir(&self) -> PathBuf {
        self.temp_root.join(format!("{}.parts", self.filename))
    }

    // ---- shared state access ----

    pub(crate) fn session(&self) -> &HttpSession {
        &self.session
    }

    pub(crate) fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub(crate) fn downloaded_counter(&self) -> &AtomicU64 {
        &self.downloaded
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub(crate) fn set_downloaded(&self, bytes: u64) {
        self.downloaded.store(bytes, Ordering::Relaxed);
    }

    /// Sum the sizes of the on-disk part files into `downloaded`, so resumed
    /// and restored tasks report accurate progress.
    pub fn recompute_downloaded_from_disk(&self) -> u64 {
        let mut sum = 0u64;
        if let Ok(entries) = std::fs::read_dir(self.parts_dir()) {
            for entry in entries.flatten() {
                if let Ok(meta) = entry.metadata() {
                    if meta.is_file() {
                        sum += meta.len();
                    }
                }
            }
        }
        self.set_downloaded(sum);
        sum
    }

    pub fn state(&self) -> MutexGuard<'_, TaskState> {
        self.state.lock().unwrap()
    }

    pub fn status(&self) -> TaskStatus {
        self.state().status
    }

    pub fn total_size(&self) -> u64 {
        self.state().total_size
    }

    pub(crate) fn set_status(&self, status: TaskStatus) {
        self.state().status = status;
    }

    /// Replace the schedule after validating it. The next scheduler tick
    /// moves the task into or out of `scheduled` as the window dictates.
    pub fn update_schedule(&self, schedule: Schedule) -> Result<()> {
        schedule.validate()?;
        self.state().schedule = schedule;
        Ok(())
    }

    // ---- lifecycle ----

    /// Start downloading (from queued, scheduled, paused, or error). No-op if
    /// a worker is already active.
    pub fn start(self: &Arc<Self>) {
        {
            let mut st = self.state();
            if st.status.is_active() {
                return;
            }
            st.status = TaskStatus::Starting;
            st.error = None;
        }
        // A previous worker may still be winding down from a pause; give it a
        // moment before reusing the parts directory.
        self.join_worker(Duration::from_millis(250));
        self.cancel.clear();

        let task = Arc::clone(self);
        let handle = std::thread::Builder::new()
            .name(format!("sdm-task-{}", self.filename))
            .spawn(move || task.run())
            .expect("spawn task worker thread");
        *self.worker.lock().unwrap() = Some(handle);
    }

    /// Pause the current download. Sets the cancel flag and joins the worker
    /// with a 1 s deadline; partial state stays on disk.
    pub fn pause(&self) {
        if !self.status().is_active() {
            return;
        }
        self.cancel.set();
        self.join_worker(Duration::from_secs(1));
        let mut st = self.state();
        if st.status.is_active() {
            st.status = TaskStatus::Paused;
            st.speed_bps = 0.0;
        }
    }

    /// Alias of `start` for paused/queued/error tasks.
    pub fn resume(self: &Arc<Self>) {
        if matches!(
            self.status(),
            TaskStatus::Paused | TaskStatus::Queued | TaskStatus::Scheduled | TaskStatus::Error
        ) {
            self.start();
        }
    }

    pub fn is_alive(&self) -> bool {
        self.worker
            .lock()
            .unwrap()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn join_worker(&self, deadline: Duration) {
        let until = Instant::now() + deadline;
        loop {
            let finished = {
                let guard = self.worker.lock().unwrap();
                match guard.as_ref() {
                    Some(h) => h.is_finished(),
                    None => return,
                }
            };
            if finished {
                if let Some(h) = self.worker.lock().unwrap().take() {
                    let _ = h.join();
                }
                return;
            }
            if Instant::now() >= until {
                return;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    fn run(self: Arc<Self>) {
        tracing::info!(url = %self.url, file = %self.filename, "task worker starting");
        let result = if self.media_info.is_some() {
            crate::hls::run_media_task(&self)
        } else {
            crate::downloader::run_file_task(&self)
        };
        if let Err(e) = result {
            let msg = format!("{e:#}");
            tracing::warn!(url = %self.url, error = %msg, "task failed");
            let mut st = self.state();
            st.status = TaskStatus::Error;
            st.error = Some(msg);
            st.speed_bps = 0.0;
        }
    }

    /// Row image of the current state, for persistence and display.
    pub fn snapshot(&self) -> TaskRecord {
        let st = self.state();
        TaskRecord {
            url: self.url.clone(),
            dest_folder: self.dest_folder.clone(),
            filename: self.filename.clone(),
            threads: self.threads,
            total_size: st.total_size,
            downloaded: self.downloaded(),
            status: st.status,
            error: st.error.clone(),
            temp_root: self.temp_root.clone(),
            schedule: st.schedule,
            media: self.media_info.as_ref().map(|info| MediaBlob {
                info: info.clone(),
                state: st.media_state,
            }),
            created_at: self.created_at,
        }
    }
}

/// Periodic transfer-rate sampler: at most one sample per 500 ms.
pub(crate) struct SpeedMeter {
    last_bytes: u64,
    last_at: Instant,
}

impl SpeedMeter {
    pub(crate) fn new(start_bytes: u64) -> Self {
        Self {
            last_bytes: start_bytes,
            last_at: Instant::now(),
        }
    }

    /// Returns bytes/sec when at least 500 ms have passed since the last
    /// sample, else `None`.
    pub(crate) fn sample(&mut self, bytes: u64) -> Option<f64> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_at).as_secs_f64();
        if dt < 0.5 {
            return None;
        }
        let bps = (bytes.saturating_sub(self.last_bytes)) as f64 / dt;
        self.last_at = now;
        self.last_bytes = bytes;
        Some(bps)
    }
}

pub(crate) fn unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
