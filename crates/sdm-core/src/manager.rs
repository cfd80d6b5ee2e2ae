//! Task manager façade: registry, persistence, scheduling, and lifecycle.
//!
//! Owns the in-memory task registry (one mutex) and the durable store. All
//! status and schedule changes are persisted by diffing each task's snapshot
//! against the last written row, so workers never touch the database.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::request::Request;
use crate::store::{TaskRecord, TaskStore};
use crate::scheduler;
use crate::task::{MediaInfo, NewTask, Schedule, Task, TaskStatus};

/// Resolved settings injected into the manager (no ambient globals).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    pub default_folder: PathBuf,
    pub temp_root: PathBuf,
    pub threads_per_task: u32,
    pub auto_start: bool,
}

struct Entry {
    task: Arc<Task>,
    last_saved: Option<TaskRecord>,
}

/// Façade over store, registry, and scheduler.
pub struct TaskManager {
    store: TaskStore,
    cfg: ManagerConfig,
    tasks: Mutex<Vec<Entry>>,
}

/// Options for adding a plain download.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    pub folder: Option<PathBuf>,
    pub filename: Option<String>,
    pub threads: Option<u32>,
    pub headers: HashMap<String, String>,
    /// Overrides the configured auto-start for this task.
    pub start: Option<bool>,
}

impl TaskManager {
    /// Build a manager over an initialized store, then reconcile unfinished
    /// rows from disk into the registry.
    pub async fn open(store: TaskStore, cfg: ManagerConfig) -> Result<Self> {
        let manager = Self {
            store,
            cfg,
            tasks: Mutex::new(Vec::new()),
        };
        manager.reconcile().await?;
        Ok(manager)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.cfg
    }

    /// Snapshot of all registered tasks, registry order (newest last).
    pub fn tasks(&self) -> Vec<Arc<Task>> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .map(|e| Arc::clone(&e.task))
            .collect()
    }

    /// Find a registered task by its identity key.
    pub fn find(&self, url: &str, folder: &Path) -> Option<Arc<Task>> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|e| e.task.url == url && e.task.dest_folder == folder)
            .map(|e| Arc::clone(&e.task))
    }

    /// Create, persist, and (optionally) start a plain download task.
    pub async fn add(&self, url: &str, opts: AddOptions) -> Result<Arc<Task>> {
        let folder = opts.folder.unwrap_or_else(|| self.cfg.default_folder.clone());
        if self.find(url, &folder).is_some() {
            anyhow::bail!("task already exists for {} in {}", url, folder.display());
        }
        let task = Task::create(NewTask {
            url: url.to_string(),
            dest_folder: folder,
            filename: opts.filename,
            threads: opts.threads.unwrap_or(self.cfg.threads_per_task),
            temp_root: self.cfg.temp_root.clone(),
            headers: opts.headers,
            media_info: None,
        });
        self.register_and_persist(&task).await?;
        if opts.start.unwrap_or(self.cfg.auto_start) {
            task.start();
        }
        Ok(task)
    }

    /// Create, persist, and (optionally) start a media task.
    pub async fn add_media(&self, info: MediaInfo, folder: Option<PathBuf>) -> Result<Arc<Task>> {
        let folder = folder.unwrap_or_else(|| self.cfg.default_folder.clone());
        if self.find(&info.manifest_url, &folder).is_some() {
            anyhow::bail!(
                "task already exists for {} in {}",
                info.manifest_url,
                folder.display()
            );
        }
        let headers = info.headers.clone();
        let task = Task::create(NewTask {
            url: info.manifest_url.clone(),
            dest_folder: folder,
            filename: None,
            threads: 1,
            temp_root: self.cfg.temp_root.clone(),
            headers,
            media_info: Some(info),
        });
        self.register_and_persist(&task).await?;
        if self.cfg.auto_start {
            task.start();
        }
        Ok(task)
    }

    /// Accept one bridge/CLI payload. Duplicate requests against a
    /// non-completed task are dropped and return `Ok(None)`.
    pub async fn enqueue_from_request(&self, request: Request) -> Result<Option<Arc<Task>>> {
        match request {
            Request::Download { url, filename, headers } => {
                if self.has_unfinished(|t| t.media_info.is_none() && t.url == url) {
                    tracing::info!(%url, "skipped duplicate download request");
                    return Ok(None);
                }
                let task = self
                    .add(
                        &url,
                        AddOptions {
                            filename,
                            headers,
                            ..AddOptions::default()
                        },
                    )
                    .await?;
                Ok(Some(task))
            }
            Request::Media {
                manifest_url,
                media_type,
                source_url,
                title,
                headers,
            } => {
                if self.has_unfinished(|t| {
                    t.media_info
                        .as_ref()
                        .is_some_and(|m| m.manifest_url == manifest_url)
                }) {
                    tracing::info!(%manifest_url, "skipped duplicate media manifest");
                    return Ok(None);
                }
                let info = MediaInfo {
                    media_type,
                    manifest_url,
                    source_url,
                    title,
                    headers,
                };
                let task = self.add_media(info, None).await?;
                Ok(Some(task))
            }
        }
    }

    fn has_unfinished(&self, matches: impl Fn(&Task) -> bool) -> bool {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .any(|e| matches(&e.task) && e.task.status() != TaskStatus::Completed)
    }

    /// Pause a running task and persist the result.
    pub async fn pause(&self, task: &Arc<Task>) -> Result<()> {
        task.pause();
        self.persist_dirty().await
    }

    /// Resume (restart) a paused, queued, or errored task.
    pub async fn resume(&self, task: &Arc<Task>) -> Result<()> {
        task.resume();
        self.persist_dirty().await
    }

    /// Stop a task, delete its parts directory, drop it from the registry,
    /// and remove its store row.
    pub async fn remove(&self, task: &Arc<Task>) -> Result<()> {
        task.pause();
        let parts_dir = task.parts_dir();
        if parts_dir.exists() {
            if let Err(e) = std::fs::remove_dir_all(&parts_dir) {
                tracing::warn!(dir = %parts_dir.display(), error = %e, "parts dir not removed");
            }
        }
        self.tasks
            .lock()
            .unwrap()
            .retain(|e| !Arc::ptr_eq(&e.task, task));
        self.store.delete(&task.url, &task.dest_folder).await?;
        tracing::info!(url = %task.url, "task removed");
        Ok(())
    }

    /// Validate and apply a new schedule, then persist.
    pub async fn set_schedule(&self, task: &Arc<Task>, schedule: Schedule) -> Result<()> {
        task.update_schedule(schedule)?;
        self.persist_dirty().await
    }

    /// One scheduler pass over every task. Persisted-field changes are
    /// written before this returns.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<()> {
        for task in self.tasks() {
            let plan = {
                let mut st = task.state();
                let status = st.status;
                scheduler::plan(status, &mut st.schedule, now)
            };
            if plan.pause_running && task.status().is_active() {
                tracing::info!(file = %task.filename, "scheduled stop");
                task.pause();
            }
            if let Some(status) = plan.set_status {
                task.set_status(status);
            }
            if plan.start {
                tracing::info!(file = %task.filename, "scheduled start");
                task.start();
            }
        }
        self.persist_dirty().await
    }

    /// Start every task that is not already running or completed.
    pub async fn start_all(&self) -> Result<()> {
        for task in self.tasks() {
            if !matches!(
                task.status(),
                TaskStatus::Downloading | TaskStatus::Starting | TaskStatus::Completed
            ) {
                task.start();
            }
        }
        self.persist_dirty().await
    }

    /// Pause every running task (also the shutdown path).
    pub async fn pause_all(&self) -> Result<()> {
        for task in self.tasks() {
            task.pause();
        }
        self.persist_dirty().await
    }

    /// Drop completed tasks from the registry and their store rows.
    pub async fn clear_completed(&self) -> Result<()> {
        let done: Vec<Arc<Task>> = self
            .tasks()
            .into_iter()
            .filter(|t| t.status() == TaskStatus::Completed)
            .collect();
        for task in &done {
            self.tasks
                .lock()
                .unwrap()
                .retain(|e| !Arc::ptr_eq(&e.task, task));
            self.store.delete(&task.url, &task.dest_folder).await?;
        }
        Ok(())
    }

    /// True when no registered task is running or eligible to run later.
    pub fn all_settled(&self) -> bool {
        self.tasks().iter().all(|t| {
            matches!(
                t.status(),
                TaskStatus::Completed | TaskStatus::Error | TaskStatus::Paused
            ) && !t.is_alive()
                && t.state().schedule.is_empty()
        })
    }

    async fn register_and_persist(&self, task: &Arc<Task>) -> Result<()> {
        let record = task.snapshot();
        self.store.upsert(&record).await?;
        self.tasks.lock().unwrap().push(Entry {
            task: Arc::clone(task),
            last_saved: Some(record),
        });
        Ok(())
    }

    /// Write every task whose snapshot differs from the last persisted row.
    pub async fn persist_dirty(&self) -> Result<()> {
        let dirty: Vec<TaskRecord> = {
            let entries = self.tasks.lock().unwrap();
            entries
                .iter()
                .filter_map(|e| {
                    let snap = e.task.snapshot();
                    (e.last_saved.as_ref() != Some(&snap)).then_some(snap)
                })
                .collect()
        };
        for record in dirty {
            self.store.upsert(&record).await?;
            let mut entries = self.tasks.lock().unwrap();
            if let Some(entry) = entries
                .iter_mut()
                .find(|e| e.task.url == record.url && e.task.dest_folder == record.dest_folder)
            {
                entry.last_saved = Some(record);
            }
        }
        Ok(())
    }

    /// Load unfinished rows and rebuild the registry.
    ///
    /// A row whose destination file already exists at (or beyond) its known
    /// total size is marked completed and not registered. A row is restored
    /// when its parts directory still exists or the destination is absent.
    async fn reconcile(&self) -> Result<()> {
        let records = self.store.load_unfinished().await?;
        let mut restored = 0usize;
        for record in records {
            let dest = record.dest_folder.join(&record.filename);
            let file_complete = record.total_size > 0
                && std::fs::metadata(&dest)
                    .map(|m| m.len() >= record.total_size)
                    .unwrap_or(false);
            if file_complete {
                let mut done = record.clone();
                done.status = TaskStatus::Completed;
                self.store.upsert(&done).await?;
                continue;
            }

            let parts_dir = record
                .temp_root
                .join(format!("{}.parts", record.filename));
            if !parts_dir.exists() && dest.exists() {
                // Partially written destination with no parts to resume from;
                // leave the row alone rather than clobber the file.
                continue;
            }

            let task = Task::restore(&record);
            tracing::info!(
                url = %task.url,
                status = task.status().as_str(),
                downloaded = task.downloaded(),
                "restored task"
            );
            self.tasks.lock().unwrap().push(Entry {
                task,
                last_saved: Some(record),
            });
            restored += 1;
        }
        if restored > 0 {
            tracing::info!(count = restored, "restored unfinished tasks");
        }
        // Registry order: newest first from the store; keep oldest first here.
        self.tasks.lock().unwrap().reverse();
        Ok(())
    }
}
