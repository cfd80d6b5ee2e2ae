//! Row types for the task store.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::task::{MediaInfo, MediaState, Schedule, TaskStatus};

/// Media payload persisted as one JSON column so an HLS task restarts as an
/// HLS task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaBlob {
    pub info: MediaInfo,
    #[serde(default)]
    pub state: MediaState,
}

/// One row of the `downloads` table; also the persistable image of a task.
///
/// `PartialEq` lets the manager skip writes for tasks that have not changed
/// since the last persisted snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub url: String,
    pub dest_folder: PathBuf,
    pub filename: String,
    pub threads: u32,
    pub total_size: u64,
    pub downloaded: u64,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub temp_root: PathBuf,
    pub schedule: Schedule,
    pub media: Option<MediaBlob>,
    pub created_at: i64,
}
