//! Single-stream fallback for origins without range support or known size.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::http::StreamEnd;
use crate::task::{SpeedMeter, Task, TaskStatus};
use crate::worker::READ_TIMEOUT;

/// Stream the whole body into the destination file.
///
/// Not resumable: the destination is truncated first so a restarted run can
/// never append a second copy of the body. Cancellation between chunks leaves
/// the task `paused`; end of body means `completed`.
pub(super) fn run_single_stream(task: &Arc<Task>) -> Result<()> {
    std::fs::create_dir_all(&task.dest_folder)
        .with_context(|| format!("create folder {}", task.dest_folder.display()))?;
    let dest = task.dest_path();
    let mut file =
        File::create(&dest).with_context(|| format!("create {}", dest.display()))?;

    task.set_downloaded(0);
    task.set_status(TaskStatus::Downloading);
    tracing::debug!(url = %task.url, "single-stream download (no range support or unknown size)");

    let counter = task.downloaded_counter();
    let mut meter = SpeedMeter::new(0);
    let extra = [("Accept-Encoding", "identity".to_string())];
    let end = task
        .session()
        .stream_get(&task.url, &extra, READ_TIMEOUT, task.cancel_flag(), |chunk| {
            file.write_all(chunk)?;
            let bytes = counter.fetch_add(chunk.len() as u64, Ordering::Relaxed)
                + chunk.len() as u64;
            if let Some(bps) = meter.sample(bytes) {
                task.state().speed_bps = bps;
            }
            Ok(())
        })
        .with_context(|| format!("single-stream GET {}", task.url))?;

    file.flush()?;
    let mut st = task.state();
    st.speed_bps = 0.0;
    match end {
        StreamEnd::Cancelled => st.status = TaskStatus::Paused,
        StreamEnd::Completed => st.status = TaskStatus::Completed,
    }
    Ok(())
}
