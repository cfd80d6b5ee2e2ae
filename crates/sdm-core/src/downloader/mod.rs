//! Single-file segmented download orchestration.
//!
//! Probes the origin, decides segmented vs. single-stream, spawns one worker
//! per remaining part, monitors them on a 250 ms cadence, and merges the
//! parts in index order into the final destination.

mod parts;
mod single;

pub use parts::{merge_parts, part_path, plan_parts};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::probe;
use crate::task::{SpeedMeter, Task, TaskStatus};
use crate::worker::{self, Part, PartOutcome};

const MONITOR_POLL: Duration = Duration::from_millis(250);

/// Run a non-media task to completion, pause, or error.
///
/// Called on the task's worker thread. Pause is signalled through the task's
/// cancel flag; errors bubble up to the caller which records them on the task.
pub(crate) fn run_file_task(task: &Arc<Task>) -> Result<()> {
    // Progress must reflect what is already on disk before any network I/O,
    // so a resumed task reports accurate numbers immediately.
    task.recompute_downloaded_from_disk();

    let probed = probe::probe(task.session(), &task.url);

    // Reconcile with a total size remembered from a previous run; keep the
    // larger value if both are known (the remote file may have grown).
    let prior = task.total_size();
    let reported = probed.total_size.unwrap_or(0);
    let total = if prior > 0 && reported > 0 {
        prior.max(reported)
    } else if reported > 0 {
        reported
    } else {
        prior
    };
    task.state().total_size = total;

    if !probed.supports_range || total == 0 {
        return single::run_single_stream(task);
    }
    run_segmented(task, total)
}

fn run_segmented(task: &Arc<Task>, total_size: u64) -> Result<()> {
    let parts_dir = task.parts_dir();
    std::fs::create_dir_all(&parts_dir)
        .with_context(|| format!("create parts dir {}", parts_dir.display()))?;
    std::fs::create_dir_all(&task.dest_folder)
        .with_context(|| format!("create folder {}", task.dest_folder.display()))?;

    let plan = plan_parts(total_size, task.threads);

    // Parts already at their expected size are trusted and not re-fetched.
    let pending: Vec<Part> = plan
        .iter()
        .filter(|part| {
            let path = part_path(&parts_dir, part.index);
            !matches!(std::fs::metadata(&path), Ok(m) if m.len() == part.len())
        })
        .copied()
        .collect();

    if pending.is_empty() {
        return finish_merge(task, &plan);
    }

    task.set_status(TaskStatus::Downloading);
    tracing::debug!(
        url = %task.url,
        total_size,
        parts = plan.len(),
        remaining = pending.len(),
        "segmented download"
    );

    let mut handles = Vec::with_capacity(pending.len());
    for part in pending {
        let session = task.session().clone();
        let url = task.url.clone();
        let path = part_path(&parts_dir, part.index);
        let cancel = task.cancel_flag().clone();
        let owner = Arc::clone(task);
        let spawned = thread::Builder::new()
            .name(format!("sdm-part-{}", part.index))
            .spawn(move || {
                worker::download_part(
                    &session,
                    &url,
                    &part,
                    &path,
                    owner.downloaded_counter(),
                    &cancel,
                )
            });
        match spawned {
            Ok(handle) => handles.push((part.index, handle)),
            Err(e) => {
                // Stop the workers already launched before giving up.
                task.cancel_flag().set();
                for (_, h) in handles {
                    let _ = h.join();
                }
                return Err(e).context("spawn part worker");
            }
        }
    }

    let mut meter = SpeedMeter::new(task.downloaded());
    loop {
        if handles.iter().all(|(_, h)| h.is_finished()) {
            break;
        }
        if task.cancel_flag().is_set() {
            break;
        }
        thread::sleep(MONITOR_POLL);
        if let Some(bps) = meter.sample(task.downloaded()) {
            task.state().speed_bps = bps;
        }
    }

    // Workers stop at the next chunk boundary after a cancel; join them so
    // the parts directory is quiet before we decide the final state.
    let mut cancelled = false;
    let mut first_error: Option<anyhow::Error> = None;
    for (index, handle) in handles {
        match handle.join() {
            Ok(Ok(PartOutcome::Completed)) => {}
            Ok(Ok(PartOutcome::Cancelled)) => cancelled = true,
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(anyhow::anyhow!("{}", e).context(format!("part {}", index)));
                }
            }
            Err(_) => {
                if first_error.is_none() {
                    first_error = Some(anyhow::anyhow!("part {} worker panicked", index));
                }
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }
    if cancelled || task.cancel_flag().is_set() {
        let mut st = task.state();
        st.status = TaskStatus::Paused;
        st.speed_bps = 0.0;
        tracing::info!(url = %task.url, "download paused; parts kept on disk");
        return Ok(());
    }

    finish_merge(task, &plan)
}

fn finish_merge(task: &Arc<Task>, plan: &[Part]) -> Result<()> {
    let dest = task.dest_path();
    merge_parts(&dest, &task.parts_dir(), plan).context("merge parts")?;
    let mut st = task.state();
    st.status = TaskStatus::Completed;
    st.speed_bps = 0.0;
    drop(st);
    tracing::info!(file = %dest.display(), "download completed");
    Ok(())
}
