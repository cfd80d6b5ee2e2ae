//! `sdm run` – drive restored and queued tasks until they settle.

use anyhow::Result;
use chrono::Utc;
use sdm_core::manager::TaskManager;
use std::time::Duration;

/// Start everything runnable, then tick the scheduler on a fixed cadence.
/// Exits when all tasks settle (unless `--watch`); Ctrl-C pauses in-flight
/// tasks and persists their state before returning.
pub async fn run_ticks(manager: &TaskManager, interval_ms: u64, watch: bool) -> Result<()> {
    manager.start_all().await?;

    let mut interval = tokio::time::interval(Duration::from_millis(interval_ms.max(50)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                manager.tick(Utc::now()).await?;
                if !watch && manager.all_settled() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted; pausing tasks...");
                break;
            }
        }
    }

    manager.pause_all().await?;
    Ok(())
}
