//! `sdm pause <url>` – pause a running task.

use anyhow::Result;
use sdm_core::manager::TaskManager;
use std::path::PathBuf;

use super::find_task;

pub async fn run_pause(manager: &TaskManager, url: &str, folder: Option<PathBuf>) -> Result<()> {
    let task = find_task(manager, url, folder)?;
    manager.pause(&task).await?;
    println!("Paused {}", task.filename);
    Ok(())
}
