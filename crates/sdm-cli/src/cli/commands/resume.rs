//! `sdm resume <url>` – resume a paused task.

use anyhow::Result;
use sdm_core::manager::TaskManager;
use std::path::PathBuf;

use super::find_task;

pub async fn run_resume(manager: &TaskManager, url: &str, folder: Option<PathBuf>) -> Result<()> {
    let task = find_task(manager, url, folder)?;
    manager.resume(&task).await?;
    println!("Resumed {}", task.filename);
    Ok(())
}
