//! `sdm remove <url>` – remove a task and its partial state.

use anyhow::Result;
use sdm_core::manager::TaskManager;
use std::path::PathBuf;

use super::find_task;

pub async fn run_remove(manager: &TaskManager, url: &str, folder: Option<PathBuf>) -> Result<()> {
    let task = find_task(manager, url, folder)?;
    manager.remove(&task).await?;
    println!("Removed {}", task.filename);
    Ok(())
}
