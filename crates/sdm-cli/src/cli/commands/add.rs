//! `sdm add <url>` – add a new download task.

use anyhow::Result;
use sdm_core::manager::{AddOptions, TaskManager};
use std::path::PathBuf;

use super::parse_headers;

pub async fn run_add(
    manager: &TaskManager,
    url: &str,
    folder: Option<PathBuf>,
    filename: Option<String>,
    threads: Option<u32>,
    headers: &[String],
    no_start: bool,
) -> Result<()> {
    let task = manager
        .add(
            url,
            AddOptions {
                folder,
                filename,
                threads,
                headers: parse_headers(headers)?,
                start: if no_start { Some(false) } else { None },
            },
        )
        .await?;
    println!("Added {} -> {}", url, task.dest_path().display());
    Ok(())
}
