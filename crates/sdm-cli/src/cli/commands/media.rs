//! `sdm media <manifest-url>` – add a captured HLS stream.

use anyhow::Result;
use sdm_core::manager::TaskManager;
use sdm_core::task::MediaInfo;
use std::path::PathBuf;

use super::parse_headers;

pub async fn run_media(
    manager: &TaskManager,
    manifest_url: &str,
    title: Option<String>,
    source_url: Option<String>,
    folder: Option<PathBuf>,
    headers: &[String],
) -> Result<()> {
    let info = MediaInfo {
        media_type: "hls".to_string(),
        manifest_url: manifest_url.to_string(),
        source_url,
        title,
        headers: parse_headers(headers)?,
    };
    let task = manager.add_media(info, folder).await?;
    println!("Captured stream -> {}", task.dest_path().display());
    Ok(())
}
