//! `sdm schedule <url>` – set or clear a task's schedule window.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sdm_core::manager::TaskManager;
use sdm_core::task::Schedule;
use std::path::PathBuf;

use super::find_task;

pub async fn run_schedule(
    manager: &TaskManager,
    url: &str,
    folder: Option<PathBuf>,
    start: Option<String>,
    end: Option<String>,
    repeat: u64,
    clear: bool,
) -> Result<()> {
    let task = find_task(manager, url, folder)?;

    let schedule = if clear {
        Schedule::default()
    } else {
        Schedule {
            start: parse_when(start.as_deref())?,
            end: parse_when(end.as_deref())?,
            repeat_secs: repeat,
        }
    };
    manager.set_schedule(&task, schedule).await?;
    if schedule.is_empty() {
        println!("Schedule cleared for {}", task.filename);
    } else {
        println!("Scheduled {}", task.filename);
    }
    Ok(())
}

fn parse_when(value: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    value
        .map(|s| {
            DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .with_context(|| format!("invalid RFC 3339 timestamp {:?}", s))
        })
        .transpose()
}
