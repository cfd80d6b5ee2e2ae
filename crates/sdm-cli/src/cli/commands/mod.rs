//! One module per subcommand.

mod add;
mod media;
mod pause;
mod remove;
mod resume;
mod run;
mod schedule;
mod status;

pub use add::run_add;
pub use media::run_media;
pub use pause::run_pause;
pub use remove::run_remove;
pub use resume::run_resume;
pub use run::run_ticks;
pub use schedule::run_schedule;
pub use status::run_status;

use anyhow::Result;
use sdm_core::manager::TaskManager;
use sdm_core::task::Task;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Resolve a task by URL and (optional) folder, defaulting to the configured
/// download folder.
pub(crate) fn find_task(
    manager: &TaskManager,
    url: &str,
    folder: Option<PathBuf>,
) -> Result<Arc<Task>> {
    let folder = folder.unwrap_or_else(|| manager.config().default_folder.clone());
    manager
        .find(url, &folder)
        .ok_or_else(|| anyhow::anyhow!("no task for {} in {}", url, folder.display()))
}

/// Parse repeated `Name: value` header flags.
pub(crate) fn parse_headers(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut out = HashMap::new();
    for h in raw {
        let Some((name, value)) = h.split_once(':') else {
            anyhow::bail!("invalid header {:?} (expected \"Name: value\")", h);
        };
        out.insert(name.trim().to_string(), value.trim().to_string());
    }
    Ok(out)
}
