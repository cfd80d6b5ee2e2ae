use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Global configuration loaded from `~/.config/sdm/config.toml`.
///
/// The core never reads this from ambient state; the CLI resolves it once and
/// passes the resolved paths into `TaskManager`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SdmConfig {
    /// Folder new downloads are saved to. `None` means the current directory
    /// at the time a task is added.
    pub default_folder: Option<PathBuf>,
    /// Parent directory for per-task `parts` directories. `None` means
    /// `~/.local/state/sdm/temp`.
    pub temp_root: Option<PathBuf>,
    /// Worker count for segmented downloads.
    pub threads_per_task: usize,
    /// Start tasks immediately when they are added.
    pub auto_start: bool,
}

impl Default for SdmConfig {
    fn default() -> Self {
        Self {
            default_folder: None,
            temp_root: None,
            threads_per_task: 4,
            auto_start: true,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("sdm")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Default parent for parts directories when the config does not set one.
pub fn default_temp_root() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("sdm")?;
    Ok(xdg_dirs.get_state_home().join("temp"))
}

/// Default path for the task database.
pub fn default_db_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("sdm")?;
    Ok(xdg_dirs.get_state_home().join("downloads.db"))
}

/// Path of the legacy JSON snapshot imported once into an empty database.
pub fn legacy_json_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("sdm")?;
    Ok(xdg_dirs.get_state_home().join("downloads.json"))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SdmConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SdmConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SdmConfig = toml::from_str(&data)?;
    Ok(cfg)
}
