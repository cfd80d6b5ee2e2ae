//! CLI for the SDM download manager.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use sdm_core::config;
use sdm_core::manager::{ManagerConfig, TaskManager};
use sdm_core::store::{import_legacy_json, TaskStore};
use std::path::PathBuf;

use commands::{
    run_add, run_media, run_pause, run_remove, run_resume, run_schedule, run_status, run_ticks,
};

/// Top-level CLI for the SDM download manager.
#[derive(Debug, Parser)]
#[command(name = "sdm")]
#[command(about = "SDM: segmented download manager with scheduling and HLS capture", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Add a new download task.
    Add {
        /// Direct HTTP/HTTPS URL to download.
        url: String,
        /// Folder where the file will be saved (default: configured folder, else current directory).
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
        /// Save under this filename instead of the one derived from the URL.
        #[arg(long, value_name = "NAME")]
        filename: Option<String>,
        /// Worker count for the segmented download.
        #[arg(long, value_name = "N")]
        threads: Option<u32>,
        /// Extra request header, `Name: value`. May be repeated.
        #[arg(long = "header", value_name = "HEADER")]
        headers: Vec<String>,
        /// Add without starting, even when auto-start is configured.
        #[arg(long)]
        no_start: bool,
    },

    /// Add a captured HLS stream by manifest URL.
    Media {
        /// Manifest (playlist) URL.
        manifest_url: String,
        /// Title used to derive the output filename.
        #[arg(long)]
        title: Option<String>,
        /// Page the stream was captured from.
        #[arg(long, value_name = "URL")]
        source_url: Option<String>,
        /// Folder where the file will be saved.
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
        /// Extra request header, `Name: value`. May be repeated.
        #[arg(long = "header", value_name = "HEADER")]
        headers: Vec<String>,
    },

    /// Show status of all tasks.
    Status,

    /// Pause a task.
    Pause {
        /// Task URL (or manifest URL for media tasks).
        url: String,
        /// Folder the task downloads into (default: configured folder).
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
    },

    /// Resume a paused, queued, or errored task.
    Resume {
        url: String,
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
    },

    /// Remove a task, its parts directory, and its store row.
    Remove {
        url: String,
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
    },

    /// Set or clear a task's schedule window.
    Schedule {
        url: String,
        #[arg(long, value_name = "DIR")]
        folder: Option<PathBuf>,
        /// Window start, RFC 3339 (e.g. 2026-03-01T09:00:00Z).
        #[arg(long, value_name = "WHEN")]
        start: Option<String>,
        /// Window end, RFC 3339.
        #[arg(long, value_name = "WHEN")]
        end: Option<String>,
        /// Repeat interval in seconds (0 = one-shot).
        #[arg(long, default_value = "0", value_name = "SECS")]
        repeat: u64,
        /// Remove any existing schedule.
        #[arg(long)]
        clear: bool,
    },

    /// Run restored and queued tasks, ticking the scheduler until all settle.
    Run {
        /// Scheduler tick cadence in milliseconds.
        #[arg(long, default_value = "300", value_name = "MS")]
        interval_ms: u64,
        /// Keep running after all tasks settle (wait for schedules/Ctrl-C).
        #[arg(long)]
        watch: bool,
    },
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        let store = TaskStore::open_at(&config::default_db_path()?).await?;
        import_legacy_json(&store, &config::legacy_json_path()?).await?;

        let default_folder = match cfg.default_folder {
            Some(dir) => dir,
            None => std::env::current_dir()?,
        };
        let temp_root = match cfg.temp_root {
            Some(dir) => dir,
            None => config::default_temp_root()?,
        };
        let manager = TaskManager::open(
            store,
            ManagerConfig {
                default_folder,
                temp_root,
                threads_per_task: cfg.threads_per_task as u32,
                auto_start: cfg.auto_start,
            },
        )
        .await?;

        match cli.command {
            CliCommand::Add {
                url,
                folder,
                filename,
                threads,
                headers,
                no_start,
            } => run_add(&manager, &url, folder, filename, threads, &headers, no_start).await?,
            CliCommand::Media {
                manifest_url,
                title,
                source_url,
                folder,
                headers,
            } => run_media(&manager, &manifest_url, title, source_url, folder, &headers).await?,
            CliCommand::Status => run_status(&manager)?,
            CliCommand::Pause { url, folder } => run_pause(&manager, &url, folder).await?,
            CliCommand::Resume { url, folder } => run_resume(&manager, &url, folder).await?,
            CliCommand::Remove { url, folder } => run_remove(&manager, &url, folder).await?,
            CliCommand::Schedule {
                url,
                folder,
                start,
                end,
                repeat,
                clear,
            } => run_schedule(&manager, &url, folder, start, end, repeat, clear).await?,
            CliCommand::Run { interval_ms, watch } => {
                run_ticks(&manager, interval_ms, watch).await?
            }
        }

        Ok(())
    }
}
