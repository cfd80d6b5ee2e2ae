//! Capture-request payloads handed to the manager by a bridge or CLI.
//!
//! The transport (local HTTP bridge, CLI flags) lives outside the core; this
//! is only the payload contract. `kind` discriminates the variants.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One enqueue request from an external source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Request {
    /// Plain file download.
    Download {
        url: String,
        #[serde(default)]
        filename: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    /// Captured streaming-media manifest.
    Media {
        manifest_url: String,
        #[serde(default = "default_media_type")]
        media_type: String,
        #[serde(default)]
        source_url: Option<String>,
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

fn default_media_type() -> String {
    "hls".to_string()
}
