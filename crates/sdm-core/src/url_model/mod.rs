//! URL modeling and filename derivation.
//!
//! Derives safe local filenames from the last URL path segment
//! (percent-decoded) or from a media title, sanitized for Linux filesystems.

mod path;
mod sanitize;

pub use path::filename_from_url_path;
pub use sanitize::sanitize_filename_for_linux;

/// Default filename when the URL path yields nothing usable.
const DEFAULT_FILENAME: &str = "download";

/// Derives a safe filename for saving a download.
///
/// Uses the last path segment of `url`, percent-decoded, then sanitized for
/// Linux (no `/`, NUL, or control chars; no leading/trailing dots or spaces).
///
/// # Examples
///
/// - `derive_filename("https://example.com/archive.zip")` → `"archive.zip"`
/// - `derive_filename("https://example.com/my%20file.bin")` → `"my_file.bin"`
/// - `derive_filename("https://example.com/")` → `"download"`
pub fn derive_filename(url: &str) -> String {
    let raw = match filename_from_url_path(url) {
        Some(c) => c,
        None => return DEFAULT_FILENAME.to_string(),
    };

    let sanitized = sanitize_filename_for_linux(&raw);
    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        DEFAULT_FILENAME.to_string()
    } else {
        sanitized
    }
}

/// Filename for a captured media stream: sanitized `title` (or fallback
/// source/manifest URL) forced to a `.ts` extension.
pub fn media_filename(title: Option<&str>, source_url: Option<&str>, manifest_url: &str) -> String {
    let base = match title.filter(|t| !t.trim().is_empty()) {
        Some(t) => {
            let s = sanitize_filename_for_linux(t);
            if s.is_empty() {
                DEFAULT_FILENAME.to_string()
            } else {
                s
            }
        }
        None => derive_filename(source_url.unwrap_or(manifest_url)),
    };
    if base.to_ascii_lowercase().ends_with(".ts") {
        base
    } else {
        format!("{base}.ts")
    }
}
