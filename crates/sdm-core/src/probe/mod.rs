//! Byte-range capability probing.
//!
//! Determines whether an origin serves range requests and the total resource
//! size, trying HEAD first and falling back to `GET` with `Range: bytes=0-0`
//! for servers that block HEAD.

mod parse;

pub use parse::parse_probe_headers;

use std::time::Duration;

use crate::http::HttpSession;

const HEAD_TIMEOUT: Duration = Duration::from_secs(10);

/// What the origin told us about the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// True if the origin advertises byte-range support.
    pub supports_range: bool,
    /// Total size in bytes, when the origin reports one.
    pub total_size: Option<u64>,
}

/// Probe `url` for range support and size.
///
/// Transport failures are not errors: an unreachable or hostile origin
/// reports `(false, None)` and the download falls back to a single stream.
pub fn probe(session: &HttpSession, url: &str) -> ProbeResult {
    if let Ok((code, lines)) = session.head(url, HEAD_TIMEOUT) {
        if code == 200 || code == 206 {
            return parse_probe_headers(&lines);
        }
    }

    match session.get_probe_headers(url, HEAD_TIMEOUT) {
        Ok((code, lines)) if (200..300).contains(&code) => parse_probe_headers(&lines),
        _ => ProbeResult {
            supports_range: false,
            total_size: None,
        },
    }
}
