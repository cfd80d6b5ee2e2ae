//! Parse probe response header lines into a ProbeResult.

use super::ProbeResult;

/// Extract range support and total size from raw header lines.
///
/// Range support is an `Accept-Ranges` value containing `bytes`
/// (case-insensitive). Size prefers a numeric `Content-Length`; otherwise the
/// `/<total>` suffix of `Content-Range` is used, if numeric.
pub fn parse_probe_headers(lines: &[String]) -> ProbeResult {
    let mut supports_range = false;
    let mut content_length = None;
    let mut content_range_total = None;

    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let value = value.trim();
        if name.eq_ignore_ascii_case("accept-ranges") {
            supports_range = value.to_ascii_lowercase().contains("bytes");
        }
        if name.eq_ignore_ascii_case("content-length") {
            if let Ok(n) = value.parse::<u64>() {
                content_length = Some(n);
            }
        }
        if name.eq_ignore_ascii_case("content-range") {
            if let Some((_, total)) = value.rsplit_once('/') {
                if let Ok(n) = total.trim().parse::<u64>() {
                    content_range_total = Some(n);
                }
            }
        }
    }

    // A 206 probe's Content-Length covers only the 1-byte slice; the
    // Content-Range total is the real size when both are present.
    let total_size = match (content_range_total, content_length) {
        (Some(total), _) => Some(total),
        (None, len) => len,
    };

    ProbeResult {
        supports_range,
        total_size,
    }
}
