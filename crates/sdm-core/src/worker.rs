//! Segment worker: one byte range `[start, end]` into one part file.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::control::CancelFlag;
use crate::http::{HttpSession, StreamEnd, TransferError};

/// Read-stall timeout for range and media GETs.
pub(crate) const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// A planned part: closed byte interval `[start, end]` at `index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Part {
    pub index: u32,
    pub start: u64,
    pub end: u64,
}

impl Part {
    /// Expected on-disk size of the completed part file.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    pub fn range_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// How a part worker finished (errors are returned separately).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOutcome {
    Completed,
    Cancelled,
}

/// Download one part to `part_path`.
///
/// A part file already at its expected size is trusted: its bytes are counted
/// and no network I/O happens. Any other existing size is overwritten from
/// scratch (its stale bytes are first removed from the shared counter, which
/// was seeded from on-disk sizes). Accepts HTTP 200 or 206; checks the cancel
/// flag between chunks.
pub fn download_part(
    session: &HttpSession,
    url: &str,
    part: &Part,
    part_path: &Path,
    downloaded: &AtomicU64,
    cancel: &CancelFlag,
) -> Result<PartOutcome, TransferError> {
    if let Ok(meta) = std::fs::metadata(part_path) {
        if meta.len() == part.len() {
            downloaded.fetch_add(meta.len(), Ordering::Relaxed);
            return Ok(PartOutcome::Completed);
        }
        if meta.len() > 0 {
            // The shared counter was seeded from on-disk sizes; drop the
            // stale partial bytes before overwriting so it never overcounts.
            let stale = meta.len();
            let _ = downloaded.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| {
                Some(v.saturating_sub(stale))
            });
        }
    }

    let mut file = File::create(part_path).map_err(TransferError::Storage)?;
    let extra = [
        ("Range", part.range_value()),
        ("Accept-Encoding", "identity".to_string()),
    ];
    let end = session.stream_get(url, &extra, READ_TIMEOUT, cancel, |chunk| {
        file.write_all(chunk)?;
        downloaded.fetch_add(chunk.len() as u64, Ordering::Relaxed);
        Ok(())
    })?;

    match end {
        StreamEnd::Completed => Ok(PartOutcome::Completed),
        StreamEnd::Cancelled => Ok(PartOutcome::Cancelled),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn part_len_and_range_header() {
        let p = Part {
            index: 0,
            start: 0,
            end: 249_999,
        };
        assert_eq!(p.len(), 250_000);
        assert_eq!(p.range_value(), "bytes=0-249999");
    }

    #[test]
    fn complete_part_on_disk_skips_network() {
        let dir = tempfile::tempdir().unwrap();
        let part_path = dir.path().join("part_0.tmp");
        std::fs::write(&part_path, vec![7u8; 100]).unwrap();

        let part = Part {
            index: 0,
            start: 0,
            end: 99,
        };
        let downloaded = AtomicU64::new(0);
        let cancel = CancelFlag::new();
        // URL is never contacted: port 9 on localhost would fail if it were.
        let session = HttpSession::for_url("http://127.0.0.1:9/f.bin", &HashMap::new());
        let outcome = download_part(
            &session,
            "http://127.0.0.1:9/f.bin",
            &part,
            &part_path,
            &downloaded,
            &cancel,
        )
        .unwrap();
        assert_eq!(outcome, PartOutcome::Completed);
        assert_eq!(downloaded.load(Ordering::Relaxed), 100);
    }
}
