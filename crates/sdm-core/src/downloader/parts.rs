//! Part planning and merge for segmented transfers.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::http::CHUNK_SIZE;
use crate::worker::Part;

/// Path of the part file for `index` inside a task's parts directory.
pub fn part_path(parts_dir: &Path, index: u32) -> PathBuf {
    parts_dir.join(format!("part_{}.tmp", index))
}

/// Split `total_size` bytes across `threads` workers.
///
/// `part_size = ceil(total_size / threads)`; worker `i` covers the closed
/// interval `[i * part_size, min((i + 1) * part_size - 1, total_size - 1)]`.
/// When the resource is smaller than the worker count, trailing workers have
/// no bytes to cover and are not planned.
pub fn plan_parts(total_size: u64, threads: u32) -> Vec<Part> {
    if total_size == 0 || threads == 0 {
        return Vec::new();
    }
    let threads = threads as u64;
    let part_size = total_size.div_ceil(threads);

    let mut out = Vec::with_capacity(threads as usize);
    for i in 0..threads {
        let start = i * part_size;
        if start >= total_size {
            break;
        }
        let end = (start + part_size - 1).min(total_size - 1);
        out.push(Part {
            index: i as u32,
            start,
            end,
        });
    }
    out
}

/// Merge part files in ascending index order into `dest`, streaming 64 KiB at
/// a time. Each part file is deleted after it has been appended; the parts
/// directory itself is removed once empty.
pub fn merge_parts(dest: &Path, parts_dir: &Path, parts: &[Part]) -> Result<()> {
    let mut out = File::create(dest)
        .with_context(|| format!("create destination {}", dest.display()))?;
    let mut buf = vec![0u8; CHUNK_SIZE];

    for part in parts {
        let path = part_path(parts_dir, part.index);
        let mut src = File::open(&path)
            .with_context(|| format!("open part file {}", path.display()))?;
        loop {
            let n = src.read(&mut buf)?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
        }
        drop(src);
        std::fs::remove_file(&path)
            .with_context(|| format!("remove merged part {}", path.display()))?;
    }
    out.flush()?;
    drop(out);

    if std::fs::remove_dir(parts_dir).is_err() {
        tracing::debug!(dir = %parts_dir.display(), "parts directory not removed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_parts_even_million() {
        let parts = plan_parts(1_000_000, 4);
        assert_eq!(parts.len(), 4);
        for (i, p) in parts.iter().enumerate() {
            assert_eq!(p.index, i as u32);
            assert_eq!(p.len(), 250_000);
        }
        assert_eq!(parts[0].start, 0);
        assert_eq!(parts[3].end, 999_999);
    }

    #[test]
    fn plan_parts_uneven_tail() {
        let parts = plan_parts(10, 3);
        // ceil(10/3) = 4: 0-3, 4-7, 8-9
        assert_eq!(parts.len(), 3);
        assert_eq!((parts[0].start, parts[0].end), (0, 3));
        assert_eq!((parts[1].start, parts[1].end), (4, 7));
        assert_eq!((parts[2].start, parts[2].end), (8, 9));
    }

    #[test]
    fn plan_parts_more_threads_than_bytes() {
        let parts = plan_parts(2, 4);
        assert_eq!(parts.len(), 2);
        assert_eq!((parts[0].start, parts[0].end), (0, 0));
        assert_eq!((parts[1].start, parts[1].end), (1, 1));
    }

    #[test]
    fn plan_parts_zero() {
        assert!(plan_parts(0, 4).is_empty());
    }

    #[test]
    fn merge_in_order_and_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let parts_dir = dir.path().join("f.bin.parts");
        std::fs::create_dir_all(&parts_dir).unwrap();

        let parts = plan_parts(9, 3);
        std::fs::write(part_path(&parts_dir, 0), b"aaa").unwrap();
        std::fs::write(part_path(&parts_dir, 1), b"bbb").unwrap();
        std::fs::write(part_path(&parts_dir, 2), b"ccc").unwrap();

        let dest = dir.path().join("f.bin");
        merge_parts(&dest, &parts_dir, &parts).unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"aaabbbccc");
        assert!(!parts_dir.exists());
    }
}
