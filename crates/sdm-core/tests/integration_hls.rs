//! Integration tests for the HLS pipeline: master variant selection,
//! sequential assembly, and playlist rejection.

mod common;

use common::http_server::start;
use sdm_core::task::{MediaInfo, NewTask, Task, TaskStatus};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn media_task(manifest_url: &str, dir: &Path, title: &str) -> Arc<Task> {
    Task::create(NewTask {
        url: manifest_url.to_string(),
        dest_folder: dir.join("downloads"),
        filename: None,
        threads: 1,
        temp_root: dir.join("temp"),
        headers: HashMap::new(),
        media_info: Some(MediaInfo {
            media_type: "hls".to_string(),
            manifest_url: manifest_url.to_string(),
            source_url: None,
            title: Some(title.to_string()),
            headers: HashMap::new(),
        }),
    })
}

fn wait_until<F: Fn() -> bool>(what: &str, timeout: Duration, cond: F) {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return;
        }
        std::thread::sleep(Duration::from_millis(25));
    }
    panic!("timed out waiting for {}", what);
}

#[test]
fn master_playlist_selects_highest_bandwidth_variant() {
    let seg_a = vec![0xA1u8; 4096];
    let seg_b = vec![0xB2u8; 2048];
    let seg_c = vec![0xC3u8; 1024];
    let master = concat!(
        "#EXTM3U\n",
        "#EXT-X-STREAM-INF:BANDWIDTH=500000,RESOLUTION=640x360\n",
        "low.m3u8\n",
        "#EXT-X-STREAM-INF:BANDWIDTH=1200000,RESOLUTION=1280x720\n",
        "high.m3u8\n",
    );
    // The low variant exists but must never be fetched.
    let low = "#EXTM3U\n#EXTINF:4,\nwrong.ts\n";
    let high = "#EXTM3U\n#EXTINF:4,\na.ts\n#EXTINF:4,\nb.ts\n#EXTINF:4,\nc.ts\n#EXT-X-ENDLIST\n";

    let base = start(vec![
        ("/live/master.m3u8", master.as_bytes().to_vec()),
        ("/live/low.m3u8", low.as_bytes().to_vec()),
        ("/live/high.m3u8", high.as_bytes().to_vec()),
        ("/live/a.ts", seg_a.clone()),
        ("/live/b.ts", seg_b.clone()),
        ("/live/c.ts", seg_c.clone()),
        ("/live/wrong.ts", vec![0xEE; 64]),
    ]);

    let dir = tempdir().unwrap();
    let task = media_task(&format!("{}/live/master.m3u8", base), dir.path(), "Show");
    task.start();
    wait_until("media download", Duration::from_secs(20), || {
        matches!(task.status(), TaskStatus::Completed | TaskStatus::Error)
    });

    assert_eq!(task.status(), TaskStatus::Completed, "{:?}", task.state().error);
    assert_eq!(task.filename, "Show.ts");

    // Output is the byte concatenation of the high-variant segments, in order.
    let mut expected = seg_a;
    expected.extend_from_slice(&seg_b);
    expected.extend_from_slice(&seg_c);
    assert_eq!(std::fs::read(task.dest_path()).unwrap(), expected);

    let st = task.state();
    assert_eq!(st.media_state.segments_total, 3);
    assert_eq!(st.media_state.segments_done, 3);
    drop(st);
    assert_eq!(task.downloaded(), 4096 + 2048 + 1024);

    // Temp file was renamed away.
    assert!(!sdm_core::hls::downloading_path(&task).exists());
}

#[test]
fn media_playlist_without_master_downloads_directly() {
    let seg = vec![0x42u8; 512];
    let playlist = "#EXTM3U\nonly.ts\n";
    let base = start(vec![
        ("/vod/index.m3u8", playlist.as_bytes().to_vec()),
        ("/vod/only.ts", seg.clone()),
    ]);

    let dir = tempdir().unwrap();
    let task = media_task(&format!("{}/vod/index.m3u8", base), dir.path(), "clip");
    task.start();
    wait_until("media download", Duration::from_secs(10), || {
        matches!(task.status(), TaskStatus::Completed | TaskStatus::Error)
    });

    assert_eq!(task.status(), TaskStatus::Completed, "{:?}", task.state().error);
    assert_eq!(std::fs::read(task.dest_path()).unwrap(), seg);
}

#[test]
fn non_playlist_body_errors_the_task() {
    let base = start(vec![(
        "/video.m3u8",
        b"<html>definitely not a playlist</html>".to_vec(),
    )]);

    let dir = tempdir().unwrap();
    let task = media_task(&format!("{}/video.m3u8", base), dir.path(), "bad");
    task.start();
    wait_until("media failure", Duration::from_secs(10), || {
        task.status() == TaskStatus::Error
    });

    let st = task.state();
    assert!(
        st.error.as_deref().unwrap_or("").contains("Invalid HLS playlist"),
        "unexpected error: {:?}",
        st.error
    );
}

#[test]
fn encrypted_playlist_is_rejected_as_unsupported() {
    let playlist = "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"k.bin\"\n#EXTINF:4,\ns.ts\n";
    let base = start(vec![("/enc.m3u8", playlist.as_bytes().to_vec())]);

    let dir = tempdir().unwrap();
    let task = media_task(&format!("{}/enc.m3u8", base), dir.path(), "enc");
    task.start();
    wait_until("rejection", Duration::from_secs(10), || {
        task.status() == TaskStatus::Error
    });

    let st = task.state();
    assert!(
        st.error
            .as_deref()
            .unwrap_or("")
            .contains("Unsupported playlist feature"),
        "unexpected error: {:?}",
        st.error
    );
}
