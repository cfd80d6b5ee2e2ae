//! `sdm status` – show status of all tasks.

use anyhow::Result;
use sdm_core::manager::TaskManager;

pub fn run_status(manager: &TaskManager) -> Result<()> {
    let tasks = manager.tasks();
    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    println!(
        "{:<12} {:<10} {:<10} {:<24} {}",
        "STATUS", "DONE", "TOTAL", "FILE", "URL"
    );
    for task in tasks {
        let st = task.state();
        let total = if st.total_size > 0 {
            format!("{}", st.total_size)
        } else if st.media_state.segments_total > 0 {
            format!(
                "{}/{} seg",
                st.media_state.segments_done, st.media_state.segments_total
            )
        } else {
            "-".to_string()
        };
        println!(
            "{:<12} {:<10} {:<10} {:<24} {}",
            st.status.as_str(),
            task.downloaded(),
            total,
            task.filename,
            task.url
        );
    }
    Ok(())
}
