//! Time-driven schedule enforcement.
//!
//! On each tick the manager runs every task's schedule against the current
//! UTC time. Planning is a pure function over `(status, schedule, now)` so
//! the window and repeat rules are testable without spawning workers; the
//! manager applies the resulting actions (pause/start) to the live task.

use chrono::{DateTime, Duration, Utc};

use crate::task::{Schedule, TaskStatus};

/// What one tick decided for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickPlan {
    /// Pause the task before applying `set_status` (it is inside a window
    /// boundary while running).
    pub pause_running: bool,
    /// Start the task (clearing any previous error).
    pub start: bool,
    /// Status to apply after any pause.
    pub set_status: Option<TaskStatus>,
    /// Schedule boundaries moved or were cleared and must be persisted.
    pub schedule_changed: bool,
}

/// Resolve the schedule against `now`, mutating `schedule` when repeat
/// windows roll forward or a one-shot window expires.
pub fn plan(status: TaskStatus, schedule: &mut Schedule, now: DateTime<Utc>) -> TickPlan {
    let mut p = TickPlan::default();

    if schedule.repeat_secs > 0 && schedule.advance(now) {
        p.schedule_changed = true;
    }

    let (start, end) = (schedule.start, schedule.end);

    // No schedule at all: a task parked in `scheduled` goes back to the queue.
    if start.is_none() && end.is_none() {
        if status == TaskStatus::Scheduled {
            p.set_status = Some(TaskStatus::Queued);
        }
        return p;
    }

    // Before the window opens.
    if let Some(s) = start {
        if now < s {
            if status.is_active() {
                p.pause_running = true;
            }
            if status != TaskStatus::Scheduled {
                p.set_status = Some(TaskStatus::Scheduled);
            }
            return p;
        }
    }

    // Inside the window.
    if let Some(s) = start {
        if end.map_or(true, |e| now < e) {
            if matches!(
                status,
                TaskStatus::Queued | TaskStatus::Paused | TaskStatus::Scheduled | TaskStatus::Error
            ) {
                p.start = true;
            }
            if schedule.repeat_secs > 0 && end.is_none() {
                schedule.start = Some(s + Duration::seconds(schedule.repeat_secs as i64));
                p.schedule_changed = true;
            }
            return p;
        }
    }

    // Past the window end.
    if let Some(e) = end {
        if now >= e {
            if status.is_active() {
                p.pause_running = true;
            }
            if schedule.repeat_secs > 0 {
                let step = Duration::seconds(schedule.repeat_secs as i64);
                schedule.start = start.map(|s| s + step);
                schedule.end = Some(e + step);
                p.schedule_changed = true;
                if status != TaskStatus::Scheduled {
                    p.set_status = Some(TaskStatus::Scheduled);
                }
            } else {
                schedule.clear();
                p.schedule_changed = true;
                // A paused-by-us task is already in its final state.
                let effective = if p.pause_running {
                    TaskStatus::Paused
                } else {
                    status
                };
                if !matches!(
                    effective,
                    TaskStatus::Paused | TaskStatus::Queued | TaskStatus::Completed
                ) {
                    p.set_status = Some(TaskStatus::Paused);
                }
            }
            return p;
        }
    }

    p
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn window(start: i64, end: i64, repeat: u64) -> Schedule {
        Schedule {
            start: Some(t(start)),
            end: Some(t(end)),
            repeat_secs: repeat,
        }
    }

    #[test]
    fn before_start_parks_task_as_scheduled() {
        let mut s = window(100, 160, 0);
        let p = plan(TaskStatus::Queued, &mut s, t(99));
        assert_eq!(p.set_status, Some(TaskStatus::Scheduled));
        assert!(!p.start);
        assert!(!p.pause_running);
    }

    #[test]
    fn before_start_pauses_running_task_first() {
        let mut s = window(100, 160, 0);
        let p = plan(TaskStatus::Downloading, &mut s, t(50));
        assert!(p.pause_running);
        assert_eq!(p.set_status, Some(TaskStatus::Scheduled));
    }

    #[test]
    fn within_window_starts_eligible_states() {
        for status in [
            TaskStatus::Queued,
            TaskStatus::Paused,
            TaskStatus::Scheduled,
            TaskStatus::Error,
        ] {
            let mut s = window(100, 160, 0);
            let p = plan(status, &mut s, t(101));
            assert!(p.start, "{:?} should start in window", status);
        }
        let mut s = window(100, 160, 0);
        let p = plan(TaskStatus::Downloading, &mut s, t(101));
        assert!(!p.start);
        assert_eq!(p, TickPlan::default());
    }

    #[test]
    fn within_window_repeat_without_end_rolls_next_start() {
        let mut s = Schedule {
            start: Some(t(100)),
            end: None,
            repeat_secs: 3600,
        };
        let p = plan(TaskStatus::Queued, &mut s, t(101));
        assert!(p.start);
        assert!(p.schedule_changed);
        assert_eq!(s.start, Some(t(3700)));
    }

    #[test]
    fn one_shot_window_end_pauses_and_clears() {
        let mut s = window(100, 160, 0);
        let p = plan(TaskStatus::Downloading, &mut s, t(161));
        assert!(p.pause_running);
        assert_eq!(p.set_status, None);
        assert!(p.schedule_changed);
        assert!(s.is_empty());

        // A completed task keeps its status when the window expires.
        let mut s = window(100, 160, 0);
        let p = plan(TaskStatus::Completed, &mut s, t(161));
        assert_eq!(p.set_status, None);
        assert!(s.is_empty());
    }

    #[test]
    fn repeat_window_scenario_from_scheduling_contract() {
        // start = T, end = T+60, repeat = 3600.
        let mut s = window(0, 60, 3600);

        // T-1: scheduled.
        let p = plan(TaskStatus::Queued, &mut s, t(-1));
        assert_eq!(p.set_status, Some(TaskStatus::Scheduled));

        // T+1: starts.
        let p = plan(TaskStatus::Scheduled, &mut s, t(1));
        assert!(p.start);
        assert!(!p.schedule_changed);

        // T+61 while downloading: window rolls one period and the task is
        // paused back to scheduled with start = T+3600, end = T+3660.
        let p = plan(TaskStatus::Downloading, &mut s, t(61));
        assert!(p.pause_running);
        assert_eq!(p.set_status, Some(TaskStatus::Scheduled));
        assert!(p.schedule_changed);
        assert_eq!(s.start, Some(t(3600)));
        assert_eq!(s.end, Some(t(3660)));
    }

    #[test]
    fn no_schedule_reverts_scheduled_to_queued() {
        let mut s = Schedule::default();
        let p = plan(TaskStatus::Scheduled, &mut s, t(0));
        assert_eq!(p.set_status, Some(TaskStatus::Queued));
        let p = plan(TaskStatus::Paused, &mut s, t(0));
        assert_eq!(p, TickPlan::default());
    }

    #[test]
    fn end_only_window_is_inert_until_expiry() {
        let mut s = Schedule {
            start: None,
            end: Some(t(100)),
            repeat_secs: 0,
        };
        let p = plan(TaskStatus::Queued, &mut s, t(50));
        assert_eq!(p, TickPlan::default());

        let p = plan(TaskStatus::Downloading, &mut s, t(100));
        assert!(p.pause_running);
        assert!(s.is_empty());
    }
}
