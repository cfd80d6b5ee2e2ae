//! Wall-clock schedule attached to a task.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};

/// Optional start/stop window plus a repeat interval, all in UTC.
///
/// Serialized as RFC 3339 strings in the store. `repeat_secs == 0` means a
/// one-shot schedule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Schedule {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub repeat_secs: u64,
}

impl Schedule {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.repeat_secs == 0
    }

    /// Reject impossible windows at the API boundary: a stop at or before the
    /// start, or a repeat interval without a start time.
    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start, self.end) {
            if end <= start {
                anyhow::bail!("stop time must be after start time");
            }
        }
        if self.repeat_secs > 0 && self.start.is_none() {
            anyhow::bail!("repeat requires a start time");
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        *self = Schedule::default();
    }

    /// Roll fully-elapsed repeat windows forward until the window contains or
    /// lies ahead of `now`. Returns true if any boundary moved.
    pub(crate) fn advance(&mut self, now: DateTime<Utc>) -> bool {
        if self.repeat_secs == 0 {
            return false;
        }
        let step = Duration::seconds(self.repeat_secs as i64);
        let mut moved = false;

        while let (Some(start), Some(end)) = (self.start, self.end) {
            if end > now {
                break;
            }
            self.start = Some(start + step);
            self.end = Some(end + step);
            moved = true;
        }
        while let (Some(start), None) = (self.start, self.end) {
            if start + step > now {
                break;
            }
            self.start = Some(start + step);
            moved = true;
        }
        while let (None, Some(end)) = (self.start, self.end) {
            if end > now {
                break;
            }
            self.end = Some(end + step);
            moved = true;
        }

        moved
    }
}
