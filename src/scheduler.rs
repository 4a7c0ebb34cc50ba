//! Daily maintenance schedule
//!
//! A wall-clock time-of-day trigger with at-most-once-per-calendar-day
//! semantics. Firing is detected by the coarse control-loop tick; the
//! schedule tracks the last *date* it fired, so a tick that lands hours past
//! the target time (say, under load) still fires exactly once for that day.

use chrono::{DateTime, Local, NaiveDate, NaiveTime};

use crate::error::{Error, Result};

/// Once-per-day wall-clock trigger.
#[derive(Debug, Clone)]
pub struct DailySchedule {
    target: NaiveTime,
    last_fired: Option<NaiveDate>,
}

impl DailySchedule {
    /// Create a schedule firing daily at `hour:minute` local time.
    ///
    /// If `now` is already past today's target, the first fire happens
    /// tomorrow; the process coming up at 23:00 should not immediately rerun
    /// a 06:00 maintenance cycle.
    pub fn new(hour: u32, minute: u32, now: DateTime<Local>) -> Result<Self> {
        let target = NaiveTime::from_hms_opt(hour, minute, 0)
            .ok_or_else(|| Error::Config(format!("invalid schedule time {hour:02}:{minute:02}")))?;
        let last_fired = if now.time() >= target {
            Some(now.date_naive())
        } else {
            None
        };
        Ok(Self { target, last_fired })
    }

    /// The configured time of day.
    pub fn target(&self) -> NaiveTime {
        self.target
    }

    /// Check whether the schedule is due at `now`, marking today as fired if
    /// so. Marking happens regardless of what the caller does with the fire:
    /// a fire skipped because a cycle is still running is skipped, not
    /// queued for a later tick.
    pub fn is_due(&mut self, now: DateTime<Local>) -> bool {
        let today = now.date_naive();
        if self.last_fired == Some(today) {
            return false;
        }
        if now.time() < self.target {
            return false;
        }
        self.last_fired = Some(today);
        true
    }
}
