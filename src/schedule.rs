//! Session date sequencing
//!
//! Sessions are nominally `interval_days` apart and each date is jittered
//! independently, so consecutive dates may tie or swap. Downstream ordering
//! always uses the session index, never the date.

use crate::config::ScheduleConfig;
use crate::sampling::symmetric_int;
use chrono::{Duration, NaiveDate};
use rand::Rng;

/// Produces jittered session dates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimestampSequencer {
    interval_days: u32,
    jitter_days: u32,
}

impl Default for TimestampSequencer {
    fn default() -> Self {
        Self::from_config(&ScheduleConfig::default())
    }
}

impl TimestampSequencer {
    pub fn new(interval_days: u32, jitter_days: u32) -> Self {
        Self {
            interval_days,
            jitter_days,
        }
    }

    pub fn from_config(config: &ScheduleConfig) -> Self {
        Self::new(config.interval_days, config.jitter_days)
    }

    /// Dates for `sessions` sessions: `start + i * interval + U{-jitter..=jitter}`
    pub fn sequence<R: Rng + ?Sized>(
        &self,
        start: NaiveDate,
        sessions: usize,
        rng: &mut R,
    ) -> Vec<NaiveDate> {
        (0..sessions)
            .map(|i| {
                let offset = i as i64 * i64::from(self.interval_days)
                    + symmetric_int(rng, self.jitter_days);
                start + Duration::days(offset)
            })
            .collect()
    }
}
