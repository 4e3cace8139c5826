//! Escalation timing.
//!
//! A review that nobody touched for `delay` seconds is overdue and shows up
//! in the daily digest. Weekends do not count against the reviewer: when an
//! approval or comment signal stamps `updated_at`, the stamp is pulled
//! forward so that `updated_at + delay` lands on a working day. Overdue-ness
//! itself is a plain `now > updated_at + delay` check.

use crate::config::NotifierConfig;
use crate::error::AppError;
use chrono::{DateTime, Datelike, FixedOffset, TimeDelta, TimeZone, Utc, Weekday};

/// Move a weekend instant to the following Monday, same time of day.
///
/// Single pass: Sunday gains one day, Saturday gains two. Weekdays are
/// returned unchanged.
pub fn shift_to_working_day<Tz: TimeZone>(at: DateTime<Tz>) -> DateTime<Tz> {
    match at.weekday() {
        Weekday::Sun => at + TimeDelta::days(1),
        Weekday::Sat => at + TimeDelta::days(2),
        _ => at,
    }
}

/// Whether a calendar day is Monday through Friday.
pub fn is_working_day(day: Weekday) -> bool {
    !matches!(day, Weekday::Sat | Weekday::Sun)
}

/// Escalation policy for one team calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Escalation {
    delay_secs: i64,
    offset: FixedOffset,
}

impl Escalation {
    pub fn new(delay_secs: i64, offset: FixedOffset) -> Self {
        Self { delay_secs, offset }
    }

    pub fn from_config(config: &NotifierConfig) -> Result<Self, AppError> {
        let offset = FixedOffset::east_opt(config.utc_offset_minutes * 60).ok_or_else(|| {
            AppError::config(format!(
                "utc_offset_minutes out of range: {}",
                config.utc_offset_minutes
            ))
        })?;
        Ok(Self::new(config.delay_secs, offset))
    }

    pub fn delay_secs(&self) -> i64 {
        self.delay_secs
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    /// `timestamp` in the team's calendar, if representable.
    pub fn local(&self, timestamp: i64) -> Option<DateTime<FixedOffset>> {
        DateTime::<Utc>::from_timestamp(timestamp, 0).map(|dt| dt.with_timezone(&self.offset))
    }

    /// Escalation instant for a review last touched at `updated_at`,
    /// moved off the weekend.
    pub fn deadline(&self, updated_at: i64) -> i64 {
        let naive = updated_at.saturating_add(self.delay_secs);
        match self.local(naive) {
            Some(local) => shift_to_working_day(local).timestamp(),
            None => naive,
        }
    }

    /// Value to store in `updated_at` for a signal received at `now`.
    ///
    /// Chosen so that `stamp + delay` equals [`Escalation::deadline`] of `now`.
    pub fn stamp(&self, now: i64) -> i64 {
        self.deadline(now) - self.delay_secs
    }

    /// Whether a review last stamped at `updated_at` is overdue at `now`.
    pub fn is_overdue(&self, updated_at: i64, now: i64) -> bool {
        now > updated_at.saturating_add(self.delay_secs)
    }
}
