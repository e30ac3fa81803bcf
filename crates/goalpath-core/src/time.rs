//! Clock abstraction and time bucketing used by timestamped metrics.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

use crate::types::TimestampMillis;

pub const SECOND_IN_MILLISECONDS: i64 = 1_000;
pub const MINUTE_IN_MILLISECONDS: i64 = 60 * SECOND_IN_MILLISECONDS;
pub const HOUR_IN_MILLISECONDS: i64 = 60 * MINUTE_IN_MILLISECONDS;
pub const DAY_IN_MILLISECONDS: i64 = 24 * HOUR_IN_MILLISECONDS;
pub const WEEK_IN_MILLISECONDS: i64 = 7 * DAY_IN_MILLISECONDS;

/// Source of the current time.
pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;

    fn now_millis(&self) -> TimestampMillis {
        self.now().timestamp_millis()
    }
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock which only moves when told to; used by tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn at_millis(millis: TimestampMillis) -> Self {
        Self::new(Utc.timestamp_millis_opt(millis).single().unwrap_or_default())
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn advance_millis(&self, millis: i64) {
        self.advance(Duration::milliseconds(millis));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Granularity of a recorded timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAccuracy {
    Hour,
    #[serde(alias = "1/4day")]
    QuarterDay,
    Day,
    Week,
}

impl TimeAccuracy {
    /// Length of one bucket in milliseconds.
    pub fn bucket_millis(&self) -> i64 {
        match self {
            TimeAccuracy::Hour => HOUR_IN_MILLISECONDS,
            TimeAccuracy::QuarterDay => DAY_IN_MILLISECONDS / 4,
            TimeAccuracy::Day => DAY_IN_MILLISECONDS,
            TimeAccuracy::Week => WEEK_IN_MILLISECONDS,
        }
    }

    /// Start of the bucket containing `at` (UTC). Weeks start on Monday.
    pub fn round_down(&self, at: DateTime<Utc>) -> DateTime<Utc> {
        let date = at.date_naive();
        let hour = at.hour();
        let start = match self {
            TimeAccuracy::Hour => date.and_hms_opt(hour, 0, 0),
            TimeAccuracy::QuarterDay => date.and_hms_opt(hour - hour % 6, 0, 0),
            TimeAccuracy::Day => date.and_hms_opt(0, 0, 0),
            TimeAccuracy::Week => {
                let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
                monday.and_hms_opt(0, 0, 0)
            }
        };
        start.map(|naive| naive.and_utc()).unwrap_or(at)
    }

    pub fn round_down_millis(&self, at: DateTime<Utc>) -> TimestampMillis {
        self.round_down(at).timestamp_millis()
    }
}

/// Unit of a duration accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DurationUnit {
    #[serde(rename = "s")]
    Seconds,
    #[serde(rename = "m")]
    Minutes,
    #[serde(rename = "h")]
    Hours,
    #[serde(rename = "d")]
    Days,
}

impl DurationUnit {
    pub fn millis(&self) -> i64 {
        match self {
            DurationUnit::Seconds => SECOND_IN_MILLISECONDS,
            DurationUnit::Minutes => MINUTE_IN_MILLISECONDS,
            DurationUnit::Hours => HOUR_IN_MILLISECONDS,
            DurationUnit::Days => DAY_IN_MILLISECONDS,
        }
    }
}

/// Accuracy of a duration measurement, e.g. `[5, "m"]` for five minutes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DurationAccuracy(pub f64, pub DurationUnit);

impl DurationAccuracy {
    pub fn amount(&self) -> f64 {
        self.0
    }

    pub fn unit(&self) -> DurationUnit {
        self.1
    }

    /// Size of one accuracy step in milliseconds.
    pub fn step_millis(&self) -> f64 {
        self.0 * self.1.millis() as f64
    }
}

/// Floor `value` to a multiple of `accuracy`.
pub fn trim_value(value: f64, accuracy: f64) -> f64 {
    if accuracy == 0.0 {
        return value;
    }
    (value / accuracy).floor() * accuracy
}

/// Floor a duration in milliseconds to the given accuracy, if any.
pub fn trim_duration(duration_millis: f64, accuracy: Option<DurationAccuracy>) -> f64 {
    match accuracy {
        Some(accuracy) => trim_value(duration_millis, accuracy.step_millis()),
        None => duration_millis,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 27).unwrap()
    }

    #[test]
    fn test_round_down_buckets() {
        // 2024-05-16 is a Thursday
        let at = utc(2024, 5, 16, 14, 42);
        assert_eq!(TimeAccuracy::Hour.round_down(at), Utc.with_ymd_and_hms(2024, 5, 16, 14, 0, 0).unwrap());
        assert_eq!(
            TimeAccuracy::QuarterDay.round_down(at),
            Utc.with_ymd_and_hms(2024, 5, 16, 12, 0, 0).unwrap()
        );
        assert_eq!(TimeAccuracy::Day.round_down(at), Utc.with_ymd_and_hms(2024, 5, 16, 0, 0, 0).unwrap());
        assert_eq!(TimeAccuracy::Week.round_down(at), Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_week_starts_monday_for_sunday() {
        let sunday = utc(2024, 5, 19, 23, 59);
        assert_eq!(
            TimeAccuracy::Week.round_down(sunday),
            Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_trim_duration() {
        let accuracy = DurationAccuracy(1.0, DurationUnit::Seconds);
        assert_eq!(trim_duration(2_999.0, Some(accuracy)), 2_000.0);
        assert_eq!(trim_duration(2_999.0, None), 2_999.0);
        let five_minutes = DurationAccuracy(5.0, DurationUnit::Minutes);
        assert_eq!(trim_duration(11.0 * 60_000.0, Some(five_minutes)), 600_000.0);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::at_millis(1_000);
        clock.advance_millis(500);
        assert_eq!(clock.now_millis(), 1_500);
    }

    #[test]
    fn test_time_accuracy_alias() {
        let parsed: TimeAccuracy = serde_json::from_str("\"1/4day\"").unwrap();
        assert_eq!(parsed, TimeAccuracy::QuarterDay);
        assert_eq!(TimeAccuracy::Week.bucket_millis(), 7 * DAY_IN_MILLISECONDS);
    }
}
