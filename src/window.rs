//! Temporal window math.
//!
//! Converts a client-local calendar date into the UTC instant ranges the
//! pipeline needs: an exact filter range for day membership and a ±1-day
//! query range so boundary-crossing events (sleep recorded by wake time,
//! appointments spanning midnight) are fetched before the precise
//! pillar-specific filter runs in normalization.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::error::EngineError;

/// Largest legal UTC offset, in minutes (UTC±18:00 per the IANA range).
const MAX_OFFSET_MINUTES: i32 = 18 * 60;

/// UTC instant ranges for one local day (or a run of local days).
///
/// Offset convention: `UTC = local + offset_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporalWindow {
    /// First instant of the local day, in UTC.
    pub filter_start: DateTime<Utc>,
    /// Last instant of the local day, in UTC (start + 24h − 1ms).
    pub filter_end: DateTime<Utc>,
    /// Widened fetch range start (filter_start − 1 day).
    pub query_start: DateTime<Utc>,
    /// Widened fetch range end (filter_end + 1 day).
    pub query_end: DateTime<Utc>,
}

impl TemporalWindow {
    /// Window for a single local calendar day.
    ///
    /// `timezone_name` is validated against the IANA database; the offset is
    /// caller-supplied because clients report their own device offset and it
    /// may legitimately disagree with the zone's current rule (DST lag on
    /// stale sessions).
    pub fn for_local_day(
        local_date: NaiveDate,
        timezone_name: &str,
        offset_minutes: i32,
    ) -> Result<Self, EngineError> {
        Self::for_local_days(local_date, local_date, timezone_name, offset_minutes)
    }

    /// Window spanning `start_date..=end_date` local days, for the rolling
    /// aggregator.
    pub fn for_local_days(
        start_date: NaiveDate,
        end_date: NaiveDate,
        timezone_name: &str,
        offset_minutes: i32,
    ) -> Result<Self, EngineError> {
        timezone_name
            .parse::<Tz>()
            .map_err(|_| EngineError::InvalidTimezone(timezone_name.to_string()))?;

        if offset_minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(EngineError::InvalidOffset(offset_minutes));
        }

        if end_date < start_date {
            return Err(EngineError::InvalidDate(format!(
                "window end {} precedes start {}",
                end_date, start_date
            )));
        }

        let start_midnight = start_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| EngineError::InvalidDate(start_date.to_string()))?;
        let end_midnight = end_date
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| EngineError::InvalidDate(end_date.to_string()))?;

        let offset = Duration::minutes(i64::from(offset_minutes));
        let filter_start = DateTime::<Utc>::from_naive_utc_and_offset(start_midnight, Utc) + offset;
        let filter_end = DateTime::<Utc>::from_naive_utc_and_offset(end_midnight, Utc)
            + offset
            + Duration::hours(24)
            - Duration::milliseconds(1);

        Ok(Self {
            filter_start,
            filter_end,
            query_start: filter_start - Duration::days(1),
            query_end: filter_end + Duration::days(1),
        })
    }

    /// Inclusive membership test against the exact day range.
    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.filter_start && instant <= self.filter_end
    }

    /// Minutes from local day start (0–1440), unclamped.
    pub fn minutes_into_day(&self, instant: DateTime<Utc>) -> i64 {
        (instant - self.filter_start).num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_positive_offset_shifts_window_forward() {
        // UTC = local + 300 (e.g. US Eastern during DST reporting +300)
        let w = TemporalWindow::for_local_day(day(2026, 3, 10), "America/New_York", 300)
            .expect("valid window");
        assert_eq!(
            w.filter_start,
            Utc.with_ymd_and_hms(2026, 3, 10, 5, 0, 0).unwrap()
        );
        assert_eq!(
            w.filter_end,
            Utc.with_ymd_and_hms(2026, 3, 11, 5, 0, 0).unwrap() - Duration::milliseconds(1)
        );
    }

    #[test]
    fn test_negative_offset_shifts_window_back() {
        let w = TemporalWindow::for_local_day(day(2026, 3, 10), "Asia/Tokyo", -540)
            .expect("valid window");
        assert_eq!(
            w.filter_start,
            Utc.with_ymd_and_hms(2026, 3, 9, 15, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_query_range_widens_by_one_day_each_side() {
        let w = TemporalWindow::for_local_day(day(2026, 3, 10), "UTC", 0).expect("valid window");
        assert_eq!(w.query_start, w.filter_start - Duration::days(1));
        assert_eq!(w.query_end, w.filter_end + Duration::days(1));
    }

    #[test]
    fn test_filter_range_is_inclusive_at_both_ends() {
        let w = TemporalWindow::for_local_day(day(2026, 3, 10), "UTC", 0).expect("valid window");
        assert!(w.contains(w.filter_start));
        assert!(w.contains(w.filter_end));
        assert!(!w.contains(w.filter_end + Duration::milliseconds(1)));
        assert!(!w.contains(w.filter_start - Duration::milliseconds(1)));
    }

    #[test]
    fn test_unknown_timezone_is_invalid_input() {
        let err = TemporalWindow::for_local_day(day(2026, 3, 10), "Mars/Olympus", 0)
            .expect_err("should reject");
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_offset_beyond_18h_is_invalid_input() {
        let err = TemporalWindow::for_local_day(day(2026, 3, 10), "UTC", 19 * 60)
            .expect_err("should reject");
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_multi_day_window_spans_whole_run() {
        let w = TemporalWindow::for_local_days(day(2026, 3, 4), day(2026, 3, 10), "UTC", 0)
            .expect("valid window");
        assert_eq!(
            w.filter_start,
            Utc.with_ymd_and_hms(2026, 3, 4, 0, 0, 0).unwrap()
        );
        assert_eq!(
            w.filter_end,
            Utc.with_ymd_and_hms(2026, 3, 11, 0, 0, 0).unwrap() - Duration::milliseconds(1)
        );
    }

    #[test]
    fn test_inverted_multi_day_window_rejected() {
        let err = TemporalWindow::for_local_days(day(2026, 3, 10), day(2026, 3, 4), "UTC", 0)
            .expect_err("should reject");
        assert!(err.is_invalid_input());
    }

    #[test]
    fn test_minutes_into_day() {
        let w = TemporalWindow::for_local_day(day(2026, 3, 10), "UTC", 0).expect("valid window");
        let one_am = Utc.with_ymd_and_hms(2026, 3, 10, 1, 0, 0).unwrap();
        assert_eq!(w.minutes_into_day(one_am), 60);
    }
}
