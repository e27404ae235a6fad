// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Shared helpers for date/time handling.
//!
//! Streak days are evaluated in the user's local calendar. The local day is
//! derived from a UTC instant plus the UTC offset reported with the activity.

use chrono::{DateTime, Datelike, Days, FixedOffset, NaiveDate, Utc};

/// Largest UTC offset accepted from clients (±14h covers every real zone).
pub const MAX_UTC_OFFSET_SECONDS: i32 = 14 * 3600;

/// Calendar date of `instant` as seen at the given UTC offset.
///
/// Out-of-range offsets fall back to UTC.
pub fn local_date(instant: DateTime<Utc>, utc_offset_seconds: i32) -> NaiveDate {
    match FixedOffset::east_opt(utc_offset_seconds) {
        Some(offset) => instant.with_timezone(&offset).date_naive(),
        None => instant.date_naive(),
    }
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    let offset = date.weekday().num_days_from_monday() as u64;
    date.checked_sub_days(Days::new(offset)).unwrap_or(date)
}

/// Day after `date`, saturating at the calendar maximum.
pub fn next_day(date: NaiveDate) -> NaiveDate {
    date.succ_opt().unwrap_or(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn local_date_respects_offset() {
        // 23:30 UTC on Jan 10 is already Jan 11 in UTC+2
        let instant = Utc.with_ymd_and_hms(2024, 1, 10, 23, 30, 0).unwrap();
        assert_eq!(local_date(instant, 0), date(2024, 1, 10));
        assert_eq!(local_date(instant, 2 * 3600), date(2024, 1, 11));
        assert_eq!(local_date(instant, -5 * 3600), date(2024, 1, 10));
    }

    #[test]
    fn local_date_ignores_invalid_offset() {
        let instant = Utc.with_ymd_and_hms(2024, 1, 10, 23, 30, 0).unwrap();
        assert_eq!(local_date(instant, 999_999), date(2024, 1, 10));
    }

    #[test]
    fn week_start_is_monday() {
        // 2024-01-10 is a Wednesday
        assert_eq!(week_start(date(2024, 1, 10)), date(2024, 1, 8));
        assert_eq!(week_start(date(2024, 1, 8)), date(2024, 1, 8));
        assert_eq!(week_start(date(2024, 1, 14)), date(2024, 1, 8));
        assert_eq!(week_start(date(2024, 1, 15)), date(2024, 1, 15));
    }
}
