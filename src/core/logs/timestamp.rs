//! Log timestamp decoding.
//!
//! Production logs carry timestamps like `21 Dec 00:00:00.134`: day, English
//! month abbreviation and a millisecond clock, but no year and no zone. The
//! year is supplied by the caller and the clock is interpreted as UTC.
//!
//! [`parse_log_timestamp`] never fails: anything it cannot interpret becomes
//! the sentinel [`UNKNOWN_TIMESTAMP`], which callers treat as "discard the
//! record". [`try_parse_log_timestamp`] is the same conversion with the error
//! preserved for callers that want to count malformed input.

use std::sync::LazyLock;

use regex::Regex;
use time::{Date, Month, PrimitiveDateTime, Time};

use crate::errors::{ParseError, ParseResult};

/// Sentinel returned when a timestamp cannot be decoded. Never a valid event time.
pub const UNKNOWN_TIMESTAMP: i64 = 0;

/// Reference year used when none is configured.
pub const DEFAULT_REFERENCE_YEAR: i32 = 2025;

static TIMESTAMP_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(\d{1,2})\s+([A-Za-z]{3})\s+(\d{2}):(\d{2}):(\d{2})\.(\d{3})\s*$")
        .expect("timestamp pattern is valid")
});

/// Decode a log-local timestamp to epoch milliseconds, or [`UNKNOWN_TIMESTAMP`].
pub fn parse_log_timestamp(raw: &str, reference_year: i32) -> i64 {
    try_parse_log_timestamp(raw, reference_year).unwrap_or(UNKNOWN_TIMESTAMP)
}

/// Decode a log-local timestamp to epoch milliseconds.
pub fn try_parse_log_timestamp(raw: &str, reference_year: i32) -> ParseResult<i64> {
    let invalid = || ParseError::InvalidTimestamp(raw.to_string());

    let caps = TIMESTAMP_PATTERN.captures(raw).ok_or_else(invalid)?;
    let field = |idx: usize| -> ParseResult<u16> {
        caps[idx].parse::<u16>().map_err(|_| invalid())
    };

    let day = field(1)? as u8;
    let month = month_from_abbreviation(&caps[2]).ok_or_else(invalid)?;
    let hour = field(3)? as u8;
    let minute = field(4)? as u8;
    let second = field(5)? as u8;
    let millis = field(6)?;

    let date = Date::from_calendar_date(reference_year, month, day).map_err(|_| invalid())?;
    let clock = Time::from_hms_milli(hour, minute, second, millis).map_err(|_| invalid())?;
    let instant = PrimitiveDateTime::new(date, clock).assume_utc();

    let millis = instant.unix_timestamp_nanos() / 1_000_000;
    let millis = i64::try_from(millis).map_err(|_| invalid())?;
    if millis == UNKNOWN_TIMESTAMP {
        // 1970-01-01T00:00:00.000 collides with the sentinel
        return Err(invalid());
    }
    Ok(millis)
}

fn month_from_abbreviation(abbr: &str) -> Option<Month> {
    let month = match abbr.to_ascii_lowercase().as_str() {
        "jan" => Month::January,
        "feb" => Month::February,
        "mar" => Month::March,
        "apr" => Month::April,
        "may" => Month::May,
        "jun" => Month::June,
        "jul" => Month::July,
        "aug" => Month::August,
        "sep" => Month::September,
        "oct" => Month::October,
        "nov" => Month::November,
        "dec" => Month::December,
        _ => return None,
    };
    Some(month)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_instant() {
        // 2025-12-21T00:00:00.134Z
        assert_eq!(
            parse_log_timestamp("21 Dec 00:00:00.134", 2025),
            1_766_275_200_134
        );
    }

    #[test]
    fn test_single_digit_day_and_clock() {
        // 2025-03-05T13:07:09.001Z
        assert_eq!(
            parse_log_timestamp("5 Mar 13:07:09.001", 2025),
            1_741_180_029_001
        );
    }

    #[test]
    fn test_month_is_case_insensitive() {
        assert_eq!(
            parse_log_timestamp("21 DEC 00:00:00.134", 2025),
            parse_log_timestamp("21 dec 00:00:00.134", 2025)
        );
    }

    #[test]
    fn test_reference_year_matters() {
        let y2024 = parse_log_timestamp("1 Jan 00:00:00.000", 2024);
        let y2025 = parse_log_timestamp("1 Jan 00:00:00.000", 2025);
        assert_eq!(y2025 - y2024, 366 * 86_400_000);
    }

    #[test]
    fn test_invalid_inputs_yield_sentinel() {
        for raw in [
            "",
            "garbage",
            "32 Dec 00:00:00.000",
            "21 Foo 00:00:00.000",
            "21 Dec 25:00:00.000",
            "21 Dec 00:00:00",
            "29 Feb 00:00:00.000",
        ] {
            assert_eq!(parse_log_timestamp(raw, 2025), UNKNOWN_TIMESTAMP, "{raw}");
        }
    }

    #[test]
    fn test_leap_day_with_leap_reference_year() {
        assert_ne!(
            parse_log_timestamp("29 Feb 12:00:00.000", 2024),
            UNKNOWN_TIMESTAMP
        );
    }

    #[test]
    fn test_try_parse_reports_input() {
        let err = try_parse_log_timestamp("nope", 2025).unwrap_err();
        assert_eq!(err, ParseError::InvalidTimestamp("nope".to_string()));
    }
}
