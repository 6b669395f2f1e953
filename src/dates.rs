//! Date text normalisation.
//!
//! Listing sites print dates in a handful of loose encodings. [`normalize`]
//! turns any of them into a UTC timestamp, trying in order:
//!
//! 1. standard machine formats (RFC 3339, RFC 2822, ISO 8601 date or
//!    date-time without offset),
//! 2. `D/M/YYYY HH:MM` (24-hour),
//! 3. `D/M/YYYY`,
//! 4. `D-Mon-YYYY hh:mm AM/PM`,
//! 5. `D-Mon-YYYY`.
//!
//! Components without an explicit offset are read as UTC so results do not
//! depend on the host's timezone.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use regex::Regex;

static NUMERIC_DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-3]?\d)[/\-]([0-1]?\d)[/\-](\d{4})\s+([0-2]?\d):([0-5]\d)$")
        .expect("numeric date-time pattern")
});

static NUMERIC_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-3]?\d)[/\-]([0-1]?\d)[/\-](\d{4})$").expect("numeric date pattern")
});

static NAMED_MONTH_DATE_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([0-3]?\d)[\- ]([a-z]{3})[\- ](\d{4})\s+([0-1]?\d):([0-5]\d)\s*(AM|PM)$")
        .expect("named-month date-time pattern")
});

static NAMED_MONTH_DATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([0-3]?\d)[\- ]([a-z]{3})[\- ](\d{4})$").expect("named-month date pattern")
});

const ISO_NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Parses listing date text into a UTC timestamp. Returns `None` when no
/// known encoding matches or the components do not form a real date.
pub fn normalize(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    parse_standard(text)
        .or_else(|| parse_numeric(text))
        .or_else(|| parse_named_month(text))
}

fn parse_standard(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in ISO_NAIVE_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
}

fn parse_numeric(text: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = NUMERIC_DATE_TIME.captures(text) {
        let date = ymd(&caps[3], month_number(&caps[2])?, &caps[1])?;
        let time = NaiveTime::from_hms_opt(caps[4].parse().ok()?, caps[5].parse().ok()?, 0)?;
        return Some(date.and_time(time).and_utc());
    }

    let caps = NUMERIC_DATE.captures(text)?;
    let date = ymd(&caps[3], month_number(&caps[2])?, &caps[1])?;
    Some(date.and_time(NaiveTime::MIN).and_utc())
}

fn parse_named_month(text: &str) -> Option<DateTime<Utc>> {
    if let Some(caps) = NAMED_MONTH_DATE_TIME.captures(text) {
        let date = ymd(&caps[3], month_from_abbrev(&caps[2])?, &caps[1])?;
        let hour = to_24_hour(caps[4].parse().ok()?, &caps[6])?;
        let time = NaiveTime::from_hms_opt(hour, caps[5].parse().ok()?, 0)?;
        return Some(date.and_time(time).and_utc());
    }

    let caps = NAMED_MONTH_DATE.captures(text)?;
    let date = ymd(&caps[3], month_from_abbrev(&caps[2])?, &caps[1])?;
    Some(date.and_time(NaiveTime::MIN).and_utc())
}

fn ymd(year: &str, month: u32, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month, day.parse().ok()?)
}

fn month_number(text: &str) -> Option<u32> {
    text.parse().ok()
}

fn month_from_abbrev(abbrev: &str) -> Option<u32> {
    let month = match abbrev.to_ascii_lowercase().as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn to_24_hour(hour: u32, meridiem: &str) -> Option<u32> {
    if hour > 12 {
        return None;
    }
    let pm = meridiem.eq_ignore_ascii_case("pm");
    Some(match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (hour, true) => hour + 12,
        (hour, false) => hour,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Datelike as _, Timelike as _};

    use super::normalize;

    fn parts(text: &str) -> (i32, u32, u32, u32, u32) {
        let ts = normalize(text).unwrap_or_else(|| panic!("expected {text:?} to parse"));
        (ts.year(), ts.month(), ts.day(), ts.hour(), ts.minute())
    }

    #[test]
    fn named_month_with_meridiem() {
        assert_eq!(parts("15-Jul-2025 05:12 PM"), (2025, 7, 15, 17, 12));
        assert_eq!(parts("1-jan-2024 12:05 am"), (2024, 1, 1, 0, 5));
        assert_eq!(parts("01 DEC 2023 12:30PM"), (2023, 12, 1, 12, 30));
    }

    #[test]
    fn named_month_date_only() {
        assert_eq!(parts("9-Sep-2025"), (2025, 9, 9, 0, 0));
        assert_eq!(parts("09-sep-2025"), (2025, 9, 9, 0, 0));
    }

    #[test]
    fn numeric_day_first_with_and_without_padding() {
        assert_eq!(parts("5/7/2025 09:30"), (2025, 7, 5, 9, 30));
        assert_eq!(parts("05/07/2025 21:04"), (2025, 7, 5, 21, 4));
        assert_eq!(parts("31-12-2024"), (2024, 12, 31, 0, 0));
        assert_eq!(parts("3/4/2025"), (2025, 4, 3, 0, 0));
    }

    #[test]
    fn standard_formats() {
        assert_eq!(parts("2025-07-15T17:12:00Z"), (2025, 7, 15, 17, 12));
        assert_eq!(parts("2025-07-15T22:42:00+05:30"), (2025, 7, 15, 17, 12));
        assert_eq!(parts("2025-07-15"), (2025, 7, 15, 0, 0));
        assert_eq!(parts("2025-07-15 08:00:00"), (2025, 7, 15, 8, 0));
        assert_eq!(parts("Tue, 15 Jul 2025 17:12:00 +0000"), (2025, 7, 15, 17, 12));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parts("  15-Jul-2025 05:12 PM\n"), (2025, 7, 15, 17, 12));
    }

    #[test]
    fn unrecognised_or_impossible_text_is_none() {
        for text in [
            "",
            "   ",
            "yesterday",
            "Posted 3 days ago",
            "32/01/2025",
            "12/13/2025",
            "29-Feb-2025",
            "15-Jly-2025",
            "15-Jul-2025 13:12 PM",
            "15/07/2025 24:00",
        ] {
            assert_eq!(normalize(text), None, "{text:?}");
        }
    }
}
