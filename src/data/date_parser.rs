//! Date recognition and parsing for TIME columns and filter operands
//!
//! Values are only recognised as dates when they match one of a fixed set
//! of strict patterns, so identifiers like "ORDER-2024-001" stay strings.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::LazyLock;

use crate::data::value::RawValue;

/// Date collaborator used by inference, coercion and filter compilation
pub trait DateParser: Send + Sync {
    /// Epoch milliseconds for a value, or `None` when it is not a valid date
    fn parse(&self, value: &RawValue) -> Option<i64>;

    /// Whether a string is recognised as a date at all
    fn is_date(&self, value: &str) -> bool;
}

/// A recognised pattern and the chrono formats that can read it
struct DatePattern {
    regex: Regex,
    formats: &'static [&'static str],
    has_time: bool,
}

static DATE_PATTERNS: LazyLock<Vec<DatePattern>> = LazyLock::new(|| {
    let pattern = |re: &str, formats: &'static [&'static str], has_time: bool| DatePattern {
        // Patterns are literals; a failure here is a programming error caught by the tests
        regex: Regex::new(re).unwrap_or_else(|e| panic!("invalid date pattern {re}: {e}")),
        formats,
        has_time,
    };
    vec![
        // YYYY-MM-DD
        pattern(
            r"^(19|20)\d{2}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$",
            &["%Y-%m-%d"],
            false,
        ),
        // MM/DD/YYYY, then DD/MM/YYYY for values that are not a valid month-first date
        pattern(
            r"^(0[1-9]|1[0-2])/(0[1-9]|[12]\d|3[01])/(19|20)\d{2}$",
            &["%m/%d/%Y"],
            false,
        ),
        pattern(
            r"^(0[1-9]|[12]\d|3[01])/(0[1-9]|1[0-2])/(19|20)\d{2}$",
            &["%d/%m/%Y"],
            false,
        ),
        // DD-MM-YYYY
        pattern(
            r"^(0[1-9]|[12]\d|3[01])-(0[1-9]|1[0-2])-(19|20)\d{2}$",
            &["%d-%m-%Y"],
            false,
        ),
        // YYYY/MM/DD
        pattern(
            r"^(19|20)\d{2}/(0[1-9]|1[0-2])/(0[1-9]|[12]\d|3[01])$",
            &["%Y/%m/%d"],
            false,
        ),
        // ISO 8601 with timezone
        pattern(
            r"^(19|20)\d{2}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:\d{2})$",
            &[],
            true,
        ),
        // ISO 8601 without timezone, 'T' or space separated
        pattern(
            r"^(19|20)\d{2}-(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])[T ]\d{2}:\d{2}(:\d{2}(\.\d+)?)?$",
            &[
                "%Y-%m-%dT%H:%M:%S%.f",
                "%Y-%m-%dT%H:%M:%S",
                "%Y-%m-%dT%H:%M",
                "%Y-%m-%d %H:%M:%S%.f",
                "%Y-%m-%d %H:%M:%S",
                "%Y-%m-%d %H:%M",
            ],
            true,
        ),
    ]
});

/// Default parser: strict regex recognition, chrono parsing, zone-less values read as UTC
#[derive(Debug, Default, Clone, Copy)]
pub struct ChronoDateParser;

impl ChronoDateParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_str(&self, value: &str) -> Option<i64> {
        let value = value.trim();
        // Dates are 8-35 chars in every supported pattern
        if value.len() < 8 || value.len() > 35 {
            return None;
        }

        for pattern in DATE_PATTERNS.iter() {
            if !pattern.regex.is_match(value) {
                continue;
            }
            if pattern.formats.is_empty() {
                if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
                    return Some(dt.timestamp_millis());
                }
                continue;
            }
            for format in pattern.formats {
                let parsed = if pattern.has_time {
                    NaiveDateTime::parse_from_str(value, format).ok()
                } else {
                    NaiveDate::parse_from_str(value, format)
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                };
                if let Some(naive) = parsed {
                    return Some(Utc.from_utc_datetime(&naive).timestamp_millis());
                }
            }
        }
        None
    }
}

impl DateParser for ChronoDateParser {
    fn parse(&self, value: &RawValue) -> Option<i64> {
        match value {
            RawValue::DateTime(dt) => Some(dt.timestamp_millis()),
            RawValue::Int(ms) => Some(*ms),
            RawValue::Float(ms) if ms.is_finite() => Some(ms.round() as i64),
            RawValue::Str(s) => self.parse_str(s),
            _ => None,
        }
    }

    fn is_date(&self, value: &str) -> bool {
        self.parse_str(value).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn millis(y: i32, m: u32, d: u32) -> i64 {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
            .single()
            .unwrap()
            .timestamp_millis()
    }

    #[test]
    fn test_recognised_formats() {
        let parser = ChronoDateParser::new();
        assert_eq!(parser.parse(&"2020-01-01".into()), Some(millis(2020, 1, 1)));
        assert_eq!(parser.parse(&"01/15/2024".into()), Some(millis(2024, 1, 15)));
        assert_eq!(parser.parse(&"15/01/2024".into()), Some(millis(2024, 1, 15)));
        assert_eq!(parser.parse(&"15-01-2024".into()), Some(millis(2024, 1, 15)));
        assert_eq!(parser.parse(&"2024/01/15".into()), Some(millis(2024, 1, 15)));
        assert_eq!(
            parser.parse(&"2024-01-15T10:30:00".into()),
            Some(millis(2024, 1, 15) + 10 * 3_600_000 + 30 * 60_000)
        );
        assert_eq!(
            parser.parse(&"2024-01-15T10:30:00+01:00".into()),
            Some(millis(2024, 1, 15) + 9 * 3_600_000 + 30 * 60_000)
        );
        assert_eq!(
            parser.parse(&"2024-01-15 08:00:00".into()),
            Some(millis(2024, 1, 15) + 8 * 3_600_000)
        );
    }

    #[test]
    fn test_identifiers_are_not_dates() {
        let parser = ChronoDateParser::new();
        assert!(!parser.is_date("ORDER-2024-001"));
        assert!(!parser.is_date("BQ-81198596"));
        assert!(!parser.is_date("2024-13-01"));
        assert!(!parser.is_date("2024-02-30"));
        assert!(!parser.is_date("abc"));
    }

    #[test]
    fn test_non_string_values() {
        let parser = ChronoDateParser::new();
        assert_eq!(parser.parse(&RawValue::Int(1_000)), Some(1_000));
        assert_eq!(parser.parse(&RawValue::Float(1_000.4)), Some(1_000));
        assert_eq!(parser.parse(&RawValue::Null), None);
        assert_eq!(parser.parse(&RawValue::Bool(true)), None);
        let dt = Utc.with_ymd_and_hms(2021, 6, 1, 12, 0, 0).single().unwrap();
        assert_eq!(parser.parse(&RawValue::DateTime(dt)), Some(dt.timestamp_millis()));
    }
}
