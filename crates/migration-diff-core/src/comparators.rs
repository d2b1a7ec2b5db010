//! Stage F: pure value-level comparison predicates used by the Differ's
//! scalar dispatch.

use std::cell::RefCell;
use std::collections::HashMap;

use chrono::NaiveDateTime;
use regex::Regex;
use serde_json::Value;

/// The fixed list of `strptime`-equivalent layouts tried, in order, for
/// ISO-8601-ish datetime strings before falling back to a generic parse.
const DATETIME_LAYOUTS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.fZ",
    "%Y-%m-%dT%H:%M:%SZ",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d",
];

/// Holds a regex cache scoped to one comparison run; no process-global state.
#[derive(Default)]
pub struct Comparators {
    regex_cache: RefCell<HashMap<String, Option<Regex>>>,
}

impl Comparators {
    pub fn new() -> Self {
        Self::default()
    }

    /// `|a-b| <= precision` when `precision` is set, else strict equality.
    pub fn compare_numbers(&self, old: f64, new: f64, precision: Option<f64>) -> (bool, String) {
        if let Some(precision) = precision {
            let diff = (old - new).abs();
            if diff <= precision {
                (true, String::new())
            } else {
                (
                    false,
                    format!("value difference ({diff}) exceeds precision tolerance ({precision})"),
                )
            }
        } else if old == new {
            (true, String::new())
        } else {
            (false, format!("values differ: {old} != {new}"))
        }
    }

    /// Apply trim/case-insensitive transforms, then pattern or exact match.
    pub fn compare_strings(
        &self,
        old: &str,
        new: &str,
        trim_whitespace: bool,
        case_insensitive: bool,
        pattern: Option<&str>,
    ) -> (bool, String) {
        let mut old_s = old.to_string();
        let mut new_s = new.to_string();
        if trim_whitespace {
            old_s = old_s.trim().to_string();
            new_s = new_s.trim().to_string();
        }
        if case_insensitive {
            old_s = old_s.to_lowercase();
            new_s = new_s.to_lowercase();
        }

        if let Some(pattern) = pattern {
            if let Some(regex) = self.compiled(pattern) {
                let old_matches = regex.is_match(&old_s);
                let new_matches = regex.is_match(&new_s);
                return match (old_matches, new_matches) {
                    (false, false) => (
                        false,
                        format!("neither value matches pattern '{pattern}'"),
                    ),
                    (false, true) => (
                        false,
                        format!("old value '{old}' doesn't match pattern '{pattern}'"),
                    ),
                    (true, false) => (
                        false,
                        format!("new value '{new}' doesn't match pattern '{pattern}'"),
                    ),
                    (true, true) => (true, String::new()),
                };
            }
            // Invalid regex: fall back to post-transform equality.
        }

        if old_s == new_s {
            (true, String::new())
        } else {
            (false, format!("values differ: '{old}' != '{new}'"))
        }
    }

    fn compiled(&self, pattern: &str) -> Option<Regex> {
        let mut cache = self.regex_cache.borrow_mut();
        cache
            .entry(pattern.to_string())
            .or_insert_with(|| Regex::new(pattern).ok())
            .clone()
    }

    /// Parse both sides as instants and compare, optionally within a
    /// duration tolerance (`^\d+(\.\d+)?[smhd]$`).
    pub fn compare_datetime(
        &self,
        old: &str,
        new: &str,
        format: Option<&str>,
        tolerance: Option<&str>,
    ) -> (bool, String) {
        let old_dt = match parse_datetime(old, format) {
            Some(dt) => dt,
            None => return (false, format!("cannot parse datetime: '{old}'")),
        };
        let new_dt = match parse_datetime(new, format) {
            Some(dt) => dt,
            None => return (false, format!("cannot parse datetime: '{new}'")),
        };

        if let Some(tolerance) = tolerance {
            return match parse_duration_seconds(tolerance) {
                Some(budget) => {
                    let diff = (old_dt - new_dt).num_milliseconds().abs() as f64 / 1000.0;
                    if diff <= budget {
                        (true, String::new())
                    } else {
                        (
                            false,
                            format!("time difference ({diff}s) exceeds tolerance ({tolerance})"),
                        )
                    }
                }
                None => (false, format!("invalid tolerance format: '{tolerance}'")),
            };
        }

        if old_dt == new_dt {
            (true, String::new())
        } else {
            (false, format!("datetimes differ: {old} != {new}"))
        }
    }
}

fn parse_datetime(value: &str, format: Option<&str>) -> Option<NaiveDateTime> {
    match format {
        Some(fmt) if !fmt.eq_ignore_ascii_case("ISO8601") => {
            NaiveDateTime::parse_from_str(value, fmt)
                .ok()
                .or_else(|| parse_iso_layouts(value))
        }
        _ => parse_iso_layouts(value),
    }
}

fn parse_iso_layouts(value: &str) -> Option<NaiveDateTime> {
    for layout in DATETIME_LAYOUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, layout) {
            return Some(dt);
        }
        if let Ok(date) = chrono::NaiveDate::parse_from_str(value, layout) {
            return Some(date.and_hms_opt(0, 0, 0).unwrap());
        }
    }
    let normalized = value.replace('Z', "+00:00");
    chrono::DateTime::parse_from_rfc3339(&normalized)
        .ok()
        .map(|dt| dt.naive_utc())
}

/// True when `tolerance` parses as a `^\d+(\.\d+)?[smhd]$` duration. Exposed
/// so the Differ can classify a scalar mismatch caused by a malformed
/// tolerance string as a plain value mismatch rather than a tolerance-exceeded
/// one, before it ever calls [`Comparators::compare_datetime`].
pub fn is_valid_tolerance(tolerance: &str) -> bool {
    parse_duration_seconds(tolerance).is_some()
}

/// Parses `^\d+(\.\d+)?[smhd]$` into a number of seconds.
fn parse_duration_seconds(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    let (number, unit) = raw.split_at(raw.len().checked_sub(1)?);
    let amount: f64 = number.parse().ok()?;
    let multiplier = match unit {
        "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        "d" => 86_400.0,
        _ => return None,
    };
    Some(amount * multiplier)
}

/// True if `value` is a JSON number or boolean-free numeric type (booleans
/// are never treated as numeric per the type-dispatch rules).
pub fn is_numeric(value: &Value) -> bool {
    value.is_number()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_exact_match() {
        let cmp = Comparators::new();
        let (is_match, _) = cmp.compare_numbers(1.0, 1.0, None);
        assert!(is_match);
    }

    #[test]
    fn numeric_within_precision() {
        let cmp = Comparators::new();
        let (is_match, _) = cmp.compare_numbers(100.00, 100.005, Some(0.01));
        assert!(is_match);
    }

    #[test]
    fn numeric_exceeds_precision() {
        let cmp = Comparators::new();
        let (is_match, msg) = cmp.compare_numbers(100.00, 100.05, Some(0.01));
        assert!(!is_match);
        assert!(msg.contains("precision"));
    }

    #[test]
    fn string_trim_and_case_insensitive() {
        let cmp = Comparators::new();
        let (is_match, _) = cmp.compare_strings(" Test ", "test", true, true, None);
        assert!(is_match);
    }

    #[test]
    fn string_pattern_mismatch() {
        let cmp = Comparators::new();
        let (is_match, _) = cmp.compare_strings("abc", "123", false, false, Some("^[a-z]+$"));
        assert!(!is_match);
    }

    #[test]
    fn string_invalid_regex_falls_back_to_equality() {
        let cmp = Comparators::new();
        let (is_match, _) = cmp.compare_strings("abc", "abc", false, false, Some("("));
        assert!(is_match);
    }

    #[test]
    fn datetime_within_tolerance() {
        let cmp = Comparators::new();
        let (is_match, _) = cmp.compare_datetime(
            "2025-02-02T10:30:00Z",
            "2025-02-02T10:30:02Z",
            None,
            Some("5s"),
        );
        assert!(is_match);
    }

    #[test]
    fn datetime_exceeds_tolerance() {
        let cmp = Comparators::new();
        let (is_match, msg) = cmp.compare_datetime(
            "2025-02-02T10:30:00Z",
            "2025-02-02T10:30:10Z",
            None,
            Some("5s"),
        );
        assert!(!is_match);
        assert!(msg.contains("tolerance"));
    }

    #[test]
    fn datetime_parses_date_only_layout() {
        let cmp = Comparators::new();
        let (is_match, _) = cmp.compare_datetime("2025-02-02", "2025-02-02", None, None);
        assert!(is_match);
    }

    #[test]
    fn duration_parsing_handles_all_units() {
        assert_eq!(parse_duration_seconds("5s"), Some(5.0));
        assert_eq!(parse_duration_seconds("1m"), Some(60.0));
        assert_eq!(parse_duration_seconds("2h"), Some(7200.0));
        assert_eq!(parse_duration_seconds("1d"), Some(86_400.0));
        assert_eq!(parse_duration_seconds("1.5s"), Some(1.5));
        assert_eq!(parse_duration_seconds("bogus"), None);
    }
}
