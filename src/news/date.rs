use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

/// Zone-aware formats; the date is taken in the publisher's own offset.
const OFFSET_FORMATS: &[&str] = &["%a, %d %b %Y %H:%M:%S %z"];

const NAIVE_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S"];

const DATE_FORMATS: &[&str] = &["%Y.%m.%d", "%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

fn iso_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})-(\d{2})-(\d{2})").expect("valid regex"))
}

fn loose_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\d{4})[-./]?(\d{2})[-./]?(\d{2})").expect("valid regex"))
}

/// Normalize a heterogeneous published-date string to a calendar date.
///
/// Structured formats are tried first (RFC 2822 with offset, RFC 2822 with a
/// zone name, date-time, plain dates), then an ISO `YYYY-MM-DD` substring,
/// then any `YYYY[-./]MM[-./]DD`-like substring. Substrings that are not real
/// dates yield `None`; see [`is_invalid_date`].
pub fn parse_published_date(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.date_naive());
        }
    }

    // "Mon, 26 Aug 2024 08:32:00 GMT": chrono cannot parse zone names, so drop
    // the trailing alphabetic token and read the rest as local time.
    if let Some((head, zone)) = s.rsplit_once(' ') {
        if !zone.is_empty() && zone.chars().all(|c| c.is_ascii_alphabetic()) {
            if let Ok(dt) = NaiveDateTime::parse_from_str(head, "%a, %d %b %Y %H:%M:%S") {
                return Some(dt.date());
            }
        }
    }

    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    for re in [iso_date_re(), loose_date_re()] {
        if let Some(c) = re.captures(s) {
            let (y, m, d) = (c[1].parse().ok()?, c[2].parse().ok()?, c[3].parse().ok()?);
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                return Some(date);
            }
        }
    }

    None
}

/// True when `raw` carries a date-shaped substring that is not a calendar
/// date (`2024.13.45`). Such items can never match a target date.
pub fn is_invalid_date(raw: &str) -> bool {
    parse_published_date(raw).is_none() && loose_date_re().is_match(raw)
}

/// Keep-or-drop decision for one item against the target date.
/// `tolerance_days == 0` means an exact match.
pub fn within_tolerance(published: NaiveDate, target: NaiveDate, tolerance_days: i64) -> bool {
    if tolerance_days == 0 {
        return published == target;
    }
    (published - target).num_days().abs() <= tolerance_days
}
