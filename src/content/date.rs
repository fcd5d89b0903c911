//! Tolerant date parsing for values scraped out of article pages.
//!
//! Pages publish dates in whatever shape their CMS emits: RFC 3339 in
//! `article:published_time`, RFC 2822 in older meta tags, naive timestamps,
//! bare dates, or long-form English. Anything we cannot read is absent,
//! never an error.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::sync::OnceLock;

const NAIVE_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const OFFSET_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%d %H:%M:%S %z",
    "%a, %d %b %Y %H:%M:%S %z",
    "%d %b %Y %H:%M:%S %z",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y%m%d",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%A, %B %d, %Y",
    "%m/%d/%Y",
];

/// Parses a date string in any of the common web formats.
///
/// Timestamps without an offset are taken as UTC. Bare dates map to
/// midnight UTC.
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    // Feeds often carry a weekday that does not match the date
    if let Some((_, rest)) = s.split_once(", ").filter(|(day, _)| is_weekday(day)) {
        if let Ok(dt) = DateTime::parse_from_rfc2822(rest) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for fmt in OFFSET_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // "Z" suffix with fractional or missing seconds, which RFC 3339 rejects
    let naive_input = s.strip_suffix('Z').unwrap_or(s);
    for fmt in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(naive_input, fmt) {
            return Some(Utc.from_utc_datetime(&dt));
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d.and_hms_opt(0, 0, 0).map(|dt| Utc.from_utc_datetime(&dt));
        }
    }

    if let Ok(secs) = s.parse::<i64>() {
        // Epoch seconds; anything shorter is more likely a year or an id
        if s.len() >= 9 {
            return Utc.timestamp_opt(secs, 0).single();
        }
    }

    None
}

fn is_weekday(word: &str) -> bool {
    word.len() >= 3
        && ["mon", "tue", "wed", "thu", "fri", "sat", "sun"]
            .iter()
            .any(|d| word.get(..3).is_some_and(|w| w.eq_ignore_ascii_case(d)))
}

fn url_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[/_-])((?:19|20)\d{2})[/_-]?(0[1-9]|1[0-2])[/_-]?(0[1-9]|[12]\d|3[01])(?:[/_.-]|$)")
            .expect("static regex compiles")
    })
}

/// Extracts a publish date embedded in an article URL path, such as
/// `/2024/01/15/slug` or `/news-2024-01-15.html`.
pub fn date_from_url(url: &str) -> Option<DateTime<Utc>> {
    let path = url::Url::parse(url)
        .map(|u| u.path().to_owned())
        .unwrap_or_else(|_| url.to_owned());
    let caps = url_date_regex().captures(&path)?;
    let year = caps.get(1)?.as_str().parse().ok()?;
    let month = caps.get(2)?.as_str().parse().ok()?;
    let day = caps.get(3)?.as_str().parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt))
}
