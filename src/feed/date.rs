//! Publication date normalization.
//!
//! Feeds in the wild disagree on how to spell a timestamp. [`normalize`] tries
//! a fixed, ordered list of layouts and returns the first one that parses, so an
//! ambiguous string always resolves the same way.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

/// The timestamp string matched none of the known layouts.
///
/// Callers treat this as entry-local: the entry is kept with no publication time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unable to parse date: {input}")]
pub struct DateParseError {
    pub input: String,
}

/// Layouts in trial order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123,
    /// `Mon, 02 Jan 2006 15:04:05 -0700`
    Rfc1123Z,
    /// `02 Jan 06 15:04 MST`
    Rfc822,
    /// `02 Jan 06 15:04 -0700`
    Rfc822Z,
    /// `2006-01-02T15:04:05Z07:00`
    Iso8601,
    /// `2006-01-02 15:04:05`, read as UTC
    DateTime,
}

impl Layout {
    pub const ALL: [Layout; 6] = [
        Layout::Rfc1123,
        Layout::Rfc1123Z,
        Layout::Rfc822,
        Layout::Rfc822Z,
        Layout::Iso8601,
        Layout::DateTime,
    ];

    /// Parse `input` under this layout only.
    pub fn parse(self, input: &str) -> Option<DateTime<Utc>> {
        match self {
            Layout::Rfc1123 => parse_named_zone(strip_weekday(input)?, "%d %b %Y %H:%M:%S"),
            Layout::Rfc1123Z => {
                parse_numeric_zone(strip_weekday(input)?, "%d %b %Y %H:%M:%S %z")
            }
            Layout::Rfc822 => parse_named_zone(input, "%d %b %y %H:%M"),
            Layout::Rfc822Z => parse_numeric_zone(input, "%d %b %y %H:%M %z"),
            Layout::Iso8601 => DateTime::parse_from_rfc3339(input)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            Layout::DateTime => NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S")
                .ok()
                .map(|naive| naive.and_utc()),
        }
    }
}

/// Normalize a feed-provided timestamp.
///
/// - Empty (or whitespace-only) input → `Ok(None)`, the absent timestamp
/// - First matching [`Layout`] → `Ok(Some(instant))`
/// - Nothing matches → `Err(DateParseError)` carrying the original string
pub fn normalize(input: &str) -> Result<Option<DateTime<Utc>>, DateParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    Layout::ALL
        .iter()
        .find_map(|layout| layout.parse(trimmed))
        .map(Some)
        .ok_or_else(|| DateParseError {
            input: input.to_string(),
        })
}

/// Drop a leading `Www, ` weekday. The name must be a real abbreviation but is
/// not checked against the date; feeds often get it wrong.
fn strip_weekday(input: &str) -> Option<&str> {
    const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
    let (day, rest) = input.split_once(", ")?;
    WEEKDAYS.contains(&day).then_some(rest)
}

fn parse_numeric_zone(input: &str, fmt: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(input, fmt)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn parse_named_zone(input: &str, fmt: &str) -> Option<DateTime<Utc>> {
    let (head, zone) = input.rsplit_once(' ')?;
    let offset = zone_offset(zone)?;
    let naive = NaiveDateTime::parse_from_str(head, fmt).ok()?;
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Offset for a zone abbreviation.
///
/// RFC 822 names its North American zones explicitly. Any other purely
/// alphabetic abbreviation of 1-5 letters is accepted at offset zero, since an
/// abbreviation alone does not identify a zone.
fn zone_offset(zone: &str) -> Option<FixedOffset> {
    let hours = match zone {
        "UT" | "UTC" | "GMT" | "Z" => 0,
        "EDT" => -4,
        "EST" | "CDT" => -5,
        "CST" | "MDT" => -6,
        "MST" | "PDT" => -7,
        "PST" => -8,
        other => {
            if other.is_empty()
                || other.len() > 5
                || !other.chars().all(|c| c.is_ascii_alphabetic())
            {
                return None;
            }
            0
        }
    };
    FixedOffset::east_opt(hours * 3600)
}
