//! Parsing of recorder filenames.
//!
//! Recorded clips are named
//! `YYYY-MM-DD HH-MM-SS - <username> - <activity words...> (<suffix>).mp4`.
//! Titles and timestamps are strict: anything that does not follow that
//! shape is rejected. Clip descriptions are lenient and fall back to the
//! raw filename.

use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

use crate::error::{Result, UploaderError};

/// Segment separator used by the recorder
pub const SEGMENT_SEPARATOR: &str = " - ";

/// Extension of the clips the recorder produces
pub const VIDEO_EXTENSION: &str = ".mp4";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H-%M-%S";

fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}-\d{2}-\d{2}$").expect("timestamp pattern is valid")
    })
}

/// Everything the pipeline derives from a single clip filename
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedFilename {
    /// Original filename (no directory)
    pub filename: String,
    /// Recording start, second resolution
    pub timestamp: NaiveDateTime,
    /// `<username> <first two activity words>`
    pub title: String,
    /// Filename without timestamp segment and extension
    pub clip_description: String,
}

impl ParsedFilename {
    /// Parse a filename, failing if either the title or the timestamp is malformed
    pub fn parse(filename: &str) -> Result<Self> {
        let timestamp = parse_datetime(filename)?;
        let title = parse_title(filename)?;

        Ok(Self {
            filename: filename.to_string(),
            timestamp,
            title,
            clip_description: clip_description(filename),
        })
    }

    /// Calendar day the clip belongs to after the early-morning shift
    pub fn effective_date(&self, cutoff_hour: u32) -> NaiveDate {
        shift_early_morning(self.timestamp, cutoff_hour)
    }
}

/// Build the video title from the username and the first two activity words
pub fn parse_title(filename: &str) -> Result<String> {
    let parts: Vec<&str> = filename.split(SEGMENT_SEPARATOR).collect();
    if parts.len() < 3 {
        return Err(UploaderError::InvalidFilename(format!(
            "expected '<timestamp> - <username> - <activity>' in {}",
            filename
        )));
    }

    let username = parts[1];
    let activity = parts[2].split(" (").next().unwrap_or_default();
    let words: Vec<&str> = activity.split_whitespace().collect();

    if words.len() < 2 {
        return Err(UploaderError::InvalidFilename(format!(
            "not enough words in activity part of {}",
            filename
        )));
    }

    Ok(format!("{} {}", username, words[..2].join(" ").to_lowercase()))
}

/// Parse the leading `YYYY-MM-DD HH-MM-SS` segment
pub fn parse_datetime(filename: &str) -> Result<NaiveDateTime> {
    let stamp = filename.split(SEGMENT_SEPARATOR).next().unwrap_or_default();

    if !timestamp_pattern().is_match(stamp) {
        return Err(UploaderError::InvalidFilename(format!(
            "invalid timestamp '{}' in {}",
            stamp, filename
        )));
    }

    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).map_err(|e| {
        UploaderError::InvalidFilename(format!("invalid timestamp in {}: {}", filename, e))
    })
}

/// Day a clip is filed under: recordings before `cutoff_hour` count for the previous day
pub fn effective_date(filename: &str, cutoff_hour: u32) -> Result<NaiveDate> {
    Ok(shift_early_morning(parse_datetime(filename)?, cutoff_hour))
}

fn shift_early_morning(timestamp: NaiveDateTime, cutoff_hour: u32) -> NaiveDate {
    if timestamp.hour() < cutoff_hour {
        (timestamp - Duration::days(1)).date()
    } else {
        timestamp.date()
    }
}

/// Strip the extension and the timestamp segment; unknown layouts pass through unchanged
pub fn clip_description(filename: &str) -> String {
    let stem = filename.strip_suffix(VIDEO_EXTENSION).unwrap_or(filename);

    match stem.split_once(SEGMENT_SEPARATOR) {
        Some((_, rest)) => rest.to_string(),
        None => stem.to_string(),
    }
}
