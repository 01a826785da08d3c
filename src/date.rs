//! Watermark date resolution.
//!
//! A date watermark shows the day the photo was taken. Not every file knows
//! that, so the date comes from the first source that has one:
//!
//! ```text
//! EXIF capture timestamp  →  file modification time  →  configured default  →  none
//!      (always tried)         (--use-file-date)          (--default-date)
//! ```
//!
//! A capture timestamp always wins, whatever the fallback flags say. A
//! malformed timestamp counts as missing, never as an error. Timezones are
//! ignored: the camera's wall-clock date is used as written.
//!
//! Reaching `none` is not fatal here. The exporter decides what to do with
//! the image through [`MissingDatePolicy`].

use crate::imaging::ImageMetadata;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// Output format of every resolved date.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Timestamp layouts seen in the wild. EXIF mandates the first; the others
/// come from editors that rewrite the tag with ISO separators.
const DATETIME_FORMATS: &[&str] = &[
    "%Y:%m:%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y:%m:%d %H:%M",
];
const DATE_ONLY_FORMATS: &[&str] = &["%Y:%m:%d", "%Y-%m-%d"];

/// Where a resolved date came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateSource {
    Exif,
    FileMtime,
    Default,
    None,
}

impl fmt::Display for DateSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DateSource::Exif => "exif",
            DateSource::FileMtime => "file-mtime",
            DateSource::Default => "default",
            DateSource::None => "none",
        })
    }
}

/// A resolved watermark date. `text` is empty exactly when `source` is
/// [`DateSource::None`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateInfo {
    pub text: String,
    pub source: DateSource,
}

impl DateInfo {
    fn from_date(date: NaiveDate, source: DateSource) -> Self {
        Self {
            text: date.format(DATE_FORMAT).to_string(),
            source,
        }
    }

    pub fn none() -> Self {
        Self {
            text: String::new(),
            source: DateSource::None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.source != DateSource::None
    }
}

/// Fallbacks consulted when the capture timestamp is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DateOptions {
    pub use_file_date: bool,
    /// Already validated; see [`parse_default_date`].
    pub default_date: Option<NaiveDate>,
}

/// What to do with an image whose date watermark resolved to nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MissingDatePolicy {
    /// Leave the image out of the export and warn.
    #[default]
    Skip,
    /// Substitute an empty string and export anyway.
    Empty,
}

impl FromStr for MissingDatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "skip" => Ok(MissingDatePolicy::Skip),
            "empty" => Ok(MissingDatePolicy::Empty),
            other => Err(format!(
                "unknown missing-date policy '{other}': expected skip or empty"
            )),
        }
    }
}

/// Resolve the watermark date for one image.
pub fn resolve(
    metadata: &ImageMetadata,
    file_modified_at: Option<SystemTime>,
    options: &DateOptions,
) -> DateInfo {
    if let Some(date) = metadata
        .captured_at
        .as_deref()
        .and_then(parse_capture_timestamp)
    {
        return DateInfo::from_date(date, DateSource::Exif);
    }

    if options.use_file_date {
        if let Some(modified) = file_modified_at {
            let local: DateTime<Local> = modified.into();
            return DateInfo::from_date(local.date_naive(), DateSource::FileMtime);
        }
    }

    if let Some(date) = options.default_date {
        return DateInfo::from_date(date, DateSource::Default);
    }

    DateInfo::none()
}

/// Parse an EXIF-style capture timestamp into its calendar date.
///
/// Returns `None` for anything unparsable, including the all-zero
/// placeholder some cameras write when the clock was never set.
pub fn parse_capture_timestamp(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    if trimmed.is_empty() {
        return None;
    }

    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .map(|dt| dt.date())
        .or_else(|| {
            DATE_ONLY_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        })
}

/// Validate a user-supplied `YYYY-MM-DD` default date.
pub fn parse_default_date(raw: &str) -> Result<NaiveDate, String> {
    let trimmed = raw.trim();
    let well_formed = trimmed.len() == 10
        && trimmed
            .char_indices()
            .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
    if !well_formed {
        return Err(format!("default date '{raw}' must be YYYY-MM-DD"));
    }
    NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
        .map_err(|e| format!("default date '{raw}' is not a calendar date: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn with_capture(raw: &str) -> ImageMetadata {
        ImageMetadata {
            captured_at: Some(raw.to_string()),
        }
    }

    fn all_fallbacks() -> DateOptions {
        DateOptions {
            use_file_date: true,
            default_date: Some(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap()),
        }
    }

    fn mtime(y: i32, m: u32, d: u32, h: u32) -> SystemTime {
        Local
            .with_ymd_and_hms(y, m, d, h, 30, 0)
            .single()
            .expect("unambiguous local time")
            .into()
    }

    // =========================================================================
    // Priority order
    // =========================================================================

    #[test]
    fn exif_wins_regardless_of_fallbacks() {
        let meta = with_capture("2021:07:04 18:22:01");
        for options in [DateOptions::default(), all_fallbacks()] {
            let info = resolve(&meta, Some(mtime(2024, 1, 2, 12)), &options);
            assert_eq!(info.text, "2021-07-04");
            assert_eq!(info.source, DateSource::Exif);
        }
    }

    #[test]
    fn file_mtime_used_when_exif_missing() {
        let options = DateOptions {
            use_file_date: true,
            default_date: None,
        };
        let info = resolve(&ImageMetadata::default(), Some(mtime(2022, 3, 9, 23)), &options);
        assert_eq!(info.text, "2022-03-09");
        assert_eq!(info.source, DateSource::FileMtime);
    }

    #[test]
    fn file_mtime_follows_local_calendar_day() {
        let options = DateOptions {
            use_file_date: true,
            default_date: None,
        };
        let early = mtime(2019, 12, 31, 0);
        let info = resolve(&ImageMetadata::default(), Some(early), &options);
        assert_eq!(info.text, "2019-12-31");

        let next_day = early + std::time::Duration::from_secs(24 * 60 * 60);
        let info = resolve(&ImageMetadata::default(), Some(next_day), &options);
        assert_eq!(info.text, "2020-01-01");
    }

    #[test]
    fn file_mtime_beats_default() {
        let info = resolve(&ImageMetadata::default(), Some(mtime(2022, 3, 9, 12)), &all_fallbacks());
        assert_eq!(info.source, DateSource::FileMtime);
    }

    #[test]
    fn default_date_when_no_exif_and_file_date_off() {
        let options = DateOptions {
            use_file_date: false,
            default_date: Some(parse_default_date("2023-05-01").unwrap()),
        };
        let info = resolve(&ImageMetadata::default(), Some(mtime(2022, 3, 9, 12)), &options);
        assert_eq!(info.text, "2023-05-01");
        assert_eq!(info.source, DateSource::Default);
    }

    #[test]
    fn default_used_when_file_date_enabled_but_mtime_unknown() {
        let info = resolve(&ImageMetadata::default(), None, &all_fallbacks());
        assert_eq!(info.source, DateSource::Default);
        assert_eq!(info.text, "2000-01-01");
    }

    #[test]
    fn nothing_available_resolves_to_none() {
        let info = resolve(&ImageMetadata::default(), Some(mtime(2022, 3, 9, 12)), &DateOptions::default());
        assert_eq!(info, DateInfo::none());
        assert!(!info.is_resolved());
        assert!(info.text.is_empty());
    }

    #[test]
    fn malformed_exif_falls_through() {
        let options = DateOptions {
            use_file_date: false,
            default_date: Some(parse_default_date("2023-05-01").unwrap()),
        };
        for raw in ["", "garbage", "2021:13:45 10:00:00", "0000:00:00 00:00:00", "   "] {
            let info = resolve(&with_capture(raw), None, &options);
            assert_eq!(info.source, DateSource::Default, "input {raw:?}");
        }
    }

    // =========================================================================
    // Timestamp parsing
    // =========================================================================

    #[test]
    fn parses_common_timestamp_layouts() {
        let expected = NaiveDate::from_ymd_opt(2021, 7, 4);
        for raw in [
            "2021:07:04 18:22:01",
            "2021-07-04 18:22:01",
            "2021-07-04T18:22:01",
            "2021:07:04 18:22",
            "2021:07:04",
            "2021-07-04",
            "2021:07:04 18:22:01\0",
            " 2021:07:04 18:22:01 ",
        ] {
            assert_eq!(parse_capture_timestamp(raw), expected, "input {raw:?}");
        }
    }

    #[test]
    fn default_date_must_be_iso() {
        assert!(parse_default_date("2023-05-01").is_ok());
        for bad in ["2023/05/01", "2023-5-1", "01-05-2023", "2023-02-30", "", "2023-05-01x"] {
            assert!(parse_default_date(bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn missing_date_policy_parses() {
        assert_eq!("skip".parse::<MissingDatePolicy>().unwrap(), MissingDatePolicy::Skip);
        assert_eq!("empty".parse::<MissingDatePolicy>().unwrap(), MissingDatePolicy::Empty);
        assert!("drop".parse::<MissingDatePolicy>().is_err());
        assert_eq!(MissingDatePolicy::default(), MissingDatePolicy::Skip);
    }

    #[test]
    fn date_source_display_matches_tags() {
        assert_eq!(DateSource::Exif.to_string(), "exif");
        assert_eq!(DateSource::FileMtime.to_string(), "file-mtime");
        assert_eq!(DateSource::Default.to_string(), "default");
        assert_eq!(DateSource::None.to_string(), "none");
    }
}
