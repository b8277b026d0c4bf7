//! Timestamp extraction from free-form log lines.
//!
//! A [`TimestampParser`] holds an ordered list of [`TimestampPattern`]s. Each
//! pattern is a regular expression with the named capture groups `year`,
//! `month`, `day`, `hour`, `min`, `sec` and `ms`. Patterns are tried in
//! declaration order against the whole line (unanchored search) and the first
//! one that yields a valid calendar instant wins.
//!
//! # Built-in formats
//!
//! | Name | Example |
//! |------|---------|
//! | `dmy` | `31-12-2024 23:59:59.123` |
//! | `ymd` | `2024-12-31 23:59:59.123` |
//!
//! Longer fractional parts (e.g. microseconds) are accepted; only the first
//! three digits are captured. Timestamps carry no timezone: every log source
//! is assumed to share one.

use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use thiserror::Error;

/// Capture group names every pattern must define.
pub const REQUIRED_GROUPS: [&str; 7] = ["year", "month", "day", "hour", "min", "sec", "ms"];

/// Day-month-year, e.g. `31-12-2024 23:59:59.123`.
pub const DMY_PATTERN: &str = r"(?P<day>\d{2})-(?P<month>\d{2})-(?P<year>\d{4}) (?P<hour>\d{2}):(?P<min>\d{2}):(?P<sec>\d{2})\.(?P<ms>\d{3})";

/// Year-month-day, e.g. `2024-12-31 23:59:59.123`.
pub const YMD_PATTERN: &str = r"(?P<year>\d{4})-(?P<month>\d{2})-(?P<day>\d{2}) (?P<hour>\d{2}):(?P<min>\d{2}):(?P<sec>\d{2})\.(?P<ms>\d{3})";

/// A timestamp pattern was rejected at construction time.
#[derive(Debug, Error)]
pub enum PatternError {
    #[error("Invalid timestamp pattern '{pattern}': {source}")]
    Regex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Timestamp pattern '{pattern}' is missing capture group '{group}'")]
    MissingGroup { pattern: String, group: &'static str },
}

/// One compiled extraction template.
#[derive(Debug, Clone)]
pub struct TimestampPattern {
    regex: Regex,
}

impl TimestampPattern {
    /// Compile a pattern and check that it defines every required group.
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(pattern).map_err(|source| PatternError::Regex {
            pattern: pattern.to_string(),
            source,
        })?;

        let names: Vec<&str> = regex.capture_names().flatten().collect();
        for group in REQUIRED_GROUPS {
            if !names.contains(&group) {
                return Err(PatternError::MissingGroup {
                    pattern: pattern.to_string(),
                    group,
                });
            }
        }

        Ok(Self { regex })
    }

    /// Match this pattern alone against `line`.
    ///
    /// Returns `None` when the pattern does not match or when the captured
    /// fields do not form a real calendar instant (e.g. `31-02-2024`).
    pub fn extract(&self, line: &str) -> Option<NaiveDateTime> {
        let caps = self.regex.captures(line)?;
        let field = |name: &str| -> Option<u32> { caps.name(name)?.as_str().parse().ok() };

        let year: i32 = caps.name("year")?.as_str().parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, field("month")?, field("day")?)?;
        date.and_hms_milli_opt(field("hour")?, field("min")?, field("sec")?, field("ms")?)
    }
}

/// Ordered set of patterns; first match wins.
#[derive(Debug, Clone)]
pub struct TimestampParser {
    patterns: Vec<TimestampPattern>,
}

impl TimestampParser {
    pub fn new(patterns: Vec<TimestampPattern>) -> Self {
        Self { patterns }
    }

    /// Compile a list of pattern strings, in order.
    pub fn from_patterns<S: AsRef<str>>(patterns: &[S]) -> Result<Self, PatternError> {
        let compiled = patterns
            .iter()
            .map(|p| TimestampPattern::new(p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(compiled))
    }

    /// The two formats every harvest understands without configuration.
    pub fn builtin() -> Self {
        Self::from_patterns(&[DMY_PATTERN, YMD_PATTERN])
            .unwrap_or_else(|e| unreachable!("built-in timestamp patterns are valid: {e}"))
    }

    pub fn patterns(&self) -> &[TimestampPattern] {
        &self.patterns
    }

    /// Extract the timestamp of `line`, or `None` if no pattern matches.
    pub fn extract(&self, line: &str) -> Option<NaiveDateTime> {
        self.patterns.iter().find_map(|p| p.extract(line))
    }
}

impl Default for TimestampParser {
    fn default() -> Self {
        Self::builtin()
    }
}
