//! Stage inputs: the target directory and the caller's modification date.

use crate::error::PipelineError;
use chrono::{Datelike, NaiveDate, NaiveTime};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A `yyyy-mm-dd` date applied to artifacts as their modification time.
///
/// The instant used is midnight UTC of that day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ModificationDate(NaiveDate);

impl ModificationDate {
    /// Parse a strict `yyyy-mm-dd` string.
    pub fn parse(input: &str) -> Result<Self, PipelineError> {
        let trimmed = input.trim();
        // chrono accepts unpadded fields; the CLI contract is the fixed-width form.
        let well_formed = trimmed.len() == 10
            && trimmed
                .char_indices()
                .all(|(i, c)| if i == 4 || i == 7 { c == '-' } else { c.is_ascii_digit() });
        if !well_formed {
            return Err(PipelineError::InvalidDate {
                input: input.to_string(),
                reason: "wrong format".into(),
            });
        }
        NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
            .map(Self)
            .map_err(|e| PipelineError::InvalidDate {
                input: input.to_string(),
                reason: e.to_string(),
            })
    }

    /// Today's date in local time.
    pub fn today() -> Self {
        Self(chrono::Local::now().date_naive())
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Seconds since the Unix epoch at midnight UTC.
    pub fn epoch_seconds(&self) -> i64 {
        self.0.and_time(NaiveTime::MIN).and_utc().timestamp()
    }

    /// The same instant as a [`SystemTime`].
    pub fn to_system_time(&self) -> SystemTime {
        let secs = self.epoch_seconds();
        if secs >= 0 {
            UNIX_EPOCH + Duration::from_secs(secs as u64)
        } else {
            UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
        }
    }

    /// `(year, month, day)` as plain integers.
    pub fn ymd(&self) -> (i32, u32, u32) {
        (self.0.year(), self.0.month(), self.0.day())
    }
}

impl FromStr for ModificationDate {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ModificationDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// What every stage is invoked with.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Directory holding the stage input; outputs land here too.
    pub target_directory: PathBuf,
    /// When set, produced artifacts get this modification time.
    pub modification_date: Option<ModificationDate>,
    /// Explicit input file name inside `target_directory`, bypassing discovery.
    pub input_file: Option<String>,
}

impl PipelineRequest {
    pub fn new(target_directory: impl Into<PathBuf>) -> Self {
        Self {
            target_directory: target_directory.into(),
            modification_date: None,
            input_file: None,
        }
    }

    pub fn with_date(mut self, date: ModificationDate) -> Self {
        self.modification_date = Some(date);
        self
    }

    pub fn with_input_file(mut self, name: impl Into<String>) -> Self {
        self.input_file = Some(name.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.target_directory
    }
}

/// Set the modification time of `path` to `date`.
pub fn stamp_mtime(path: &Path, date: ModificationDate) -> Result<(), PipelineError> {
    set_mtime(path, date.to_system_time())
}

/// Set the modification time of `path`, like `touch -d`.
///
/// The file is opened read-only: changing timestamps needs ownership, not
/// write permission, so read-only files are stamped too.
pub fn set_mtime(path: &Path, time: SystemTime) -> Result<(), PipelineError> {
    let file = std::fs::File::open(path).map_err(|e| PipelineError::io(path, e))?;
    file.set_modified(time).map_err(|e| PipelineError::io(path, e))
}
