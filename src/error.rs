//! Error types for skipcount.
//!
//! Misconfiguration and unknown subjects are fatal and surface as errors.
//! A portal page without the expected attendance table is not an error at
//! all: it comes back as `AttendanceReport::Unavailable`.

use std::path::PathBuf;
use thiserror::Error;

/// Top level error returned by a run.
#[derive(Error, Debug)]
pub enum SkipError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    #[error("Portal error: {0}")]
    Portal(#[from] PortalError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Timetable and settings problems.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed timetable {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Malformed settings file {path}: {source}")]
    Ron {
        path: PathBuf,
        #[source]
        source: ron::error::SpannedError,
    },

    #[error("No timetable found for batch {0}")]
    UnknownBatch(String),

    #[error("Invalid schedule for batch {batch}: {reason}")]
    InvalidSchedule { batch: String, reason: String },

    #[error("Course name '{name}' is claimed by both {first} and {second}")]
    DuplicateCourseName {
        name: String,
        first: String,
        second: String,
    },

    #[error("Attendance threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("Working days per week must be at most 7, got {0}")]
    InvalidWorkingDays(usize),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LookupError {
    #[error("No course name for subject code {0}")]
    UnknownSubject(String),
}

/// Failures talking to or reading the student portal.
#[derive(Error, Debug)]
pub enum PortalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Login failed, dashboard saved to {debug_page}")]
    LoginFailed { debug_page: PathBuf },

    #[error("Couldn't find batch info")]
    BatchInfoMissing,

    #[error("Batch number not found")]
    BatchNumberMissing,

    #[error("Failed to read input: {0}")]
    Prompt(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SkipError>;
