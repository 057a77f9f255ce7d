// ----------------------------------------------------------------------------
// Run settings. Everything here has a default matching the current semester
// at sraap.in, so the tool works without a settings file. A `skipcount.ron`
// next to the binary overrides any subset of the fields, e.g.
//
//   (
//       sem_end_date: "2025-11-21",
//       holidays: ["2025-11-05", "2025-11-14"],
//       attendance_threshold: 0.75,
//   )
// ----------------------------------------------------------------------------

use crate::error::ConfigError;
use crate::projection::{HolidaySet, ProjectionPolicy, ATTENDANCE_THRESHOLD, WORKING_DAYS_PER_WEEK};

use ::serde::*;
use chrono::NaiveDate;
use indexmap::IndexMap;
use log::*;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "./skipcount.ron";

const DEFAULT_BASE_URL: &str = "https://sraap.in";
const DEFAULT_TIMETABLE_PATH: &str = "./timetable_summary.json";
const DEFAULT_REQUEST_JITTER_MS: u64 = 250;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_sem_end_date")]
    pub sem_end_date: NaiveDate,
    #[serde(default = "default_holidays")]
    pub holidays: HolidaySet,
    #[serde(default = "default_course_names")]
    pub course_names: IndexMap<String, String>,
    #[serde(default = "default_timetable_path")]
    pub timetable_path: PathBuf,
    /// Where dashboard.html / debug_failed.html are written
    #[serde(default = "default_debug_dir")]
    pub debug_dir: PathBuf,
    #[serde(default = "default_attendance_threshold")]
    pub attendance_threshold: f64,
    #[serde(default = "default_working_days")]
    pub working_days: usize,
    /// Upper bound of the random pause between subject requests
    #[serde(default = "default_request_jitter_ms")]
    pub request_jitter_ms: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_sem_end_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 11, 21).unwrap_or(NaiveDate::MIN)
}

fn default_holidays() -> HolidaySet {
    [(2025, 11, 5), (2025, 11, 14), (2025, 12, 13)]
        .iter()
        .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .collect()
}

fn default_course_names() -> IndexMap<String, String> {
    [
        ("24CS002PC215", "AI ASSISTED CODE"),
        ("24CS101PC214", "CLOUD COMPUTING"),
        ("24CS401PC212", "COMPUTER NETWORKS"),
        ("24CS201PC210", "DATA ANALYTICS AND VISUALIZATION"),
        ("24CS301PC211", "INFORMATION MANAGEMENT SYSTEM"),
        ("24CS202PC213", "WEB TECHNOLOGIES AND MOBILE PROGRAMMING"),
    ]
    .iter()
    .map(|(code, name)| (code.to_string(), name.to_string()))
    .collect()
}

fn default_timetable_path() -> PathBuf {
    PathBuf::from(DEFAULT_TIMETABLE_PATH)
}

fn default_debug_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_attendance_threshold() -> f64 {
    ATTENDANCE_THRESHOLD
}

fn default_working_days() -> usize {
    WORKING_DAYS_PER_WEEK
}

fn default_request_jitter_ms() -> u64 {
    DEFAULT_REQUEST_JITTER_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sem_end_date: default_sem_end_date(),
            holidays: default_holidays(),
            course_names: default_course_names(),
            timetable_path: default_timetable_path(),
            debug_dir: default_debug_dir(),
            attendance_threshold: default_attendance_threshold(),
            working_days: default_working_days(),
            request_jitter_ms: default_request_jitter_ms(),
        }
    }
}

impl Config {
    pub fn from_ron_str(data: &str, path: &Path) -> Result<Config, ConfigError> {
        let config: Config = ron::from_str(data).map_err(|source| ConfigError::Ron {
            path: path.to_path_buf(),
            source,
        })?;

        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.attendance_threshold > 0.0 && self.attendance_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.attendance_threshold));
        }

        if self.working_days > 7 {
            return Err(ConfigError::InvalidWorkingDays(self.working_days));
        }

        Ok(())
    }

    pub fn policy(&self) -> ProjectionPolicy {
        ProjectionPolicy {
            threshold: self.attendance_threshold,
            working_days: self.working_days,
        }
    }
}

/// Loads the settings file.
///
/// With no explicit path the default location is tried, and a missing file
/// there just means "use the defaults". An explicit path must exist.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };

    let data = match fs::read_to_string(&path) {
        Ok(data) => data,
        Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => {
            info!("No settings file at {}, using defaults", path.display());
            return Ok(Config::default());
        }
        Err(source) => return Err(ConfigError::Io { path, source }),
    };

    info!("Loaded settings from {}", path.display());

    Config::from_ron_str(&data, &path)
}
