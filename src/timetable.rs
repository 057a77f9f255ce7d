use crate::error::ConfigError;

use ::serde::*;
use indexmap::IndexMap;
use log::*;
use std::fs::OpenOptions;
use std::io::Read;
use std::path::Path;

/// Subject code -> number of classes held that weekday, in file order
pub type DaySchedule = IndexMap<String, u32>;

/// Index 0 is Monday. Between 1 and 7 entries; missing days hold no classes.
pub type WeeklySchedule = Vec<DaySchedule>;

pub const DAYS_PER_WEEK: usize = 7;

/// Every batch's weekly schedule, as stored in timetable_summary.json:
///
/// ```json
/// { "B12": [ {"24CS401PC212": 2, "24CS101PC214": 1}, {...}, ... ] }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timetable {
    batches: IndexMap<String, WeeklySchedule>,
}

impl Timetable {
    pub fn new(batches: IndexMap<String, WeeklySchedule>) -> Result<Self, ConfigError> {
        let timetable = Timetable { batches };
        timetable.validate()?;
        Ok(timetable)
    }

    pub fn from_json_str(data: &str, path: &Path) -> Result<Self, ConfigError> {
        let batches = serde_json::from_str(data).map_err(|source| ConfigError::Json {
            path: path.to_path_buf(),
            source,
        })?;

        Timetable::new(batches)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (batch, week) in &self.batches {
            if week.is_empty() {
                return Err(ConfigError::InvalidSchedule {
                    batch: batch.clone(),
                    reason: "no day entries".to_string(),
                });
            }

            if week.len() > DAYS_PER_WEEK {
                return Err(ConfigError::InvalidSchedule {
                    batch: batch.clone(),
                    reason: format!("{} day entries, expected at most {}", week.len(), DAYS_PER_WEEK),
                });
            }
        }

        Ok(())
    }

    pub fn schedule_for(&self, batch: &str) -> Result<&WeeklySchedule, ConfigError> {
        self.batches
            .get(batch)
            .ok_or_else(|| ConfigError::UnknownBatch(batch.to_string()))
    }

    pub fn batches(&self) -> impl Iterator<Item = &str> {
        self.batches.keys().map(|b| b.as_str())
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }
}

pub fn load_timetable(path: &Path) -> Result<Timetable, ConfigError> {
    let io_err = |source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    };

    let mut file = OpenOptions::new().read(true).open(path).map_err(io_err)?;

    let mut data = String::new();
    file.read_to_string(&mut data).map_err(io_err)?;

    let timetable = Timetable::from_json_str(&data, path)?;

    info!("Loaded timetable for {} batch(es) from {}", timetable.len(), path.display());

    Ok(timetable)
}
