//! Precomputed wind-field store.
//!
//! Fields are keyed by the discretized wind class (speed class × direction
//! × stability). The store prefers a cache hit (in memory first, then a
//! snapshot file from an earlier run or situation) over recomputation.
//! Freshly computed fields are inserted here and persisted asynchronously
//! through the output pipeline so later situations and runs can reuse
//! them.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::meteo::WeatherSituation;
use crate::wind::field::WindField;
use crate::wind::WindError;

/// Discretized wind-class key: speed in deci-m/s, direction in whole
/// degrees, stability class number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WindClassKey {
    pub speed_decis: u16,
    pub direction_deg: u16,
    pub stability: u8,
}

impl WindClassKey {
    #[must_use]
    pub fn from_situation(situation: &WeatherSituation) -> Self {
        let speed = (f64::from(situation.wind_speed.max(0.0)) * 10.0).round() as u16;
        let dir = f64::from(situation.wind_direction.rem_euclid(360.0)).round() as u16 % 360;
        Self {
            speed_decis: speed,
            direction_deg: dir,
            stability: situation.stability.as_class(),
        }
    }

    /// Stable file stem for the persisted snapshot of this class.
    #[must_use]
    pub fn file_stem(&self) -> String {
        format!(
            "flowfield_s{:04}_d{:03}_c{}",
            self.speed_decis, self.direction_deg, self.stability
        )
    }
}

/// Persisted form of a computed wind field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSnapshot {
    pub key: WindClassKey,
    /// Situation that first produced the field (provenance only).
    pub situation_index: u32,
    pub field: WindField,
}

/// In-memory cache over an optional snapshot directory.
pub struct FieldStore {
    directory: Option<PathBuf>,
    fields: FxHashMap<WindClassKey, Arc<WindField>>,
}

impl FieldStore {
    /// Store backed by `directory` for cross-run reuse; `None` keeps the
    /// cache purely in memory.
    #[must_use]
    pub fn new(directory: Option<PathBuf>) -> Self {
        Self {
            directory,
            fields: FxHashMap::default(),
        }
    }

    /// Look up a field for the class. Memory hits are free; otherwise the
    /// snapshot file is probed. A missing file is a clean miss
    /// (`Ok(None)`).
    ///
    /// # Errors
    /// `UnreadableField` when a snapshot file exists but cannot be parsed
    /// or does not match the expected cell count; the control loop treats
    /// this as a skipped situation.
    pub fn lookup(
        &mut self,
        key: WindClassKey,
        expected_cells: usize,
    ) -> Result<Option<Arc<WindField>>, WindError> {
        if let Some(field) = self.fields.get(&key) {
            return Ok(Some(Arc::clone(field)));
        }

        let Some(dir) = &self.directory else {
            return Ok(None);
        };
        let path = dir.join(format!("{}.json", key.file_stem()));
        if !path.exists() {
            return Ok(None);
        }

        let snapshot = read_snapshot(&path)?;
        if snapshot.field.wind_raw().len() != expected_cells {
            return Err(WindError::UnreadableField {
                path,
                detail: format!(
                    "cell count {} does not match the run's grid ({expected_cells})",
                    snapshot.field.wind_raw().len()
                ),
            });
        }
        debug!(?key, "wind field loaded from snapshot store");
        let field = Arc::new(snapshot.field);
        self.fields.insert(key, Arc::clone(&field));
        Ok(Some(field))
    }

    pub fn insert(&mut self, key: WindClassKey, field: Arc<WindField>) {
        self.fields.insert(key, field);
    }
}

fn read_snapshot(path: &Path) -> Result<FieldSnapshot, WindError> {
    let file = File::open(path).map_err(|e| WindError::UnreadableField {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| WindError::UnreadableField {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meteo::StabilityClass;

    fn situation(speed: f32, dir: f32) -> WeatherSituation {
        WeatherSituation {
            index: 1,
            class_id: 1,
            timestamp: None,
            wind_speed: speed,
            wind_direction: dir,
            stability: StabilityClass::Neutral,
            mixing_height: None,
            precipitation: 0.0,
        }
    }

    #[test]
    fn key_discretizes() {
        let a = WindClassKey::from_situation(&situation(3.0, 136.0));
        let b = WindClassKey::from_situation(&situation(3.0001, 135.9997));
        let c = WindClassKey::from_situation(&situation(3.2, 136.0));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.speed_decis, 30);
        assert_eq!(a.direction_deg, 136);
        assert_eq!(a.stability, 4);
    }

    #[test]
    fn file_stem_is_stable() {
        let key = WindClassKey::from_situation(&situation(3.0, 136.0));
        assert_eq!(key.file_stem(), "flowfield_s0030_d136_c4");
    }

    #[test]
    fn memory_miss_without_directory() {
        let mut store = FieldStore::new(None);
        let key = WindClassKey::from_situation(&situation(3.0, 136.0));
        assert!(store.lookup(key, 64).unwrap().is_none());
    }
}
