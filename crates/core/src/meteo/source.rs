//! Ordered, replayable sequences of weather situations.
//!
//! Two source kinds exist: a stationary frequency table (each occupied
//! class becomes one situation) and a transient time series whose entries
//! are matched against a reference table of discretized classes. A series
//! entry without a matching reference row is a skip, not an abort: the
//! clock advances with zero physics.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::core_types::{Degrees, MetersPerSecond, MillimetersPerHour};
use crate::meteo::situation::{SeriesTimestamp, StabilityClass, WeatherSituation};

/// Situation source failures. `DataExhausted` at construction is fatal for
/// the run; everything after that is either a situation or a skip.
#[derive(Debug, Error)]
pub enum MeteoError {
    #[error("meteorological input contains no situations")]
    DataExhausted,
    #[error("invalid meteorological table: {0}")]
    InvalidTable(String),
}

/// Result of pulling the next situation from a source.
#[derive(Debug, Clone)]
pub enum Fetch {
    /// A situation with resolved wind class, ready for physics.
    Situation(WeatherSituation),
    /// A series entry with no matching reference profile: advance the clock,
    /// run zero physics, keep going.
    Skip(WeatherSituation),
    EndOfSequence,
}

/// Matching policy for transient series entries against the reference
/// table. Only exact discretized matching is implemented; interpolation of
/// partially matching profiles is a deliberate extension point, not a
/// default behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MatchPolicy {
    #[default]
    Exact,
}

/// An ordered source of weather situations.
pub trait SituationSource {
    /// Pull the next situation.
    ///
    /// # Errors
    /// `MeteoError` only for unrecoverable source corruption; per-entry
    /// match failures are reported as `Fetch::Skip`.
    fn next_situation(&mut self) -> Result<Fetch, MeteoError>;

    /// Whether particle mass carries over between situations.
    fn is_transient(&self) -> bool {
        false
    }

    /// Emission modulation factor for the situation, 1.0 unless the source
    /// carries a time-factor table.
    fn emission_factor(&self, _situation: &WeatherSituation) -> f32 {
        1.0
    }
}

/// One row of the stationary frequency table: a (direction sector × speed
/// class × stability class) bin with its occurrence frequency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyEntry {
    pub wind_speed: MetersPerSecond,
    pub wind_direction: Degrees,
    pub stability: StabilityClass,
    /// Occurrence frequency (arbitrary units); rows at zero are never
    /// emitted.
    pub frequency: f32,
}

/// Stationary statistics: every occupied table row becomes exactly one
/// situation, in row order. Deterministic and replayable.
pub struct StationaryTable {
    entries: Vec<(u32, FrequencyEntry)>,
    cursor: usize,
    emitted: u32,
}

impl StationaryTable {
    /// Build from the full frequency table, dropping unoccupied rows.
    ///
    /// # Errors
    /// `MeteoError::DataExhausted` when no row has a positive frequency.
    pub fn new(entries: Vec<FrequencyEntry>) -> Result<Self, MeteoError> {
        let occupied: Vec<(u32, FrequencyEntry)> = entries
            .into_iter()
            .enumerate()
            .filter(|(_, e)| e.frequency > 0.0)
            .map(|(row, e)| (row as u32 + 1, e))
            .collect();
        if occupied.is_empty() {
            return Err(MeteoError::DataExhausted);
        }
        Ok(Self {
            entries: occupied,
            cursor: 0,
            emitted: 0,
        })
    }
}

impl SituationSource for StationaryTable {
    fn next_situation(&mut self) -> Result<Fetch, MeteoError> {
        let Some((class_id, entry)) = self.entries.get(self.cursor) else {
            return Ok(Fetch::EndOfSequence);
        };
        self.cursor += 1;
        self.emitted += 1;
        Ok(Fetch::Situation(WeatherSituation {
            index: self.emitted,
            class_id: *class_id,
            timestamp: None,
            wind_speed: entry.wind_speed.value(),
            wind_direction: entry.wind_direction.value(),
            stability: entry.stability,
            mixing_height: None,
            precipitation: 0.0,
        }))
    }
}

/// One transient time-series entry as parsed by the (external) reader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesEntry {
    pub timestamp: SeriesTimestamp,
    pub wind_speed: MetersPerSecond,
    pub wind_direction: Degrees,
    pub stability: StabilityClass,
    pub precipitation: MillimetersPerHour,
}

/// One reference-table row: a discretized wind class a series entry may
/// resolve to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    pub wind_speed: MetersPerSecond,
    pub wind_direction: Degrees,
    pub stability: StabilityClass,
}

/// Discretized comparison key: speed to 0.1 m/s, direction to whole
/// degrees. Matching is equality on this key plus the stability class.
#[inline]
fn match_key(speed: MetersPerSecond, direction: Degrees) -> (i32, i32) {
    let dir = direction.normalized();
    (
        (speed.value() * 10.0).round() as i32,
        dir.value().round() as i32 % 360,
    )
}

/// Emission modulation factors per (month, hour), applied to all source
/// strengths of the matching transient situations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionModulation {
    /// `factors[month - 1][hour]`, both 1.0 when absent.
    pub factors: Vec<[f32; 24]>,
}

impl EmissionModulation {
    /// Uniform (identity) modulation.
    #[must_use]
    pub fn uniform() -> Self {
        Self {
            factors: vec![[1.0; 24]; 12],
        }
    }

    #[must_use]
    pub fn factor(&self, timestamp: SeriesTimestamp) -> f32 {
        let month = usize::from(timestamp.month).clamp(1, 12) - 1;
        let hour = usize::from(timestamp.hour).min(23);
        self.factors.get(month).map_or(1.0, |row| row[hour])
    }
}

/// Transient time series resolved against a reference table.
pub struct TransientSeries {
    series: Vec<SeriesEntry>,
    reference: Vec<ReferenceEntry>,
    policy: MatchPolicy,
    modulation: Option<EmissionModulation>,
    cursor: usize,
}

impl TransientSeries {
    /// Build from the parsed series and reference table.
    ///
    /// # Errors
    /// `MeteoError::DataExhausted` when the series is empty;
    /// `MeteoError::InvalidTable` when the reference table is empty (then
    /// nothing could ever match).
    pub fn new(
        series: Vec<SeriesEntry>,
        reference: Vec<ReferenceEntry>,
        policy: MatchPolicy,
        modulation: Option<EmissionModulation>,
    ) -> Result<Self, MeteoError> {
        if series.is_empty() {
            return Err(MeteoError::DataExhausted);
        }
        if reference.is_empty() {
            return Err(MeteoError::InvalidTable(
                "reference table is empty, no series entry could resolve".into(),
            ));
        }
        Ok(Self {
            series,
            reference,
            policy,
            modulation,
            cursor: 0,
        })
    }

    /// Find the reference row realizing the series entry, 1-based.
    fn resolve(&self, entry: &SeriesEntry) -> Option<u32> {
        let MatchPolicy::Exact = self.policy;
        let key = match_key(entry.wind_speed, entry.wind_direction);
        self.reference
            .iter()
            .position(|r| {
                r.stability == entry.stability
                    && match_key(r.wind_speed, r.wind_direction) == key
            })
            .map(|row| row as u32 + 1)
    }
}

impl SituationSource for TransientSeries {
    fn next_situation(&mut self) -> Result<Fetch, MeteoError> {
        let Some(entry) = self.series.get(self.cursor) else {
            return Ok(Fetch::EndOfSequence);
        };
        self.cursor += 1;
        let index = self.cursor as u32;

        let situation = |class_id| WeatherSituation {
            index,
            class_id,
            timestamp: Some(entry.timestamp),
            wind_speed: entry.wind_speed.value(),
            wind_direction: entry.wind_direction.value(),
            stability: entry.stability,
            mixing_height: None,
            precipitation: entry.precipitation.value(),
        };

        match self.resolve(entry) {
            Some(class_id) => Ok(Fetch::Situation(situation(class_id))),
            None => {
                warn!(
                    index,
                    speed = %entry.wind_speed,
                    direction = %entry.wind_direction,
                    stability = entry.stability.as_class(),
                    "no reference profile matches series entry, situation skipped"
                );
                Ok(Fetch::Skip(situation(0)))
            }
        }
    }

    fn is_transient(&self) -> bool {
        true
    }

    fn emission_factor(&self, situation: &WeatherSituation) -> f32 {
        match (&self.modulation, situation.timestamp) {
            (Some(modulation), Some(ts)) => modulation.factor(ts),
            _ => 1.0,
        }
    }
}
