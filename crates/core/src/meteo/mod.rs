//! Meteorological situations and the ordered sources that produce them.

pub mod situation;
pub mod source;

pub use situation::{SeriesTimestamp, StabilityClass, WeatherSituation};
pub use source::{
    EmissionModulation, Fetch, FrequencyEntry, MatchPolicy, MeteoError, ReferenceEntry,
    SeriesEntry, SituationSource, StationaryTable, TransientSeries,
};
