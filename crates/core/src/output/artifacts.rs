//! Owned snapshot types handed to the background writers.
//!
//! Snapshots are immutable copies (or exclusively transferred values): the
//! next situation's computation never observes data a writer thread is
//! still serializing.

use serde::{Deserialize, Serialize};

use crate::accumulate::{ConcentrationGrid, Receptor, ReceptorStatistics};
use crate::meteo::SeriesTimestamp;

/// Per-situation concentration/deposition snapshot. Skipped situations
/// still produce an artifact (zero fields) so the on-disk sequence stays
/// aligned with the situation index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationArtifact {
    pub situation_index: u32,
    pub skipped: bool,
    pub timestamp: Option<SeriesTimestamp>,
    /// Situation duration the normalization used (s).
    pub dispersion_time: f32,
    pub slice_heights: Vec<f32>,
    pub grid: ConcentrationGrid,
}

impl ConcentrationArtifact {
    /// Stable on-disk name, ordered by situation index.
    #[must_use]
    pub fn file_name(situation_index: u32) -> String {
        format!("{situation_index:05}_concentration.json")
    }
}

/// One receptor with its accumulated series, as written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptorRecord {
    pub receptor: Receptor,
    pub series: Vec<f64>,
}

/// Receptor time-series snapshot; rewritten as the series grows, plus the
/// end-of-run statistics on the final write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptorArtifact {
    /// Number of situations covered by the series.
    pub situation_count: u32,
    pub records: Vec<ReceptorRecord>,
    pub statistics: Option<Vec<ReceptorStatistics>>,
}

impl ReceptorArtifact {
    pub const FILE_NAME: &'static str = "receptors.json";
}
