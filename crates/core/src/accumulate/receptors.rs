//! Fixed receptor points and their concentration time series.
//!
//! Receptors are created at startup, sampled every situation (skipped
//! situations contribute zero) and finalized into per-receptor statistics
//! at run end.

use serde::{Deserialize, Serialize};

use crate::accumulate::concentration::ConcentrationGrid;
use crate::domain::GridGeometry;

/// A fixed evaluation point, independent of the grid resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receptor {
    pub id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    /// Sampling height above ground (m).
    pub z: f32,
}

/// End-of-run statistics for one receptor's series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptorStatistics {
    pub id: u32,
    pub mean: f64,
    pub variance: f64,
    /// Standard error of the series mean.
    pub standard_error: f64,
}

/// All receptors of a run plus their accumulated series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceptorSet {
    receptors: Vec<Receptor>,
    /// One concentration series per receptor, one entry per situation.
    series: Vec<Vec<f64>>,
}

impl ReceptorSet {
    #[must_use]
    pub fn new(receptors: Vec<Receptor>) -> Self {
        let series = vec![Vec::new(); receptors.len()];
        Self { receptors, series }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receptors.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.receptors.len()
    }

    pub fn receptors(&self) -> &[Receptor] {
        &self.receptors
    }

    pub fn series(&self, idx: usize) -> &[f64] {
        &self.series[idx]
    }

    /// Sample the normalized grid for every receptor and append to the
    /// series. Nearest cell and nearest output slice; summed over source
    /// groups. Receptors outside the domain record zero.
    pub fn sample(&mut self, grid: &ConcentrationGrid, geometry: &GridGeometry) {
        for (r_idx, receptor) in self.receptors.iter().enumerate() {
            let value = geometry
                .locate_column(receptor.x, receptor.y)
                .map_or(0.0, |(i, j)| {
                    let slice = nearest_slice(geometry, receptor.z);
                    (0..grid.n_groups())
                        .map(|g| grid.value(g, slice, i, j))
                        .sum()
                });
            self.series[r_idx].push(value);
        }
    }

    /// Append a zero sample for a skipped situation so series stay aligned
    /// with the situation sequence.
    pub fn append_zero(&mut self) {
        for series in &mut self.series {
            series.push(0.0);
        }
    }

    /// Per-receptor statistics over the full run.
    #[must_use]
    pub fn finalize(&self) -> Vec<ReceptorStatistics> {
        self.receptors
            .iter()
            .zip(&self.series)
            .map(|(receptor, series)| {
                let n = series.len() as f64;
                if series.is_empty() {
                    return ReceptorStatistics {
                        id: receptor.id,
                        mean: 0.0,
                        variance: 0.0,
                        standard_error: 0.0,
                    };
                }
                let mean = series.iter().sum::<f64>() / n;
                let variance = series.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                let standard_error = (variance / n).sqrt();
                ReceptorStatistics {
                    id: receptor.id,
                    mean,
                    variance,
                    standard_error,
                }
            })
            .collect()
    }
}

fn nearest_slice(geometry: &GridGeometry, z: f32) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (s, h) in geometry.slice_heights().iter().enumerate() {
        let dist = (z - h).abs();
        if dist < best_dist {
            best = s;
            best_dist = dist;
        }
    }
    best
}
