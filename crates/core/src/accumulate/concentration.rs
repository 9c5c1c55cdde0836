//! Raw mass accumulation and the per-situation volume correction.
//!
//! During a dispersion pass, particle mass·dt sums are collected per
//! (column, output slice, source group) plus a surface deposition sum per
//! (column, source group). The volume correction converts those raw sums
//! into physical concentration (mass/m³) and deposition flux (mass/m²·s)
//! exactly once per situation.

use serde::{Deserialize, Serialize};

use crate::domain::GridGeometry;

/// Accumulation slab produced by one advection pass (one worker chunk or
/// one whole pass). Layout matches `ConcentrationGrid`; deltas merge in a
/// fixed order so summation stays deterministic.
#[derive(Debug, Clone)]
pub struct AccumulationDelta {
    nx: usize,
    ny: usize,
    n_slices: usize,
    #[allow(dead_code)]
    n_groups: usize,
    nz: usize,
    /// mass·dt sums per (group, slice, j, i).
    pub slices: Vec<f64>,
    /// Surface deposition mass per (group, j, i).
    pub deposition: Vec<f64>,
    /// mass·dt sums per (group, k, j, i); only tracked in transient mode
    /// where the 3-D field feeds the carry-over pool.
    pub volume: Vec<f64>,
}

impl AccumulationDelta {
    #[must_use]
    pub fn new(geometry: &GridGeometry, n_groups: usize, track_volume: bool) -> Self {
        let nx = geometry.nx();
        let ny = geometry.ny();
        let n_slices = geometry.slice_count();
        let nz = geometry.nz();
        Self {
            nx,
            ny,
            n_slices,
            n_groups,
            nz,
            slices: vec![0.0; n_groups * n_slices * ny * nx],
            deposition: vec![0.0; n_groups * ny * nx],
            volume: if track_volume {
                vec![0.0; n_groups * nz * ny * nx]
            } else {
                Vec::new()
            },
        }
    }

    #[inline]
    pub fn slice_index(&self, group: usize, slice: usize, i: usize, j: usize) -> usize {
        ((group * self.n_slices + slice) * self.ny + j) * self.nx + i
    }

    #[inline]
    pub fn surface_index(&self, group: usize, i: usize, j: usize) -> usize {
        (group * self.ny + j) * self.nx + i
    }

    #[inline]
    pub fn volume_index(&self, group: usize, i: usize, j: usize, k: usize) -> usize {
        ((group * self.nz + k) * self.ny + j) * self.nx + i
    }

    pub fn tracks_volume(&self) -> bool {
        !self.volume.is_empty()
    }

    /// Element-wise merge; the caller controls the order.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.slices.len(), other.slices.len());
        for (a, b) in self.slices.iter_mut().zip(&other.slices) {
            *a += b;
        }
        for (a, b) in self.deposition.iter_mut().zip(&other.deposition) {
            *a += b;
        }
        if self.tracks_volume() && other.tracks_volume() {
            for (a, b) in self.volume.iter_mut().zip(&other.volume) {
                *a += b;
            }
        }
    }
}

/// The per-situation concentration/deposition accumulator, normalized once
/// per situation by the volume correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcentrationGrid {
    nx: usize,
    ny: usize,
    n_slices: usize,
    n_groups: usize,
    /// Concentration per (group, slice, j, i): raw mass·dt before
    /// normalization, mass/m³ after.
    pub concentration: Vec<f64>,
    /// Deposition per (group, j, i): raw mass before normalization,
    /// mass/(m²·s) after.
    pub deposition: Vec<f64>,
    /// Which situation this grid currently belongs to.
    situation_index: u32,
    normalized: bool,
}

impl ConcentrationGrid {
    #[must_use]
    pub fn new(geometry: &GridGeometry, n_groups: usize) -> Self {
        let nx = geometry.nx();
        let ny = geometry.ny();
        let n_slices = geometry.slice_count();
        Self {
            nx,
            ny,
            n_slices,
            n_groups,
            concentration: vec![0.0; n_groups * n_slices * ny * nx],
            deposition: vec![0.0; n_groups * ny * nx],
            situation_index: 0,
            normalized: false,
        }
    }

    pub fn n_groups(&self) -> usize {
        self.n_groups
    }

    pub fn n_slices(&self) -> usize {
        self.n_slices
    }

    pub fn situation_index(&self) -> u32 {
        self.situation_index
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    #[inline]
    pub fn value(&self, group: usize, slice: usize, i: usize, j: usize) -> f64 {
        self.concentration[((group * self.n_slices + slice) * self.ny + j) * self.nx + i]
    }

    #[inline]
    pub fn deposition_at(&self, group: usize, i: usize, j: usize) -> f64 {
        self.deposition[(group * self.ny + j) * self.nx + i]
    }

    /// Clear for the next situation's pure-steady pass.
    pub fn reset_for(&mut self, situation_index: u32) {
        self.concentration.fill(0.0);
        self.deposition.fill(0.0);
        self.situation_index = situation_index;
        self.normalized = false;
    }

    /// Fold a pass delta into the raw sums. Panics in debug builds when
    /// called after normalization; release builds ignore the hazard flag
    /// because the control loop enforces the ordering.
    pub fn absorb(&mut self, delta: &AccumulationDelta) {
        debug_assert!(!self.normalized, "absorb after normalization");
        for (a, b) in self.concentration.iter_mut().zip(&delta.slices) {
            *a += b;
        }
        for (a, b) in self.deposition.iter_mut().zip(&delta.deposition) {
            *a += b;
        }
    }

    /// The volume correction: raw mass·dt → mass/m³ and raw deposition
    /// mass → mass/(m²·s), uniformly over every cell.
    ///
    /// Idempotent per situation: a second call for the same situation is a
    /// no-op, so re-running the normalization step can never double-scale.
    /// Returns whether the correction was applied by this call.
    pub fn normalize(&mut self, geometry: &GridGeometry, situation_duration: f32) -> bool {
        if self.normalized {
            return false;
        }
        let duration = f64::from(situation_duration.max(1.0e-6));
        let slice_volume =
            f64::from(geometry.cell_area()) * f64::from(geometry.slice_thickness());
        let conc_factor = 1.0 / (duration * slice_volume);
        let depo_factor = 1.0 / (duration * f64::from(geometry.cell_area()));

        for v in &mut self.concentration {
            *v *= conc_factor;
        }
        for v in &mut self.deposition {
            *v *= depo_factor;
        }
        self.normalized = true;
        true
    }

    /// Total mass-proxy over all groups/slices; used by tests and the
    /// run summary.
    #[must_use]
    pub fn total_concentration(&self) -> f64 {
        self.concentration.iter().sum()
    }
}
