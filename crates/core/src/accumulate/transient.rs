//! Non-steady-state carry-over pool for transient runs.
//!
//! After each situation, the 3-D mass field above the memory-effect
//! threshold is absorbed into the pool; cells below the threshold are
//! dropped. At the start of the next situation the pool is drained back
//! into carrier particles for the transient pass, so pollutant mass
//! persists across situations instead of vanishing at each boundary.

use serde::{Deserialize, Serialize};

use crate::accumulate::concentration::AccumulationDelta;
use crate::domain::GridGeometry;

/// One drained pool cell, ready to become a carrier particle.
#[derive(Debug, Clone, Copy)]
pub struct PoolRelease {
    pub group: usize,
    pub i: usize,
    pub j: usize,
    pub k: usize,
    /// Carried mass (mass units, already time-averaged).
    pub mass: f64,
}

/// Per-cell carried-over mass per source group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransientPool {
    nx: usize,
    ny: usize,
    nz: usize,
    n_groups: usize,
    /// Carried mass per (group, k, j, i).
    mass: Vec<f64>,
    /// Concentration threshold (mass/m³) below which carry-over mass is
    /// considered negligible and dropped.
    threshold: f64,
}

impl TransientPool {
    #[must_use]
    pub fn new(geometry: &GridGeometry, n_groups: usize, threshold: f64) -> Self {
        Self {
            nx: geometry.nx(),
            ny: geometry.ny(),
            nz: geometry.nz(),
            n_groups,
            mass: vec![0.0; n_groups * geometry.cell_count()],
            threshold,
        }
    }

    #[inline]
    fn index(&self, group: usize, i: usize, j: usize, k: usize) -> usize {
        ((group * self.nz + k) * self.ny + j) * self.nx + i
    }

    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.mass.iter().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mass.iter().all(|m| *m == 0.0)
    }

    #[must_use]
    pub fn mass_at(&self, group: usize, i: usize, j: usize, k: usize) -> f64 {
        self.mass[self.index(group, i, j, k)]
    }

    /// Absorb a situation's 3-D accumulation into the pool.
    ///
    /// The delta carries raw mass·dt sums; dividing by the situation
    /// duration yields the time-averaged mass residing in each cell. Cells
    /// whose implied concentration stays below the threshold are dropped;
    /// the memory effect only keeps what still matters.
    pub fn absorb(
        &mut self,
        geometry: &GridGeometry,
        delta: &AccumulationDelta,
        situation_duration: f32,
    ) {
        if !delta.tracks_volume() {
            return;
        }
        let duration = f64::from(situation_duration.max(1.0e-6));
        for group in 0..self.n_groups {
            for k in 0..self.nz {
                let cell_volume = f64::from(geometry.cell_volume(k));
                for j in 0..self.ny {
                    for i in 0..self.nx {
                        let raw = delta.volume[delta.volume_index(group, i, j, k)];
                        if raw <= 0.0 {
                            continue;
                        }
                        let cell_mass = raw / duration;
                        let concentration = cell_mass / cell_volume;
                        if concentration >= self.threshold {
                            let idx = self.index(group, i, j, k);
                            self.mass[idx] += cell_mass;
                        }
                    }
                }
            }
        }
    }

    /// Drain the pool into carrier releases for the next transient pass.
    /// The mass moves onto the particles; the pool is left empty and will
    /// be refilled from that pass's own accumulation.
    pub fn drain(&mut self) -> Vec<PoolRelease> {
        let mut releases = Vec::new();
        for group in 0..self.n_groups {
            for k in 0..self.nz {
                for j in 0..self.ny {
                    for i in 0..self.nx {
                        let idx = self.index(group, i, j, k);
                        let mass = self.mass[idx];
                        if mass > 0.0 {
                            releases.push(PoolRelease {
                                group,
                                i,
                                j,
                                k,
                                mass,
                            });
                            self.mass[idx] = 0.0;
                        }
                    }
                }
            }
        }
        releases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn geometry() -> GridGeometry {
        GridGeometry::new(4, 4, 3, 10.0, 10.0, 2.0, 1.0, 0.0, 0.0, vec![1.0]).unwrap()
    }

    #[test]
    fn absorbs_above_threshold_only() {
        let g = geometry();
        // Cell volume 200 m³, duration 100 s.
        let mut pool = TransientPool::new(&g, 1, 1.0e-3);
        let mut delta = AccumulationDelta::new(&g, 1, true);
        // Implied concentration: 1000/100/200 = 0.05, kept.
        let hot = delta.volume_index(0, 1, 1, 0);
        delta.volume[hot] = 1000.0;
        // Implied concentration: 1/100/200 = 5e-5, dropped.
        let cold = delta.volume_index(0, 2, 2, 0);
        delta.volume[cold] = 1.0;

        pool.absorb(&g, &delta, 100.0);
        assert_relative_eq!(pool.mass_at(0, 1, 1, 0), 10.0);
        assert_eq!(pool.mass_at(0, 2, 2, 0), 0.0);
    }

    #[test]
    fn drain_empties_the_pool() {
        let g = geometry();
        let mut pool = TransientPool::new(&g, 1, 0.0);
        let mut delta = AccumulationDelta::new(&g, 1, true);
        let idx = delta.volume_index(0, 3, 2, 1);
        delta.volume[idx] = 500.0;
        pool.absorb(&g, &delta, 50.0);
        assert!(!pool.is_empty());

        let releases = pool.drain();
        assert_eq!(releases.len(), 1);
        assert_relative_eq!(releases[0].mass, 10.0);
        assert_eq!((releases[0].i, releases[0].j, releases[0].k), (3, 2, 1));
        assert!(pool.is_empty());
    }
}
