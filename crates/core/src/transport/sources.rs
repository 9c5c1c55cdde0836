//! Emission source records.
//!
//! These are the abstract source records the core consumes; parsing of the
//! concrete source file dialects lives outside this crate. Geometry only
//! matters for where particles start; everything downstream sees mass.

use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Spatial shape of an emission source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SourceGeometry {
    /// Stack or vent at a fixed point.
    Point { x: f32, y: f32, height: f32 },
    /// Road segment or similar line emitter between two points.
    Line {
        x0: f32,
        y0: f32,
        x1: f32,
        y1: f32,
        height: f32,
    },
    /// Areal emitter (cadastre cell, storage yard) with a release depth.
    Area {
        x_min: f32,
        y_min: f32,
        x_max: f32,
        y_max: f32,
        height: f32,
        depth: f32,
    },
    /// Tunnel portal: an opening of the given width/height whose jet gives
    /// particles an initial vertical kick.
    TunnelPortal {
        x: f32,
        y: f32,
        width: f32,
        height: f32,
        exit_velocity: f32,
    },
}

/// One emission source with its strength and pollutant grouping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmissionSource {
    pub name: String,
    pub geometry: SourceGeometry,
    /// Emission strength (mass/s).
    pub strength: f64,
    /// Source group the accumulation is keyed by.
    pub source_group: usize,
    /// Dry deposition velocity (m/s); 0 disables dry deposition.
    pub deposition_velocity: f32,
}

impl EmissionSource {
    /// Sample a release position (absolute x, y and height above ground)
    /// plus an initial vertical velocity for portal jets.
    pub fn sample_release(&self, rng: &mut StdRng) -> (f32, f32, f32, f32) {
        match &self.geometry {
            SourceGeometry::Point { x, y, height } => (*x, *y, *height, 0.0),
            SourceGeometry::Line { x0, y0, x1, y1, height } => {
                let t: f32 = rng.random_range(0.0..1.0);
                (x0 + (x1 - x0) * t, y0 + (y1 - y0) * t, *height, 0.0)
            }
            SourceGeometry::Area {
                x_min,
                y_min,
                x_max,
                y_max,
                height,
                depth,
            } => {
                let x = rng.random_range(*x_min..*x_max);
                let y = rng.random_range(*y_min..*y_max);
                let dz = if *depth > 0.0 {
                    rng.random_range(0.0..*depth)
                } else {
                    0.0
                };
                (x, y, height + dz, 0.0)
            }
            SourceGeometry::TunnelPortal {
                x,
                y,
                width,
                height,
                exit_velocity,
            } => {
                let half = (width * 0.5).max(0.05);
                let px = x + rng.random_range(-half..half);
                let py = y + rng.random_range(-half..half);
                let pz = rng.random_range(0.0..height.max(0.1));
                (px, py, pz, *exit_velocity)
            }
        }
    }
}

/// Distribute the global particle budget over the sources proportionally
/// to their emission strengths (largest-remainder rounding). Statistical
/// resolution is spent where the mass is: a stronger source never receives
/// fewer particles than a weaker one, and the total never exceeds the
/// budget.
#[must_use]
pub fn allocate_particles(budget: usize, strengths: &[f64]) -> Vec<usize> {
    let total: f64 = strengths.iter().filter(|s| **s > 0.0).sum();
    if total <= 0.0 || budget == 0 {
        return vec![0; strengths.len()];
    }

    let mut counts: Vec<usize> = Vec::with_capacity(strengths.len());
    let mut remainders: Vec<(usize, f64)> = Vec::with_capacity(strengths.len());
    let mut assigned = 0_usize;

    for (idx, strength) in strengths.iter().enumerate() {
        if *strength <= 0.0 {
            counts.push(0);
            continue;
        }
        let quota = budget as f64 * strength / total;
        let floor = quota.floor() as usize;
        counts.push(floor);
        assigned += floor;
        remainders.push((idx, quota - floor as f64));
    }

    // Hand out the leftover seats by descending remainder; ties go to the
    // earlier source so the result is deterministic.
    remainders.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut leftover = budget.saturating_sub(assigned);
    for (idx, _) in remainders {
        if leftover == 0 {
            break;
        }
        counts[idx] += 1;
        leftover -= 1;
    }

    counts
}

/// Release plan: particle-id ranges per source, so any worker can map a
/// particle id back to its source without shared state.
#[derive(Debug, Clone)]
pub struct ReleasePlan {
    /// Exclusive prefix sums of per-source counts; `ends[s]` is one past
    /// the last particle id of source s.
    ends: Vec<usize>,
    /// Mass carried by one particle of source s.
    particle_mass: Vec<f64>,
}

impl ReleasePlan {
    /// Build the plan for one situation.
    ///
    /// Each particle of source s carries
    /// `strength · dispersion_time · emission_factor / count` so the pass
    /// releases exactly the source's emitted mass.
    #[must_use]
    pub fn new(
        sources: &[EmissionSource],
        budget: usize,
        dispersion_time: f32,
        emission_factor: f32,
    ) -> Self {
        let strengths: Vec<f64> = sources.iter().map(|s| s.strength).collect();
        let counts = allocate_particles(budget, &strengths);

        let mut ends = Vec::with_capacity(sources.len());
        let mut particle_mass = Vec::with_capacity(sources.len());
        let mut cursor = 0_usize;
        for (source, count) in sources.iter().zip(&counts) {
            cursor += count;
            ends.push(cursor);
            let mass = if *count == 0 {
                0.0
            } else {
                source.strength * f64::from(dispersion_time) * f64::from(emission_factor)
                    / *count as f64
            };
            particle_mass.push(mass);
        }

        Self {
            ends,
            particle_mass,
        }
    }

    /// Total particles this situation releases.
    #[must_use]
    pub fn total(&self) -> usize {
        self.ends.last().copied().unwrap_or(0)
    }

    /// Source index owning the particle id.
    #[must_use]
    pub fn source_of(&self, particle_id: usize) -> usize {
        self.ends.partition_point(|end| *end <= particle_id)
    }

    #[must_use]
    pub fn mass_of(&self, source_idx: usize) -> f64 {
        self.particle_mass[source_idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_respects_budget_and_monotonicity() {
        let strengths = [5.0, 1.0, 3.0, 0.0, 11.0];
        let counts = allocate_particles(1000, &strengths);
        assert!(counts.iter().sum::<usize>() <= 1000);
        assert_eq!(counts[3], 0);
        // Stronger source, at least as many particles.
        assert!(counts[4] >= counts[0]);
        assert!(counts[0] >= counts[2]);
        assert!(counts[2] >= counts[1]);
    }

    #[test]
    fn allocation_handles_degenerate_inputs() {
        assert_eq!(allocate_particles(100, &[]), Vec::<usize>::new());
        assert_eq!(allocate_particles(100, &[0.0, 0.0]), vec![0, 0]);
        assert_eq!(allocate_particles(0, &[1.0]), vec![0]);
    }

    #[test]
    fn plan_maps_ids_to_sources() {
        let sources = vec![
            EmissionSource {
                name: "stack A".into(),
                geometry: SourceGeometry::Point {
                    x: 0.0,
                    y: 0.0,
                    height: 10.0,
                },
                strength: 1.0,
                source_group: 0,
                deposition_velocity: 0.0,
            },
            EmissionSource {
                name: "stack B".into(),
                geometry: SourceGeometry::Point {
                    x: 50.0,
                    y: 0.0,
                    height: 10.0,
                },
                strength: 3.0,
                source_group: 1,
                deposition_velocity: 0.0,
            },
        ];
        let plan = ReleasePlan::new(&sources, 100, 3600.0, 1.0);
        assert_eq!(plan.total(), 100);
        assert_eq!(plan.source_of(0), 0);
        assert_eq!(plan.source_of(plan.total() - 1), 1);

        // Released mass equals strength · duration for each source.
        let counts = allocate_particles(100, &[1.0, 3.0]);
        let released_a = plan.mass_of(0) * counts[0] as f64;
        let released_b = plan.mass_of(1) * counts[1] as f64;
        assert!((released_a - 3600.0).abs() < 1e-6);
        assert!((released_b - 3.0 * 3600.0).abs() < 1e-6);
    }
}
