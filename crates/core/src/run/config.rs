//! Run configuration.
//!
//! Everything the control loop needs beyond the domain, sources and
//! meteorology: particle budget, time stepping, thread bound, seed policy,
//! transient threshold and output locations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::transport::{TransportConfig, WetScavenging};
use crate::wind::SolverConfig;

/// Controls for one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Dispersion time per situation (s); also every particle's travel
    /// budget.
    pub dispersion_time: f32,
    /// Particle release rate (particles per second of dispersion time).
    /// The per-situation release count is `dispersion_time *
    /// particle_rate`, capped by `max_particles`.
    pub particle_rate: f32,
    /// Hard cap on particles per situation.
    pub max_particles: usize,
    /// Particle integration time step (s).
    pub time_step: f32,
    /// Worker threads for the advection passes; 0 uses the rayon default.
    pub max_threads: usize,
    /// Deterministic particle streams: seeds derive purely from situation
    /// parameters and runs reproduce bit-identically.
    pub deterministic: bool,
    /// Memory-effect concentration threshold (mass/m³) for the transient
    /// carry-over pool.
    pub transient_threshold: f64,
    pub wet_scavenging: WetScavenging,
    pub solver: SolverConfig,
    /// Where artifacts and the run log go.
    pub output_directory: PathBuf,
    /// Snapshot directory for precomputed wind fields; `None` disables
    /// cross-run reuse.
    pub field_store_directory: Option<PathBuf>,
    /// Particles per advection worker chunk.
    pub chunk_size: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dispersion_time: 3600.0,
            particle_rate: 100.0,
            max_particles: 400_000,
            time_step: 2.0,
            max_threads: 0,
            deterministic: true,
            transient_threshold: 1.0e-9,
            wet_scavenging: WetScavenging::default(),
            solver: SolverConfig::default(),
            output_directory: PathBuf::from("result"),
            field_store_directory: None,
            chunk_size: 256,
        }
    }
}

impl RunConfig {
    /// Per-situation particle budget: rate × dispersion time, capped.
    #[must_use]
    pub fn particle_budget(&self) -> usize {
        let target = (f64::from(self.dispersion_time) * f64::from(self.particle_rate)) as usize;
        target.min(self.max_particles).max(1)
    }

    /// Assemble the transport engine controls.
    #[must_use]
    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            time_step: self.time_step,
            dispersion_time: self.dispersion_time,
            chunk_size: self.chunk_size,
            wet_scavenging: self.wet_scavenging,
        }
    }
}
