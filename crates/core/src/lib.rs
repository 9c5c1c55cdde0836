//! Lagrangian atmospheric dispersion core.
//!
//! Given a 3-D domain, terrain, buildings, emission sources and an ordered
//! sequence of meteorological situations, this crate computes
//! time-resolved pollutant concentration and deposition fields with a
//! Monte Carlo particle-tracking method coupled to a mass-consistent
//! wind-field solver.
//!
//! The per-situation pipeline: the control loop pulls a situation from its
//! source, resolves a wind field (diagnostic for flat terrain, stored or
//! microscale-computed for complex terrain), advects a particle ensemble
//! through it on a bounded thread pool, volume-corrects the accumulated
//! mass, and hands the artifacts to background writers while the next
//! situation already computes. Transient runs additionally carry
//! non-steady-state particle mass across situations through a memory
//! pool. Cancellation is cooperative and honoured at loop checkpoints.

// Core types and utilities
pub mod core_types;

// Static per-run state
pub mod domain;

// Weather situations and their sources
pub mod meteo;

// Wind-field solvers and the precomputed-field store
pub mod wind;

// Monte Carlo particle transport
pub mod transport;

// Concentration/deposition accumulation and receptors
pub mod accumulate;

// Background artifact writers
pub mod output;

// The control loop
pub mod run;

// Re-export the assembly surface
pub use accumulate::{ConcentrationGrid, Receptor, ReceptorSet, ReceptorStatistics};
pub use core_types::{
    situation_seed_v1, Degrees, MetersPerSecond, MillimetersPerHour, Vec3, SEED_VERSION,
};
pub use domain::{Building, Domain, DomainMode, GridGeometry, TerrainData, VegetationPatch};
pub use meteo::{
    EmissionModulation, Fetch, FrequencyEntry, MatchPolicy, ReferenceEntry, SeriesEntry,
    SituationSource, StabilityClass, StationaryTable, TransientSeries, WeatherSituation,
};
pub use output::{ConcentrationArtifact, ReceptorArtifact};
pub use run::{CancelHandle, RunConfig, RunContext, RunError, RunStatus, RunSummary, Simulation};
pub use transport::{EmissionSource, SourceGeometry, TransportConfig};
pub use wind::{SolverConfig, WindField, WindFieldSolver};
