//! Core types shared across the simulation: vector alias, semantic units,
//! and the deterministic random stream machinery.

pub mod rng;
pub mod units;
pub mod vec3;

pub use rng::{particle_stream, situation_seed_v1, SEED_VERSION};
pub use units::{Degrees, MetersPerSecond, MillimetersPerHour};
pub use vec3::Vec3;
