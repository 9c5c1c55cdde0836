//! The Lagrangian particle.

/// One mass-carrying particle tracked through the wind field.
///
/// Particles are ephemeral: created at release, destroyed when their
/// travel-time budget runs out, their mass fully deposits, or they leave
/// the domain. In transient mode carrier particles are re-created from the
/// carry-over pool at the start of each situation.
#[derive(Debug, Clone)]
pub struct Particle {
    /// Absolute position; z is height above the domain base level.
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Turbulent velocity fluctuation carried between steps (Langevin
    /// memory).
    pub fluct_u: f32,
    pub fluct_v: f32,
    pub fluct_w: f32,
    /// Remaining travel-time budget (s).
    pub time_left: f32,
    /// Mass weight (mass units).
    pub mass: f64,
    /// Source group for accumulation.
    pub group: usize,
    /// Dry deposition velocity inherited from the source (m/s).
    pub deposition_velocity: f32,
    /// Situation index the particle was released in.
    pub release_index: u32,
}
