//! Initial wind profiles from a weather situation.
//!
//! Builds the first-guess field the diagnostic and microscale solvers
//! start from: a stability-dependent power-law profile of the anemometer
//! wind, rotated into flow coordinates, zero inside solid cells.

use rayon::prelude::*;

use crate::core_types::Vec3;
use crate::domain::Domain;
use crate::meteo::WeatherSituation;
use crate::wind::field::{BoundaryLayer, WindField};

/// Von Karman constant.
const KAPPA: f32 = 0.4;

/// Anemometer reference height (m) the situation wind speed refers to.
pub const ANEMOMETER_HEIGHT: f32 = 10.0;

/// Boundary-layer scalars for the situation over the given surface
/// roughness.
#[must_use]
pub fn boundary_layer(situation: &WeatherSituation, roughness_length: f32) -> BoundaryLayer {
    let z0 = roughness_length.max(1.0e-3);
    let log_ratio = (ANEMOMETER_HEIGHT / z0).ln().max(1.0);
    let friction_velocity = (KAPPA * situation.wind_speed.max(0.1) / log_ratio).max(0.02);

    BoundaryLayer {
        friction_velocity,
        inverse_obukhov: situation.stability.inverse_obukhov(),
        mixing_height: situation.effective_mixing_height(),
    }
}

/// Flow-direction unit vector from the meteorological direction (degrees
/// the wind blows FROM; 0 = north, 90 = east).
#[must_use]
pub fn flow_direction(wind_direction_deg: f32) -> (f32, f32) {
    let rad = wind_direction_deg.to_radians();
    // Wind FROM north blows toward -y is the mathematical convention with
    // y pointing north: flow vector = -(sin, cos).
    (-rad.sin(), -rad.cos())
}

/// Build the initial field: power-law speed profile per layer, constant
/// direction, zero vertical component, zero inside solids.
#[must_use]
pub fn initial_field(situation: &WeatherSituation, domain: &Domain) -> WindField {
    let geometry = domain.geometry();
    let layer = boundary_layer(situation, domain.roughness(0, 0));
    let mut field = WindField::zeroed(geometry, layer);

    let exponent = situation.stability.profile_exponent();
    let (dir_x, dir_y) = flow_direction(situation.wind_direction);
    let reference_speed = situation.wind_speed.max(0.0);

    let nx = geometry.nx();
    let ny = geometry.ny();
    let layer_len = geometry.layer_len();

    // Per-layer speed factors are identical across the layer; parallelize
    // over z like the other grid sweeps.
    let mids: Vec<f32> = (0..geometry.nz()).map(|k| geometry.layer_mid(k)).collect();

    field
        .wind_mut()
        .par_chunks_mut(layer_len)
        .enumerate()
        .for_each(|(k, wind_layer)| {
            let z = mids[k].max(0.5);
            let speed = reference_speed * (z / ANEMOMETER_HEIGHT).powf(exponent);
            let vector = Vec3::new(dir_x * speed, dir_y * speed, 0.0);
            for j in 0..ny {
                for i in 0..nx {
                    wind_layer[j * nx + i] = vector;
                }
            }
        });

    // Solid masking is cheap relative to the fill; done serially.
    for k in 0..geometry.nz() {
        for j in 0..ny {
            for i in 0..nx {
                if domain.is_solid(i, j, k) {
                    field.set(i, j, k, Vec3::zeros());
                }
            }
        }
    }

    field
}
