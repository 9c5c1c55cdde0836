//! Iterative microscale solver for complex terrain, buildings and
//! vegetation.
//!
//! Starts from the stability profile, applies the empirical obstacle
//! effects once (lee-side sheltering behind solid columns, canopy drag
//! inside vegetation), then iterates the mass-consistency projection
//! until the field stops changing. The projection is repeated because a
//! single Poisson solve leaves small residual divergence near walls,
//! where the solid-cell boundary treatment is only approximate.

use tracing::debug;

use crate::core_types::Vec3;
use crate::domain::Domain;
use crate::meteo::WeatherSituation;
use crate::wind::diagnostic::enforce_mass_consistency;
use crate::wind::field::WindField;
use crate::wind::profile::{flow_direction, initial_field};
use crate::wind::SolverConfig;

/// Canopy drag attenuation coefficient (per unit leaf-area density).
const CANOPY_DRAG: f32 = 0.35;

/// Horizontal distance upwind probed for sheltering obstacles (m).
const SHELTER_FETCH: f32 = 50.0;

/// Compute a microscale wind field for the situation.
#[must_use]
pub fn solve(situation: &WeatherSituation, domain: &Domain, config: &SolverConfig) -> WindField {
    let mut field = initial_field(situation, domain);
    let (dir_x, dir_y) = flow_direction(situation.wind_direction);
    apply_obstacle_effects(&mut field, domain, dir_x, dir_y);

    let mut previous: Vec<Vec3> = field.wind_raw().to_vec();
    for outer in 0..config.microscale_outer {
        let residual = enforce_mass_consistency(
            &mut field,
            domain,
            config.poisson_iterations,
            config.poisson_tolerance,
        );

        let change = field
            .wind_raw()
            .iter()
            .zip(previous.iter())
            .map(|(a, b)| (a - b).norm())
            .fold(0.0_f32, f32::max);
        debug!(outer, residual, change, "microscale projection");
        if change < config.microscale_tolerance {
            break;
        }
        previous.copy_from_slice(field.wind_raw());
    }

    field.adjustments_applied = true;
    field
}

/// Apply vegetation/roughness adjustments to a field read back from the
/// store without them baked in. Cheap relative to a full solve.
pub fn apply_vegetation_adjustment(field: &mut WindField, domain: &Domain) {
    let geometry = domain.geometry();
    for k in 0..geometry.nz() {
        for j in 0..geometry.ny() {
            for i in 0..geometry.nx() {
                let lad = domain.vegetation_density(i, j, k);
                if lad > 0.0 {
                    let attenuation = (-CANOPY_DRAG * lad).exp();
                    let mut w = field.at(i, j, k);
                    w.x *= attenuation;
                    w.y *= attenuation;
                    field.set(i, j, k, w);
                }
            }
        }
    }
    field.adjustments_applied = true;
}

/// Lee-side sheltering behind solid columns plus canopy drag.
fn apply_obstacle_effects(field: &mut WindField, domain: &Domain, dir_x: f32, dir_y: f32) {
    let geometry = domain.geometry();
    let nx = geometry.nx();
    let ny = geometry.ny();

    for k in 0..geometry.nz() {
        let z = geometry.layer_mid(k);
        for j in 0..ny {
            for i in 0..nx {
                if domain.is_solid(i, j, k) {
                    field.set(i, j, k, Vec3::zeros());
                    continue;
                }

                let mut w = field.at(i, j, k);

                // Canopy drag.
                let lad = domain.vegetation_density(i, j, k);
                if lad > 0.0 {
                    let attenuation = (-CANOPY_DRAG * lad).exp();
                    w.x *= attenuation;
                    w.y *= attenuation;
                }

                // Sheltering: probe upwind (against the flow direction) for
                // a surface higher than this cell's height.
                let x = geometry.x_min() + (i as f32 + 0.5) * geometry.dx();
                let y = geometry.y_min() + (j as f32 + 0.5) * geometry.dy();
                let upwind_x = x - SHELTER_FETCH * dir_x;
                let upwind_y = y - SHELTER_FETCH * dir_y;
                if let Some((ui, uj)) = geometry.locate_column(upwind_x, upwind_y) {
                    let local_surface = domain.elevation(i, j);
                    let upwind_top = domain.elevation(ui, uj)
                        + geometry.layer_mid(domain.surface_layer(ui, uj));
                    let obstruction = upwind_top - local_surface;
                    let z_above = z - local_surface;
                    if obstruction > 0.0 && z_above < obstruction * 2.0 && z_above >= 0.0 {
                        let shelter =
                            1.0 - (obstruction - z_above * 0.5).max(0.0) / (obstruction * 2.0);
                        let shelter = shelter.clamp(0.1, 1.0);
                        w.x *= shelter;
                        w.y *= shelter;
                    }
                }

                field.set(i, j, k, w);
            }
        }
    }
}
