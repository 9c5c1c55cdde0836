//! Dense 3-D wind field over the concentration grid.
//!
//! Exactly one field is current at any time during a run; it is replaced
//! wholesale at the start of each situation and shared read-only with all
//! advection workers for that situation's passes.

use serde::{Deserialize, Serialize};

use crate::core_types::Vec3;
use crate::domain::{Domain, GridGeometry};

/// Boundary-layer scalars derived from the situation, constant over the
/// domain for one situation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundaryLayer {
    /// Friction velocity u* (m/s).
    pub friction_velocity: f32,
    /// Inverse Obukhov length 1/L (1/m); negative is unstable.
    pub inverse_obukhov: f32,
    /// Mixing height above ground (m); particles reflect here.
    pub mixing_height: f32,
}

/// Wind vectors per grid cell plus the situation's boundary-layer scalars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindField {
    nx: usize,
    ny: usize,
    nz: usize,
    /// Flattened per-cell wind vectors using the grid's strides.
    wind: Vec<Vec3>,
    pub boundary_layer: BoundaryLayer,
    /// Whether roughness/vegetation adjustments are already baked in.
    /// Fields read back from the store may still need them applied.
    pub adjustments_applied: bool,
}

impl WindField {
    /// Zero-initialized field matching the grid.
    #[must_use]
    pub fn zeroed(geometry: &GridGeometry, boundary_layer: BoundaryLayer) -> Self {
        Self {
            nx: geometry.nx(),
            ny: geometry.ny(),
            nz: geometry.nz(),
            wind: vec![Vec3::zeros(); geometry.cell_count()],
            boundary_layer,
            adjustments_applied: false,
        }
    }

    /// Whether the stored dimensions match the grid.
    #[must_use]
    pub fn matches(&self, geometry: &GridGeometry) -> bool {
        self.nx == geometry.nx() && self.ny == geometry.ny() && self.nz == geometry.nz()
    }

    #[inline]
    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        k * self.ny * self.nx + j * self.nx + i
    }

    #[inline]
    #[must_use]
    pub fn at(&self, i: usize, j: usize, k: usize) -> Vec3 {
        self.wind[self.index(i, j, k)]
    }

    #[inline]
    pub fn set(&mut self, i: usize, j: usize, k: usize, value: Vec3) {
        let idx = self.index(i, j, k);
        self.wind[idx] = value;
    }

    /// Mutable flat access for the solvers.
    pub(crate) fn wind_mut(&mut self) -> &mut [Vec3] {
        &mut self.wind
    }

    pub(crate) fn wind_raw(&self) -> &[Vec3] {
        &self.wind
    }

    /// Wind at an absolute position: bilinear in the horizontal, linear in
    /// the vertical between layer mid-levels. `None` outside the domain.
    /// `z` is height above the domain base level, like the grid's vertical
    /// axis.
    #[must_use]
    pub fn interpolate(&self, geometry: &GridGeometry, x: f32, y: f32, z: f32) -> Option<Vec3> {
        geometry.locate_column(x, y)?;
        let k = geometry.locate_layer(z)?;

        // Horizontal bilinear between cell centres, clamped at the border.
        let fx = ((x - geometry.x_min()) / geometry.dx() - 0.5).clamp(0.0, (self.nx - 1) as f32);
        let fy = ((y - geometry.y_min()) / geometry.dy() - 0.5).clamp(0.0, (self.ny - 1) as f32);
        let i0 = (fx as usize).min(self.nx.saturating_sub(2));
        let j0 = (fy as usize).min(self.ny.saturating_sub(2));
        let i1 = (i0 + 1).min(self.nx - 1);
        let j1 = (j0 + 1).min(self.ny - 1);
        let tx = (fx - i0 as f32).clamp(0.0, 1.0);
        let ty = (fy - j0 as f32).clamp(0.0, 1.0);

        let layer = |kk: usize| -> Vec3 {
            let w00 = self.at(i0, j0, kk) * (1.0 - tx) * (1.0 - ty);
            let w10 = self.at(i1, j0, kk) * tx * (1.0 - ty);
            let w01 = self.at(i0, j1, kk) * (1.0 - tx) * ty;
            let w11 = self.at(i1, j1, kk) * tx * ty;
            w00 + w10 + w01 + w11
        };

        // Vertical: linear between the mid-levels bracketing z.
        let mid_k = geometry.layer_mid(k);
        let (k_lo, k_hi, tz) = if z >= mid_k && k + 1 < self.nz {
            let mid_hi = geometry.layer_mid(k + 1);
            (k, k + 1, (z - mid_k) / (mid_hi - mid_k))
        } else if z < mid_k && k > 0 {
            let mid_lo = geometry.layer_mid(k - 1);
            (k - 1, k, (z - mid_lo) / (mid_k - mid_lo))
        } else {
            (k, k, 0.0)
        };

        let lo = layer(k_lo);
        if k_lo == k_hi {
            return Some(lo);
        }
        let hi = layer(k_hi);
        Some(lo * (1.0 - tz) + hi * tz)
    }

    /// Maximum absolute divergence over interior cells whose full stencil
    /// lies in air. The solver's correctness contract is that this stays
    /// below tolerance before the field is handed to the transport
    /// engine. Cells touching a solid face are excluded: the central
    /// difference across a wall measures the wall jump, not the flow's
    /// mass balance (the wall face itself carries zero normal flow by
    /// construction).
    #[must_use]
    pub fn max_divergence(&self, geometry: &GridGeometry, domain: &Domain) -> f32 {
        let mut max_div = 0.0_f32;
        let inv_2dx = 1.0 / (2.0 * geometry.dx());
        let inv_2dy = 1.0 / (2.0 * geometry.dy());

        for k in 1..self.nz.saturating_sub(1) {
            let inv_dz = 1.0 / (geometry.layer_mid(k + 1) - geometry.layer_mid(k - 1));
            for j in 1..self.ny - 1 {
                for i in 1..self.nx - 1 {
                    let stencil_in_air = !domain.is_solid(i, j, k)
                        && !domain.is_solid(i + 1, j, k)
                        && !domain.is_solid(i - 1, j, k)
                        && !domain.is_solid(i, j + 1, k)
                        && !domain.is_solid(i, j - 1, k)
                        && !domain.is_solid(i, j, k + 1)
                        && !domain.is_solid(i, j, k - 1);
                    if !stencil_in_air {
                        continue;
                    }
                    let du = (self.at(i + 1, j, k).x - self.at(i - 1, j, k).x) * inv_2dx;
                    let dv = (self.at(i, j + 1, k).y - self.at(i, j - 1, k).y) * inv_2dy;
                    let dw = (self.at(i, j, k + 1).z - self.at(i, j, k - 1).z) * inv_dz;
                    max_div = max_div.max((du + dv + dw).abs());
                }
            }
        }
        max_div
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::GridGeometry;

    fn geometry() -> GridGeometry {
        GridGeometry::new(8, 8, 6, 10.0, 10.0, 5.0, 1.0, 0.0, 0.0, vec![2.5]).unwrap()
    }

    fn layer() -> BoundaryLayer {
        BoundaryLayer {
            friction_velocity: 0.3,
            inverse_obukhov: 0.0,
            mixing_height: 800.0,
        }
    }

    #[test]
    fn interpolation_is_exact_at_cell_centres() {
        let g = geometry();
        let mut f = WindField::zeroed(&g, layer());
        f.set(3, 3, 1, Vec3::new(2.0, -1.0, 0.1));
        // Centre of cell (3,3,1): x = 35, y = 35, z = mid of layer 1.
        let w = f.interpolate(&g, 35.0, 35.0, g.layer_mid(1)).unwrap();
        assert!((w.x - 2.0).abs() < 1e-5);
        assert!((w.y + 1.0).abs() < 1e-5);
    }

    #[test]
    fn interpolation_outside_is_none() {
        let g = geometry();
        let f = WindField::zeroed(&g, layer());
        assert!(f.interpolate(&g, -1.0, 5.0, 5.0).is_none());
        assert!(f.interpolate(&g, 5.0, 5.0, 1.0e5).is_none());
    }

    #[test]
    fn uniform_field_has_zero_divergence() {
        let g = geometry();
        let d = Domain::flat(g.clone(), 0.1).unwrap();
        let mut f = WindField::zeroed(&g, layer());
        for k in 0..g.nz() {
            for j in 0..g.ny() {
                for i in 0..g.nx() {
                    f.set(i, j, k, Vec3::new(3.0, 1.0, 0.0));
                }
            }
        }
        assert!(f.max_divergence(&g, &d) < 1e-6);
    }
}
