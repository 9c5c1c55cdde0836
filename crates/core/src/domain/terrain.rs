//! Terrain elevation support for complex-terrain dispersion runs.
//!
//! Holds a regular raster of elevation samples with convenience
//! constructors for test topographies and bilinear height queries.

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Terrain data structure holding elevation information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerrainData {
    /// Extent of the raster in x (metres).
    pub(crate) width: f32,
    /// Extent of the raster in y (metres).
    pub(crate) depth: f32,
    /// Raster resolution in metres per sample.
    pub(crate) resolution: f32,
    /// Number of samples in x.
    pub(crate) nx: usize,
    /// Number of samples in y.
    pub(crate) ny: usize,
    /// Elevation samples in metres (row-major: `[y * nx + x]`).
    pub(crate) elevations: Vec<f32>,
    pub(crate) min_elevation: f32,
    pub(crate) max_elevation: f32,
}

impl TerrainData {
    /// Create flat terrain at the given elevation.
    pub fn flat(width: f32, depth: f32, resolution: f32, elevation: f32) -> Self {
        let nx = (width / resolution).ceil() as usize + 1;
        let ny = (depth / resolution).ceil() as usize + 1;
        TerrainData {
            width,
            depth,
            resolution,
            nx,
            ny,
            elevations: vec![elevation; nx * ny],
            min_elevation: elevation,
            max_elevation: elevation,
        }
    }

    /// Create terrain with a single Gaussian hill at the domain centre.
    pub fn single_hill(
        width: f32,
        depth: f32,
        resolution: f32,
        base_elevation: f32,
        hill_height: f32,
        hill_radius: f32,
    ) -> Self {
        let nx = (width / resolution).ceil() as usize + 1;
        let ny = (depth / resolution).ceil() as usize + 1;
        let mut elevations = Vec::with_capacity(nx * ny);

        let center_x = width / 2.0;
        let center_y = depth / 2.0;
        let mut min_elev = f32::MAX;
        let mut max_elev = f32::MIN;

        for iy in 0..ny {
            for ix in 0..nx {
                let x = ix as f32 * resolution;
                let y = iy as f32 * resolution;
                let dx = x - center_x;
                let dy = y - center_y;
                let dist2 = dx * dx + dy * dy;

                let height_factor = (-dist2 / (hill_radius * hill_radius)).exp();
                let elev = base_elevation + hill_height * height_factor;

                elevations.push(elev);
                min_elev = min_elev.min(elev);
                max_elev = max_elev.max(elev);
            }
        }

        TerrainData {
            width,
            depth,
            resolution,
            nx,
            ny,
            elevations,
            min_elevation: min_elev,
            max_elevation: max_elev,
        }
    }

    /// Build from an externally parsed elevation raster.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidTerrain` if the sample count does not
    /// match `nx * ny` or the raster is empty.
    pub fn from_samples(
        nx: usize,
        ny: usize,
        resolution: f32,
        elevations: Vec<f32>,
    ) -> Result<Self, DomainError> {
        if nx < 2 || ny < 2 || elevations.len() != nx * ny {
            return Err(DomainError::InvalidTerrain(format!(
                "expected {nx}x{ny} samples, got {}",
                elevations.len()
            )));
        }
        let mut min_elev = f32::MAX;
        let mut max_elev = f32::MIN;
        for e in &elevations {
            min_elev = min_elev.min(*e);
            max_elev = max_elev.max(*e);
        }
        Ok(TerrainData {
            width: (nx - 1) as f32 * resolution,
            depth: (ny - 1) as f32 * resolution,
            resolution,
            nx,
            ny,
            elevations,
            min_elevation: min_elev,
            max_elevation: max_elev,
        })
    }

    pub fn min_elevation(&self) -> f32 {
        self.min_elevation
    }

    pub fn max_elevation(&self) -> f32 {
        self.max_elevation
    }

    /// True when the raster carries any relief at all.
    pub fn is_flat(&self) -> bool {
        (self.max_elevation - self.min_elevation).abs() < f32::EPSILON
    }

    /// Bilinear elevation at an arbitrary position; clamps to the raster.
    pub fn elevation_at(&self, x: f32, y: f32) -> f32 {
        let gx = (x / self.resolution).clamp(0.0, (self.nx - 1) as f32);
        let gy = (y / self.resolution).clamp(0.0, (self.ny - 1) as f32);

        let ix0 = (gx as usize).min(self.nx - 2);
        let iy0 = (gy as usize).min(self.ny - 2);
        let fx = gx - ix0 as f32;
        let fy = gy - iy0 as f32;

        let e00 = self.elevations[iy0 * self.nx + ix0];
        let e10 = self.elevations[iy0 * self.nx + ix0 + 1];
        let e01 = self.elevations[(iy0 + 1) * self.nx + ix0];
        let e11 = self.elevations[(iy0 + 1) * self.nx + ix0 + 1];

        let e0 = e00 * (1.0 - fx) + e10 * fx;
        let e1 = e01 * (1.0 - fx) + e11 * fx;
        e0 * (1.0 - fy) + e1 * fy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn flat_terrain_is_flat() {
        let t = TerrainData::flat(100.0, 100.0, 10.0, 50.0);
        assert!(t.is_flat());
        assert_relative_eq!(t.elevation_at(33.0, 67.0), 50.0);
    }

    #[test]
    fn hill_peaks_at_centre() {
        let t = TerrainData::single_hill(200.0, 200.0, 10.0, 0.0, 80.0, 50.0);
        let peak = t.elevation_at(100.0, 100.0);
        let edge = t.elevation_at(0.0, 0.0);
        assert!(peak > 70.0);
        assert!(edge < 5.0);
        assert!(!t.is_flat());
    }

    #[test]
    fn sample_count_is_validated() {
        assert!(TerrainData::from_samples(4, 4, 10.0, vec![0.0; 15]).is_err());
        assert!(TerrainData::from_samples(4, 4, 10.0, vec![0.0; 16]).is_ok());
    }
}
