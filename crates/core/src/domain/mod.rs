//! Static domain state: grid geometry plus per-cell terrain, building and
//! vegetation occupancy, assembled once at startup and immutable afterwards.

pub mod grid;
pub mod obstacles;
pub mod terrain;

pub use grid::GridGeometry;
pub use obstacles::{Building, VegetationPatch};
pub use terrain::TerrainData;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Domain assembly failures. These are setup-phase errors and abort the run.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid grid geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid terrain raster: {0}")]
    InvalidTerrain(String),
}

/// Terrain handling mode of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DomainMode {
    /// Homogeneous flat terrain; diagnostic wind profiles are cheap and
    /// always recomputed.
    Flat,
    /// Relief present; wind fields come from the precomputed store or an
    /// iterative microscale solve.
    ComplexTerrain,
}

/// The assembled, immutable domain for one run.
///
/// All per-cell state lives in flat arrays using the geometry's strides.
/// Cell (i, j, k) is solid when it lies below the local terrain surface or
/// inside a building; solid cells never carry wind or particles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Domain {
    geometry: GridGeometry,
    mode: DomainMode,
    /// Terrain elevation per column, relative to the domain base level.
    elevation: Vec<f32>,
    /// Index of the first non-solid layer per column.
    surface_layer: Vec<usize>,
    /// Solid flag per 3-D cell (terrain or building).
    solid: Vec<bool>,
    /// Leaf-area density per 3-D cell (m²/m³), 0 where no vegetation.
    vegetation: Vec<f32>,
    /// Roughness length per column (metres).
    roughness: Vec<f32>,
    has_buildings: bool,
    has_vegetation: bool,
}

impl Domain {
    /// Assemble the domain from geometry, terrain and obstacle records.
    ///
    /// Terrain elevations are rebased to the minimum elevation so that the
    /// grid's vertical axis starts at the lowest surface point. Buildings
    /// and vegetation are rasterized at cell-centre resolution.
    ///
    /// # Errors
    /// Propagates `DomainError` for inconsistent geometry or terrain.
    pub fn assemble(
        geometry: GridGeometry,
        mode: DomainMode,
        terrain: &TerrainData,
        buildings: &[Building],
        vegetation: &[VegetationPatch],
        roughness_length: f32,
    ) -> Result<Self, DomainError> {
        if roughness_length <= 0.0 {
            return Err(DomainError::InvalidGeometry(format!(
                "roughness length must be positive, got {roughness_length}"
            )));
        }

        let columns = geometry.layer_len();
        let cells = geometry.cell_count();
        let base = terrain.min_elevation();

        let mut elevation = vec![0.0_f32; columns];
        let mut surface_layer = vec![0_usize; columns];
        let mut solid = vec![false; cells];
        let mut veg = vec![0.0_f32; cells];
        let roughness = vec![roughness_length; columns];

        for j in 0..geometry.ny() {
            for i in 0..geometry.nx() {
                let col = geometry.index_2d(i, j);
                let x = geometry.x_min() + (i as f32 + 0.5) * geometry.dx();
                let y = geometry.y_min() + (j as f32 + 0.5) * geometry.dy();

                let local = match mode {
                    DomainMode::Flat => 0.0,
                    DomainMode::ComplexTerrain => {
                        terrain.elevation_at(x - geometry.x_min(), y - geometry.y_min()) - base
                    }
                };
                elevation[col] = local;

                let building_top = buildings
                    .iter()
                    .filter(|b| b.contains(x, y))
                    .map(|b| b.height)
                    .fold(0.0_f32, f32::max);

                // Solid column: every layer whose mid-level sits below the
                // terrain surface or under a roof.
                let mut surface_k = 0;
                for k in 0..geometry.nz() {
                    let mid = geometry.layer_mid(k);
                    let below_terrain = mid < local;
                    let in_building = building_top > 0.0 && mid < local + building_top;
                    if below_terrain || in_building {
                        solid[geometry.index(i, j, k)] = true;
                        surface_k = k + 1;
                    }
                }
                surface_layer[col] = surface_k.min(geometry.nz() - 1);

                for patch in vegetation.iter().filter(|p| p.contains(x, y)) {
                    for k in 0..geometry.nz() {
                        let mid = geometry.layer_mid(k);
                        let idx = geometry.index(i, j, k);
                        if !solid[idx] && mid >= local && mid < local + patch.top {
                            veg[idx] += patch.leaf_area_density;
                        }
                    }
                }
            }
        }

        Ok(Self {
            geometry,
            mode,
            elevation,
            surface_layer,
            solid,
            vegetation: veg,
            roughness,
            has_buildings: !buildings.is_empty(),
            has_vegetation: !vegetation.is_empty(),
        })
    }

    /// Flat-terrain domain with no obstacles; the common test setup.
    ///
    /// # Errors
    /// Propagates `DomainError` from assembly.
    pub fn flat(geometry: GridGeometry, roughness_length: f32) -> Result<Self, DomainError> {
        let terrain = TerrainData::flat(geometry.width(), geometry.depth(), geometry.dx(), 0.0);
        Self::assemble(
            geometry,
            DomainMode::Flat,
            &terrain,
            &[],
            &[],
            roughness_length,
        )
    }

    pub fn geometry(&self) -> &GridGeometry {
        &self.geometry
    }

    pub fn mode(&self) -> DomainMode {
        self.mode
    }

    pub fn has_buildings(&self) -> bool {
        self.has_buildings
    }

    pub fn has_vegetation(&self) -> bool {
        self.has_vegetation
    }

    /// True when the flat-terrain fast path cannot be used.
    pub fn needs_microscale(&self) -> bool {
        self.mode == DomainMode::ComplexTerrain || self.has_buildings || self.has_vegetation
    }

    #[inline]
    pub fn is_solid(&self, i: usize, j: usize, k: usize) -> bool {
        self.solid[self.geometry.index(i, j, k)]
    }

    #[inline]
    pub fn is_solid_idx(&self, idx: usize) -> bool {
        self.solid[idx]
    }

    /// Terrain elevation (relative to domain base) of column (i, j).
    #[inline]
    pub fn elevation(&self, i: usize, j: usize) -> f32 {
        self.elevation[self.geometry.index_2d(i, j)]
    }

    /// First non-solid layer of column (i, j).
    #[inline]
    pub fn surface_layer(&self, i: usize, j: usize) -> usize {
        self.surface_layer[self.geometry.index_2d(i, j)]
    }

    #[inline]
    pub fn roughness(&self, i: usize, j: usize) -> f32 {
        self.roughness[self.geometry.index_2d(i, j)]
    }

    #[inline]
    pub fn vegetation_density(&self, i: usize, j: usize, k: usize) -> f32 {
        self.vegetation[self.geometry.index(i, j, k)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> GridGeometry {
        GridGeometry::new(10, 10, 6, 10.0, 10.0, 4.0, 1.0, 0.0, 0.0, vec![2.0]).unwrap()
    }

    #[test]
    fn flat_domain_has_no_solids() {
        let d = Domain::flat(geometry(), 0.1).unwrap();
        for k in 0..6 {
            assert!(!d.is_solid(4, 4, k));
        }
        assert_eq!(d.surface_layer(4, 4), 0);
        assert!(!d.needs_microscale());
    }

    #[test]
    fn building_cells_are_solid() {
        let b = Building {
            x_min: 40.0,
            y_min: 40.0,
            x_max: 60.0,
            y_max: 60.0,
            height: 10.0,
        };
        let terrain = TerrainData::flat(100.0, 100.0, 10.0, 0.0);
        let d = Domain::assemble(geometry(), DomainMode::Flat, &terrain, &[b], &[], 0.1).unwrap();
        // Layers with mid-levels 2 m and 6 m are under the 10 m roof.
        assert!(d.is_solid(4, 4, 0));
        assert!(d.is_solid(4, 4, 1));
        assert!(!d.is_solid(4, 4, 3));
        assert!(!d.is_solid(0, 0, 0));
        assert_eq!(d.surface_layer(4, 4), 2);
        assert!(d.needs_microscale());
    }

    #[test]
    fn vegetation_fills_canopy_layers() {
        let p = VegetationPatch {
            x_min: 0.0,
            y_min: 0.0,
            x_max: 100.0,
            y_max: 100.0,
            top: 6.0,
            leaf_area_density: 1.5,
        };
        let terrain = TerrainData::flat(100.0, 100.0, 10.0, 0.0);
        let d = Domain::assemble(geometry(), DomainMode::Flat, &terrain, &[], &[p], 0.1).unwrap();
        assert!(d.vegetation_density(2, 2, 0) > 0.0);
        assert_eq!(d.vegetation_density(2, 2, 2), 0.0);
        assert!(d.has_vegetation());
    }

    #[test]
    fn complex_terrain_rebases_to_minimum() {
        let terrain = TerrainData::single_hill(100.0, 100.0, 5.0, 100.0, 40.0, 20.0);
        let d = Domain::assemble(
            geometry(),
            DomainMode::ComplexTerrain,
            &terrain,
            &[],
            &[],
            0.1,
        )
        .unwrap();
        // Centre column sits on the hill, corner near the base level.
        assert!(d.elevation(5, 5) > 20.0);
        assert!(d.elevation(0, 0) < 5.0);
        assert!(d.surface_layer(5, 5) > d.surface_layer(0, 0));
    }
}
