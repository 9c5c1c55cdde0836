//! Rectilinear concentration grid geometry with geometric vertical stretching.
//!
//! The grid is fixed for the lifetime of one run: cell counts and sizes are
//! validated once at startup and never resized. All 3-D fields over the grid
//! are stored as flat contiguous arrays with the strides computed here, so
//! cells that are close in space stay close in memory.

use serde::{Deserialize, Serialize};

use crate::domain::DomainError;

/// Static geometry of the 3-D concentration grid.
///
/// Horizontal cells are uniform (`dx` × `dy`). The first vertical layer has
/// height `dz0`; every layer above stretches by the constant factor
/// `stretch` (1.0 = uniform columns). Layer interface heights and mid-levels
/// are precomputed at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridGeometry {
    nx: usize,
    ny: usize,
    nz: usize,
    dx: f32,
    dy: f32,
    dz0: f32,
    stretch: f32,
    /// South-west domain origin (absolute coordinates of cell (0,0)).
    x_min: f32,
    y_min: f32,
    /// Heights above ground of the horizontal output slices.
    slice_heights: Vec<f32>,
    /// Thickness of the sampling band around each output slice.
    slice_thickness: f32,
    /// Layer interface heights above ground, `layer_tops[0] == 0`, length nz+1.
    layer_tops: Vec<f32>,
    /// Layer mid-level heights above ground, length nz.
    layer_mids: Vec<f32>,
}

impl GridGeometry {
    /// Validate and build the grid geometry.
    ///
    /// # Errors
    /// Returns `DomainError::InvalidGeometry` for non-positive cell counts or
    /// sizes, a stretching factor below 1, or an empty slice list.
    pub fn new(
        nx: usize,
        ny: usize,
        nz: usize,
        dx: f32,
        dy: f32,
        dz0: f32,
        stretch: f32,
        x_min: f32,
        y_min: f32,
        slice_heights: Vec<f32>,
    ) -> Result<Self, DomainError> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(DomainError::InvalidGeometry(format!(
                "cell counts must be positive, got {nx}x{ny}x{nz}"
            )));
        }
        if dx <= 0.0 || dy <= 0.0 || dz0 <= 0.0 {
            return Err(DomainError::InvalidGeometry(format!(
                "cell sizes must be positive, got dx={dx} dy={dy} dz0={dz0}"
            )));
        }
        if stretch < 1.0 {
            return Err(DomainError::InvalidGeometry(format!(
                "vertical stretching factor must be >= 1, got {stretch}"
            )));
        }
        if slice_heights.is_empty() {
            return Err(DomainError::InvalidGeometry(
                "at least one horizontal output slice is required".into(),
            ));
        }

        let mut layer_tops = Vec::with_capacity(nz + 1);
        let mut layer_mids = Vec::with_capacity(nz);
        layer_tops.push(0.0);
        let mut dz = dz0;
        let mut top = 0.0_f32;
        for k in 0..nz {
            if k > 0 {
                dz *= stretch;
            }
            layer_mids.push(top + dz * 0.5);
            top += dz;
            layer_tops.push(top);
        }

        Ok(Self {
            nx,
            ny,
            nz,
            dx,
            dy,
            dz0,
            stretch,
            x_min,
            y_min,
            slice_heights,
            slice_thickness: dz0,
            layer_tops,
            layer_mids,
        })
    }

    pub fn nx(&self) -> usize {
        self.nx
    }

    pub fn ny(&self) -> usize {
        self.ny
    }

    pub fn nz(&self) -> usize {
        self.nz
    }

    pub fn dx(&self) -> f32 {
        self.dx
    }

    pub fn dy(&self) -> f32 {
        self.dy
    }

    /// First-layer height, also the sampling band thickness for slices.
    pub fn dz0(&self) -> f32 {
        self.dz0
    }

    pub fn stretch(&self) -> f32 {
        self.stretch
    }

    pub fn x_min(&self) -> f32 {
        self.x_min
    }

    pub fn y_min(&self) -> f32 {
        self.y_min
    }

    pub fn slice_heights(&self) -> &[f32] {
        &self.slice_heights
    }

    pub fn slice_count(&self) -> usize {
        self.slice_heights.len()
    }

    pub fn slice_thickness(&self) -> f32 {
        self.slice_thickness
    }

    /// Domain extent in x (metres).
    pub fn width(&self) -> f32 {
        self.nx as f32 * self.dx
    }

    /// Domain extent in y (metres).
    pub fn depth(&self) -> f32 {
        self.ny as f32 * self.dy
    }

    /// Top of the model domain above ground.
    pub fn top(&self) -> f32 {
        self.layer_tops[self.nz]
    }

    /// Number of cells in one horizontal layer.
    #[inline]
    pub fn layer_len(&self) -> usize {
        self.nx * self.ny
    }

    /// Total number of 3-D cells.
    #[inline]
    pub fn cell_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Flat index of cell (i, j, k); layers are contiguous.
    #[inline]
    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        k * self.ny * self.nx + j * self.nx + i
    }

    /// Flat index of column (i, j).
    #[inline]
    pub fn index_2d(&self, i: usize, j: usize) -> usize {
        j * self.nx + i
    }

    /// Height of layer k.
    #[inline]
    pub fn layer_height(&self, k: usize) -> f32 {
        self.layer_tops[k + 1] - self.layer_tops[k]
    }

    /// Mid-level height of layer k above ground.
    #[inline]
    pub fn layer_mid(&self, k: usize) -> f32 {
        self.layer_mids[k]
    }

    /// Volume of a cell in layer k.
    #[inline]
    pub fn cell_volume(&self, k: usize) -> f32 {
        self.dx * self.dy * self.layer_height(k)
    }

    /// Horizontal cell area.
    #[inline]
    pub fn cell_area(&self) -> f32 {
        self.dx * self.dy
    }

    /// Horizontal cell containing the absolute position, or None outside.
    #[inline]
    pub fn locate_column(&self, x: f32, y: f32) -> Option<(usize, usize)> {
        let fx = (x - self.x_min) / self.dx;
        let fy = (y - self.y_min) / self.dy;
        if fx < 0.0 || fy < 0.0 {
            return None;
        }
        let i = fx as usize;
        let j = fy as usize;
        if i >= self.nx || j >= self.ny {
            return None;
        }
        Some((i, j))
    }

    /// Vertical layer containing height `z` above the domain base level,
    /// or None outside the column.
    #[inline]
    pub fn locate_layer(&self, z: f32) -> Option<usize> {
        if z < 0.0 || z >= self.top() {
            return None;
        }
        // The column is short (tens of layers); a linear scan beats a binary
        // search for the low layers where nearly all particles live.
        for k in 0..self.nz {
            if z < self.layer_tops[k + 1] {
                return Some(k);
            }
        }
        None
    }

    /// Output slices whose sampling band contains height `z` above ground.
    #[inline]
    pub fn slices_containing(&self, z: f32) -> impl Iterator<Item = usize> + '_ {
        let half = self.slice_thickness * 0.5;
        self.slice_heights
            .iter()
            .enumerate()
            .filter(move |(_, h)| (z - **h).abs() <= half)
            .map(|(s, _)| s)
    }
}
