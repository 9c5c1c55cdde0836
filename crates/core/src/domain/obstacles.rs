//! Building and vegetation records resolved against the grid.
//!
//! These are the abstract geometry records the core consumes; the file
//! dialects that produce them live outside this crate.

use serde::{Deserialize, Serialize};

/// Axis-aligned building footprint with a uniform roof height above ground.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Building {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    /// Roof height above local ground (metres).
    pub height: f32,
}

impl Building {
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x < self.x_max && y >= self.y_min && y < self.y_max
    }
}

/// Vegetation stand with a uniform leaf-area density up to its top height.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VegetationPatch {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
    /// Canopy top above local ground (metres).
    pub top: f32,
    /// Leaf-area density (m²/m³), drives drag and deposition uptake.
    pub leaf_area_density: f32,
}

impl VegetationPatch {
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x_min && x < self.x_max && y >= self.y_min && y < self.y_max
    }
}
