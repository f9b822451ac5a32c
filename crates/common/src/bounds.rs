use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Half extent of the default world volume on every axis.
pub const DEFAULT_WORLD_HALF_EXTENT: f32 = 2_097_152.0;

/// Axis-aligned world volume that cached object locations are clamped into.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WorldBounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for WorldBounds {
    fn default() -> Self {
        Self {
            min: Vec3::splat(-DEFAULT_WORLD_HALF_EXTENT),
            max: Vec3::splat(DEFAULT_WORLD_HALF_EXTENT),
        }
    }
}

impl WorldBounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Bounds are usable when finite and ordered on every axis.
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
    }

    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// Clamp a point into the bounds. NaN components collapse to the lower
    /// bound of their axis; infinities clamp to the nearest bound.
    pub fn clamp(&self, point: Vec3) -> Vec3 {
        let sanitized = Vec3::select(point.is_nan_mask(), self.min, point);
        sanitized.clamp(self.min, self.max)
    }
}
