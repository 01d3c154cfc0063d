//! Tunable parameters for the demo

use crate::sdk::{TextureType, ViewportOrientation};

/// Scene and tracking parameters applied by `CardboardApp`.
///
/// The defaults reproduce the stock Cardboard sample: the objects are about one
/// meter in radius, so the quad sits half a meter in front of the eyes and the
/// floor is 1.7 m below the head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AppConfig {
    pub floor_height: f32,
    pub min_target_distance: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Pose prediction horizon when rendering without vsync
    pub prediction_nanos: i64,
    /// Cutoff of the head tracker's velocity filter
    pub velocity_filter_cutoff_hz: i32,
    pub quad_height: f32,
    pub clear_color: [f32; 4],
    pub viewport_orientation: ViewportOrientation,
    pub texture_type: TextureType,
    pub placeholder_size: (i32, i32),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            floor_height: -1.7,
            min_target_distance: -0.5,
            z_near: 0.1,
            z_far: 100.0,
            prediction_nanos: 50_000_000,
            velocity_filter_cutoff_hz: 6,
            quad_height: 0.25,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            viewport_orientation: ViewportOrientation::LandscapeLeft,
            texture_type: TextureType::Texture2D,
            placeholder_size: (300, 168),
        }
    }
}

impl AppConfig {
    pub fn with_floor_height(mut self, floor_height: f32) -> Self {
        self.floor_height = floor_height;
        self
    }

    pub fn with_clip_planes(mut self, z_near: f32, z_far: f32) -> Self {
        self.z_near = z_near;
        self.z_far = z_far;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stock_sample() {
        let config = AppConfig::default();
        assert!((config.floor_height + 1.7).abs() < f32::EPSILON);
        assert!((config.min_target_distance + 0.5).abs() < f32::EPSILON);
        assert_eq!(config.prediction_nanos, 50_000_000);
        assert_eq!(config.velocity_filter_cutoff_hz, 6);
        assert_eq!(config.placeholder_size, (300, 168));
        assert_eq!(config.texture_type, TextureType::Texture2D);
    }

    #[test]
    fn builders_override_single_fields() {
        let config = AppConfig::default()
            .with_floor_height(-1.2)
            .with_clip_planes(0.05, 50.0);
        assert!((config.floor_height + 1.2).abs() < f32::EPSILON);
        assert!((config.z_near - 0.05).abs() < f32::EPSILON);
        assert!((config.z_far - 50.0).abs() < f32::EPSILON);
        assert_eq!(config.viewport_orientation, ViewportOrientation::LandscapeLeft);
    }
}
