//! Headset SDK seam
//!
//! The head tracker, lens distortion, distortion renderer and calibration
//! storage all live in the external Cardboard SDK. They are modelled as traits
//! so the app can run against the real library on device (`cardboard`) or
//! against the in-memory doubles in `crate::mock`.
//!
//! Every SDK object is created through a `VrSdk` factory and released when the
//! Rust value is dropped.

#[cfg(target_os = "android")]
pub mod cardboard;

use glam::Mat4;

use crate::error::Result;
use crate::gfx::{ScreenSize, Viewport};
use crate::pose::HeadPose;

/// The two fixed eye slots. Discriminants match the SDK's `CardboardEye`.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left = 0,
    Right = 1,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Display orientation passed along with pose queries
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportOrientation {
    LandscapeLeft = 0,
    LandscapeRight = 1,
    Portrait = 2,
    PortraitUpsideDown = 3,
}

/// Texture target the distortion renderer samples from
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureType {
    Texture2D = 0,
    ExternalOes = 1,
}

/// Region of a texture holding one eye's image
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeTextureDescription {
    pub texture: u64,
    pub left_u: f32,
    pub right_u: f32,
    pub top_v: f32,
    pub bottom_v: f32,
}

/// Per-eye distortion mesh as produced by the lens distortion provider.
/// `vertices` and `uvs` hold `(x, y)` / `(u, v)` pairs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DistortionMesh {
    pub indices: Vec<i32>,
    pub vertices: Vec<f32>,
    pub uvs: Vec<f32>,
}

impl DistortionMesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Encoded viewer calibration saved by the QR scan flow.
/// Never empty: an empty buffer means the viewer was never calibrated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceParams(Vec<u8>);

impl DeviceParams {
    pub fn from_bytes(bytes: Vec<u8>) -> Option<Self> {
        if bytes.is_empty() {
            None
        } else {
            Some(Self(bytes))
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

pub trait HeadTracker {
    fn pause(&mut self);
    fn resume(&mut self);
    fn set_low_pass_filter(&mut self, cutoff_hz: i32);
    /// Predicted pose at `timestamp_nanos` on the boot-time clock.
    /// The tracker always answers; stale data is acceptable.
    fn pose(&mut self, timestamp_nanos: i64, orientation: ViewportOrientation) -> HeadPose;
}

pub trait LensDistortion {
    fn eye_from_head_matrix(&self, eye: Eye) -> Mat4;
    fn projection_matrix(&self, eye: Eye, z_near: f32, z_far: f32) -> Mat4;
    fn distortion_mesh(&self, eye: Eye) -> DistortionMesh;
}

pub trait DistortionRenderer {
    fn set_mesh(&mut self, mesh: &DistortionMesh, eye: Eye);
    fn render_eye_to_display(
        &mut self,
        target_display: u64,
        viewport: Viewport,
        left_eye: &EyeTextureDescription,
        right_eye: &EyeTextureDescription,
    );
}

/// Factory and calibration storage
pub trait VrSdk {
    type HeadTracker: HeadTracker;
    type LensDistortion: LensDistortion;
    type DistortionRenderer: DistortionRenderer;

    fn create_head_tracker(&self) -> Result<Self::HeadTracker>;
    fn create_lens_distortion(
        &self,
        params: &DeviceParams,
        screen: ScreenSize,
    ) -> Result<Self::LensDistortion>;
    fn create_distortion_renderer(&self, texture_type: TextureType) -> Result<Self::DistortionRenderer>;

    /// Saved calibration, or `None` when the viewer was never calibrated.
    fn saved_device_params(&self) -> Option<DeviceParams>;
    /// Launches the external QR scan flow, which saves new params on success.
    fn scan_qr_code_and_save_device_params(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eye_slots_are_fixed() {
        assert_eq!(Eye::Left.index(), 0);
        assert_eq!(Eye::Right.index(), 1);
        assert_eq!(Eye::BOTH, [Eye::Left, Eye::Right]);
    }

    #[test]
    fn empty_blob_is_not_calibration() {
        assert!(DeviceParams::from_bytes(Vec::new()).is_none());
        let params = DeviceParams::from_bytes(vec![1, 2, 3]).unwrap();
        assert_eq!(params.len(), 3);
        assert_eq!(params.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn mesh_counts_vertex_pairs() {
        let mesh = DistortionMesh {
            indices: vec![0, 1, 2],
            vertices: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
            uvs: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0],
        };
        assert_eq!(mesh.vertex_count(), 3);
        assert!(!mesh.is_empty());
        assert!(DistortionMesh::default().is_empty());
    }
}
