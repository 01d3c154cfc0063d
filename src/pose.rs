//! Head pose composition
//!
//! Turns the raw position + orientation sample reported by the head tracker
//! into the 4x4 head transform used by the renderer, and provides the boot-time
//! clock the tracker's prediction timestamps are expressed in.

use glam::{Mat4, Quat, Vec3};

/// Position and orientation of the viewer's head at one instant
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeadPose {
    pub position: Vec3,
    pub orientation: Quat,
}

impl HeadPose {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        orientation: Quat::IDENTITY,
    };

    /// Builds a pose from the flat arrays the tracker fills in.
    /// Orientation is `[x, y, z, w]`.
    pub fn from_arrays(position: [f32; 3], orientation: [f32; 4]) -> Self {
        Self {
            position: Vec3::from_array(position),
            orientation: Quat::from_array(orientation),
        }
    }
}

impl Default for HeadPose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

pub fn translation(offset: Vec3) -> Mat4 {
    Mat4::from_translation(offset)
}

/// `translation(position) * rotation(orientation)`
pub fn pose_matrix(pose: &HeadPose) -> Mat4 {
    translation(pose.position) * Mat4::from_quat(pose.orientation)
}

/// Head transform with the floor offset applied on the left:
/// `translate(0, floor_height, 0) * translate(position) * rotation(orientation)`.
pub fn compose_pose(position: Vec3, orientation: Quat, floor_height: f32) -> Mat4 {
    translation(Vec3::new(0.0, floor_height, 0.0))
        * translation(position)
        * Mat4::from_quat(orientation)
}

pub fn head_view(pose: &HeadPose, floor_height: f32) -> Mat4 {
    compose_pose(pose.position, pose.orientation, floor_height)
}

/// Timestamp handed to the tracker: now plus the prediction horizon.
pub fn prediction_timestamp(now_nanos: i64, prediction_nanos: i64) -> i64 {
    now_nanos.saturating_add(prediction_nanos)
}

/// Nanoseconds since boot, including time spent suspended.
#[cfg(any(target_os = "android", target_os = "linux"))]
pub fn boot_time_nanos() -> i64 {
    clock_nanos(libc::CLOCK_BOOTTIME)
}

#[cfg(not(any(target_os = "android", target_os = "linux")))]
pub fn boot_time_nanos() -> i64 {
    clock_nanos(libc::CLOCK_MONOTONIC)
}

fn clock_nanos(clock: libc::clockid_t) -> i64 {
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    // Only fails for an invalid clock id
    let res = unsafe { libc::clock_gettime(clock, &mut ts) };
    if res != 0 {
        return 0;
    }
    (ts.tv_sec as i64) * 1_000_000_000 + ts.tv_nsec as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    const EPS: f32 = 1e-5;

    #[test]
    fn identity_pose_is_floor_translation() {
        let m = head_view(&HeadPose::IDENTITY, -1.7);
        let expected = Mat4::from_translation(Vec3::new(0.0, -1.7, 0.0));
        assert!(m.abs_diff_eq(expected, EPS));
    }

    #[test]
    fn composition_order_is_floor_then_position_then_rotation() {
        let position = Vec3::new(0.3, 0.1, -0.2);
        let orientation = Quat::from_rotation_y(0.7) * Quat::from_rotation_x(-0.3);
        let floor = -1.7;

        let expected = Mat4::from_translation(Vec3::new(0.0, floor, 0.0))
            * Mat4::from_translation(position)
            * Mat4::from_quat(orientation);
        let composed = compose_pose(position, orientation, floor);
        assert!(composed.abs_diff_eq(expected, EPS));

        // Rotation must not be applied to the floor offset
        let wrong_order = Mat4::from_translation(position)
            * Mat4::from_quat(orientation)
            * Mat4::from_translation(Vec3::new(0.0, floor, 0.0));
        assert!(!composed.abs_diff_eq(wrong_order, EPS));
    }

    #[test]
    fn rotation_keeps_translation_column() {
        let pose = HeadPose {
            position: Vec3::new(1.0, 2.0, 3.0),
            orientation: Quat::from_rotation_z(FRAC_PI_2),
        };
        let m = head_view(&pose, -1.0);
        let t = m.w_axis;
        assert!((t.x - 1.0).abs() < EPS);
        assert!((t.y - 1.0).abs() < EPS);
        assert!((t.z - 3.0).abs() < EPS);

        // +X rotated a quarter turn about Z lands on +Y
        let x = m.transform_vector3(Vec3::X);
        assert!(x.abs_diff_eq(Vec3::Y, EPS));
    }

    #[test]
    fn pose_from_tracker_arrays() {
        let pose = HeadPose::from_arrays([0.0, 1.0, 2.0], [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(pose.position, Vec3::new(0.0, 1.0, 2.0));
        assert_eq!(pose.orientation, Quat::IDENTITY);
        assert!(pose_matrix(&pose).abs_diff_eq(Mat4::from_translation(pose.position), EPS));
    }

    #[test]
    fn prediction_adds_horizon() {
        assert_eq!(prediction_timestamp(1_000, 50_000_000), 50_001_000);
        assert_eq!(prediction_timestamp(i64::MAX, 1), i64::MAX);
    }

    #[test]
    fn boot_clock_is_monotonic() {
        let a = boot_time_nanos();
        let b = boot_time_nanos();
        assert!(a > 0);
        assert!(b >= a);
    }
}
