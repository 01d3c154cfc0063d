//! Cardboard SDK bindings
//!
//! Raw FFI declarations for `libcardboard_api.so` and the safe wrappers that
//! implement the `sdk` traits on device. Every wrapper owns its SDK pointer and
//! destroys it on drop.

use std::os::raw::{c_float, c_int};
use std::ptr;

use glam::Mat4;
use log::{info, warn};

use super::{
    DeviceParams, DistortionMesh, DistortionRenderer, Eye, EyeTextureDescription, HeadTracker,
    LensDistortion, TextureType, ViewportOrientation, VrSdk,
};
use crate::error::{Result, VrError};
use crate::gfx::{ScreenSize, Viewport};
use crate::pose::HeadPose;

#[repr(C)]
pub struct CardboardHeadTracker {
    _private: [u8; 0],
}

#[repr(C)]
pub struct CardboardLensDistortion {
    _private: [u8; 0],
}

#[repr(C)]
pub struct CardboardDistortionRenderer {
    _private: [u8; 0],
}

#[repr(C)]
struct CardboardMesh {
    indices: *mut c_int,
    n_indices: c_int,
    vertices: *mut c_float,
    uvs: *mut c_float,
    n_vertices: c_int,
}

#[repr(C)]
struct CardboardEyeTextureDescription {
    texture: u64,
    left_u: c_float,
    right_u: c_float,
    top_v: c_float,
    bottom_v: c_float,
}

#[repr(C)]
struct CardboardOpenGlEsDistortionRendererConfig {
    texture_type: c_int,
}

extern "C" {
    fn Cardboard_initializeAndroid(vm: *mut jni::sys::JavaVM, context: jni::sys::jobject);

    fn CardboardHeadTracker_create() -> *mut CardboardHeadTracker;
    fn CardboardHeadTracker_destroy(head_tracker: *mut CardboardHeadTracker);
    fn CardboardHeadTracker_pause(head_tracker: *mut CardboardHeadTracker);
    fn CardboardHeadTracker_resume(head_tracker: *mut CardboardHeadTracker);
    fn CardboardHeadTracker_setLowPassFilter(head_tracker: *mut CardboardHeadTracker, cutoff_frequency: i32);
    fn CardboardHeadTracker_getPose(
        head_tracker: *mut CardboardHeadTracker,
        timestamp_ns: i64,
        viewport_orientation: c_int,
        position: *mut c_float,
        orientation: *mut c_float,
    );

    fn CardboardLensDistortion_create(
        encoded_device_params: *const u8,
        size: c_int,
        display_width: c_int,
        display_height: c_int,
    ) -> *mut CardboardLensDistortion;
    fn CardboardLensDistortion_destroy(lens_distortion: *mut CardboardLensDistortion);
    fn CardboardLensDistortion_getEyeFromHeadMatrix(
        lens_distortion: *mut CardboardLensDistortion,
        eye: c_int,
        eye_from_head_matrix: *mut c_float,
    );
    fn CardboardLensDistortion_getProjectionMatrix(
        lens_distortion: *mut CardboardLensDistortion,
        eye: c_int,
        z_near: c_float,
        z_far: c_float,
        projection_matrix: *mut c_float,
    );
    fn CardboardLensDistortion_getDistortionMesh(
        lens_distortion: *mut CardboardLensDistortion,
        eye: c_int,
        mesh: *mut CardboardMesh,
    );

    fn CardboardOpenGlEs2DistortionRenderer_create(
        config: *const CardboardOpenGlEsDistortionRendererConfig,
    ) -> *mut CardboardDistortionRenderer;
    fn CardboardDistortionRenderer_destroy(renderer: *mut CardboardDistortionRenderer);
    fn CardboardDistortionRenderer_setMesh(
        renderer: *mut CardboardDistortionRenderer,
        mesh: *const CardboardMesh,
        eye: c_int,
    );
    fn CardboardDistortionRenderer_renderEyeToDisplay(
        renderer: *mut CardboardDistortionRenderer,
        target: u64,
        x: c_int,
        y: c_int,
        width: c_int,
        height: c_int,
        left_eye: *const CardboardEyeTextureDescription,
        right_eye: *const CardboardEyeTextureDescription,
    );

    fn CardboardQrCode_getSavedDeviceParams(encoded_device_params: *mut *mut u8, size: *mut c_int);
    fn CardboardQrCode_destroy(encoded_device_params: *const u8);
    fn CardboardQrCode_scanQrCodeAndSaveDeviceParams();
}

/// Hands the Java VM and activity context to the SDK.
/// Must run once before any other Cardboard call.
///
/// # Safety
/// `vm` and `context` must be valid JNI pointers for the lifetime of the app.
pub unsafe fn initialize_android(vm: *mut jni::sys::JavaVM, context: jni::sys::jobject) {
    Cardboard_initializeAndroid(vm, context);
    info!("Cardboard SDK initialized");
}

/// Zero-sized handle to the process-wide Cardboard SDK
#[derive(Debug, Default, Clone, Copy)]
pub struct CardboardSdk;

impl VrSdk for CardboardSdk {
    type HeadTracker = CardboardTracker;
    type LensDistortion = CardboardLens;
    type DistortionRenderer = CardboardRenderer;

    fn create_head_tracker(&self) -> Result<CardboardTracker> {
        let raw = unsafe { CardboardHeadTracker_create() };
        if raw.is_null() {
            return Err(VrError::Sdk("CardboardHeadTracker_create returned null".into()));
        }
        Ok(CardboardTracker { raw })
    }

    fn create_lens_distortion(&self, params: &DeviceParams, screen: ScreenSize) -> Result<CardboardLens> {
        let bytes = params.as_bytes();
        let raw = unsafe {
            CardboardLensDistortion_create(bytes.as_ptr(), bytes.len() as c_int, screen.width, screen.height)
        };
        if raw.is_null() {
            return Err(VrError::Sdk("CardboardLensDistortion_create returned null".into()));
        }
        Ok(CardboardLens { raw })
    }

    fn create_distortion_renderer(&self, texture_type: TextureType) -> Result<CardboardRenderer> {
        let config = CardboardOpenGlEsDistortionRendererConfig {
            texture_type: texture_type as c_int,
        };
        let raw = unsafe { CardboardOpenGlEs2DistortionRenderer_create(&config) };
        if raw.is_null() {
            return Err(VrError::Sdk("CardboardOpenGlEs2DistortionRenderer_create returned null".into()));
        }
        Ok(CardboardRenderer { raw })
    }

    fn saved_device_params(&self) -> Option<DeviceParams> {
        let buffer = SavedParamsBuffer::fetch();
        DeviceParams::from_bytes(buffer.as_slice().to_vec())
    }

    fn scan_qr_code_and_save_device_params(&self) {
        info!("Launching viewer QR scan");
        unsafe { CardboardQrCode_scanQrCodeAndSaveDeviceParams() };
    }
}

/// SDK-allocated calibration buffer, released on drop
struct SavedParamsBuffer {
    data: *mut u8,
    size: c_int,
}

impl SavedParamsBuffer {
    fn fetch() -> Self {
        let mut data = ptr::null_mut();
        let mut size: c_int = 0;
        unsafe { CardboardQrCode_getSavedDeviceParams(&mut data, &mut size) };
        Self { data, size }
    }

    fn as_slice(&self) -> &[u8] {
        if self.data.is_null() || self.size <= 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.data, self.size as usize) }
    }
}

impl Drop for SavedParamsBuffer {
    fn drop(&mut self) {
        if !self.data.is_null() {
            unsafe { CardboardQrCode_destroy(self.data) };
        }
    }
}

pub struct CardboardTracker {
    raw: *mut CardboardHeadTracker,
}

impl HeadTracker for CardboardTracker {
    fn pause(&mut self) {
        unsafe { CardboardHeadTracker_pause(self.raw) };
    }

    fn resume(&mut self) {
        unsafe { CardboardHeadTracker_resume(self.raw) };
    }

    fn set_low_pass_filter(&mut self, cutoff_hz: i32) {
        unsafe { CardboardHeadTracker_setLowPassFilter(self.raw, cutoff_hz) };
    }

    fn pose(&mut self, timestamp_nanos: i64, orientation: ViewportOrientation) -> HeadPose {
        let mut position = [0.0f32; 3];
        let mut rotation = [0.0f32, 0.0, 0.0, 1.0];
        unsafe {
            CardboardHeadTracker_getPose(
                self.raw,
                timestamp_nanos,
                orientation as c_int,
                position.as_mut_ptr(),
                rotation.as_mut_ptr(),
            );
        }
        HeadPose::from_arrays(position, rotation)
    }
}

impl Drop for CardboardTracker {
    fn drop(&mut self) {
        unsafe { CardboardHeadTracker_destroy(self.raw) };
    }
}

pub struct CardboardLens {
    raw: *mut CardboardLensDistortion,
}

impl LensDistortion for CardboardLens {
    fn eye_from_head_matrix(&self, eye: Eye) -> Mat4 {
        let mut m = [0.0f32; 16];
        unsafe { CardboardLensDistortion_getEyeFromHeadMatrix(self.raw, eye as c_int, m.as_mut_ptr()) };
        Mat4::from_cols_array(&m)
    }

    fn projection_matrix(&self, eye: Eye, z_near: f32, z_far: f32) -> Mat4 {
        let mut m = [0.0f32; 16];
        unsafe {
            CardboardLensDistortion_getProjectionMatrix(self.raw, eye as c_int, z_near, z_far, m.as_mut_ptr())
        };
        Mat4::from_cols_array(&m)
    }

    fn distortion_mesh(&self, eye: Eye) -> DistortionMesh {
        let mut mesh = CardboardMesh {
            indices: ptr::null_mut(),
            n_indices: 0,
            vertices: ptr::null_mut(),
            uvs: ptr::null_mut(),
            n_vertices: 0,
        };
        unsafe { CardboardLensDistortion_getDistortionMesh(self.raw, eye as c_int, &mut mesh) };

        if mesh.indices.is_null() || mesh.vertices.is_null() || mesh.uvs.is_null() {
            warn!("Empty distortion mesh for {:?}", eye);
            return DistortionMesh::default();
        }

        // The arrays stay owned by the lens distortion object; copy them out.
        let n_indices = mesh.n_indices.max(0) as usize;
        let n_coords = mesh.n_vertices.max(0) as usize * 2;
        unsafe {
            DistortionMesh {
                indices: std::slice::from_raw_parts(mesh.indices, n_indices).to_vec(),
                vertices: std::slice::from_raw_parts(mesh.vertices, n_coords).to_vec(),
                uvs: std::slice::from_raw_parts(mesh.uvs, n_coords).to_vec(),
            }
        }
    }
}

impl Drop for CardboardLens {
    fn drop(&mut self) {
        unsafe { CardboardLensDistortion_destroy(self.raw) };
    }
}

pub struct CardboardRenderer {
    raw: *mut CardboardDistortionRenderer,
}

impl DistortionRenderer for CardboardRenderer {
    fn set_mesh(&mut self, mesh: &DistortionMesh, eye: Eye) {
        // setMesh uploads into GL buffers before returning, so borrowed
        // pointers are enough here.
        let raw_mesh = CardboardMesh {
            indices: mesh.indices.as_ptr() as *mut c_int,
            n_indices: mesh.indices.len() as c_int,
            vertices: mesh.vertices.as_ptr() as *mut c_float,
            uvs: mesh.uvs.as_ptr() as *mut c_float,
            n_vertices: mesh.vertex_count() as c_int,
        };
        unsafe { CardboardDistortionRenderer_setMesh(self.raw, &raw_mesh, eye as c_int) };
    }

    fn render_eye_to_display(
        &mut self,
        target_display: u64,
        viewport: Viewport,
        left_eye: &EyeTextureDescription,
        right_eye: &EyeTextureDescription,
    ) {
        let left = to_raw_description(left_eye);
        let right = to_raw_description(right_eye);
        unsafe {
            CardboardDistortionRenderer_renderEyeToDisplay(
                self.raw,
                target_display,
                viewport.x,
                viewport.y,
                viewport.width,
                viewport.height,
                &left,
                &right,
            );
        }
    }
}

impl Drop for CardboardRenderer {
    fn drop(&mut self) {
        unsafe { CardboardDistortionRenderer_destroy(self.raw) };
    }
}

fn to_raw_description(desc: &EyeTextureDescription) -> CardboardEyeTextureDescription {
    CardboardEyeTextureDescription {
        texture: desc.texture,
        left_u: desc.left_u,
        right_u: desc.right_u,
        top_v: desc.top_v,
        bottom_v: desc.bottom_v,
    }
}
