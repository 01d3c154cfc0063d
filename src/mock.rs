//! In-memory stand-ins for the Cardboard SDK and the GL driver
//!
//! `MockSdk` simulates a calibrated (or uncalibrated) viewer and records every
//! SDK call through a shared state handle. `RecordingGl` hands out fake object
//! ids and logs GL calls, which makes leaks and teardown ordering observable
//! off-device.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use glam::{Mat4, Vec3};

use crate::error::{Result, VrError};
use crate::gfx::{BufferTarget, GlApi, GlId, GlObjectKind, PixelFormat, ScreenSize, TexturedDraw, Viewport};
use crate::pose::HeadPose;
use crate::sdk::{
    DeviceParams, DistortionMesh, DistortionRenderer, Eye, EyeTextureDescription, HeadTracker, LensDistortion,
    TextureType, ViewportOrientation, VrSdk,
};

/// Inter-pupillary distance of the simulated viewer
pub const MOCK_IPD: f32 = 0.064;
const MOCK_FOV_Y: f32 = 1.4;

#[derive(Debug, Clone, PartialEq)]
pub struct RenderCall {
    pub target_display: u64,
    pub viewport: Viewport,
    pub left: EyeTextureDescription,
    pub right: EyeTextureDescription,
}

#[derive(Debug, Default)]
pub struct MockSdkState {
    pub saved_params: Option<Vec<u8>>,
    /// Params the next QR scan "saves"; `None` simulates a cancelled scan
    pub scan_result: Option<Vec<u8>>,
    pub qr_scans: usize,
    pub fail_lens_creation: bool,

    pub pose: HeadPose,
    pub pose_queries: Vec<(i64, ViewportOrientation)>,
    pub tracker_pauses: usize,
    pub tracker_resumes: usize,
    pub low_pass_cutoff: Option<i32>,

    pub trackers_created: usize,
    pub trackers_destroyed: usize,
    pub lens_created: usize,
    pub lens_destroyed: usize,
    pub lens_screens: Vec<ScreenSize>,
    pub renderers_created: usize,
    pub renderers_destroyed: usize,
    pub renderer_texture_type: Option<TextureType>,

    pub meshes_set: Vec<Eye>,
    pub renders: Vec<RenderCall>,
}

/// Cloneable handle; every clone shares the same state
#[derive(Debug, Clone, Default)]
pub struct MockSdk {
    state: Rc<RefCell<MockSdkState>>,
}

impl MockSdk {
    /// A viewer that was never calibrated
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calibrated(params: &[u8]) -> Self {
        let sdk = Self::new();
        sdk.save_params(params);
        sdk
    }

    pub fn save_params(&self, params: &[u8]) {
        self.state.borrow_mut().saved_params = Some(params.to_vec());
    }

    pub fn clear_params(&self) {
        self.state.borrow_mut().saved_params = None;
    }

    pub fn state(&self) -> Ref<'_, MockSdkState> {
        self.state.borrow()
    }

    pub fn state_mut(&self) -> RefMut<'_, MockSdkState> {
        self.state.borrow_mut()
    }
}

impl VrSdk for MockSdk {
    type HeadTracker = MockHeadTracker;
    type LensDistortion = MockLensDistortion;
    type DistortionRenderer = MockDistortionRenderer;

    fn create_head_tracker(&self) -> Result<MockHeadTracker> {
        self.state.borrow_mut().trackers_created += 1;
        Ok(MockHeadTracker {
            state: Rc::clone(&self.state),
        })
    }

    fn create_lens_distortion(&self, _params: &DeviceParams, screen: ScreenSize) -> Result<MockLensDistortion> {
        let mut state = self.state.borrow_mut();
        if state.fail_lens_creation {
            return Err(VrError::Sdk("mock lens distortion rejected params".into()));
        }
        state.lens_created += 1;
        state.lens_screens.push(screen);
        Ok(MockLensDistortion {
            state: Rc::clone(&self.state),
            // Half-screen aspect, since each eye gets one half
            aspect: screen.width as f32 / 2.0 / screen.height.max(1) as f32,
        })
    }

    fn create_distortion_renderer(&self, texture_type: TextureType) -> Result<MockDistortionRenderer> {
        let mut state = self.state.borrow_mut();
        state.renderers_created += 1;
        state.renderer_texture_type = Some(texture_type);
        Ok(MockDistortionRenderer {
            state: Rc::clone(&self.state),
        })
    }

    fn saved_device_params(&self) -> Option<DeviceParams> {
        self.state
            .borrow()
            .saved_params
            .clone()
            .and_then(DeviceParams::from_bytes)
    }

    fn scan_qr_code_and_save_device_params(&self) {
        let mut state = self.state.borrow_mut();
        state.qr_scans += 1;
        if let Some(params) = state.scan_result.clone() {
            state.saved_params = Some(params);
        }
    }
}

pub struct MockHeadTracker {
    state: Rc<RefCell<MockSdkState>>,
}

impl HeadTracker for MockHeadTracker {
    fn pause(&mut self) {
        self.state.borrow_mut().tracker_pauses += 1;
    }

    fn resume(&mut self) {
        self.state.borrow_mut().tracker_resumes += 1;
    }

    fn set_low_pass_filter(&mut self, cutoff_hz: i32) {
        self.state.borrow_mut().low_pass_cutoff = Some(cutoff_hz);
    }

    fn pose(&mut self, timestamp_nanos: i64, orientation: ViewportOrientation) -> HeadPose {
        let mut state = self.state.borrow_mut();
        state.pose_queries.push((timestamp_nanos, orientation));
        state.pose
    }
}

impl Drop for MockHeadTracker {
    fn drop(&mut self) {
        self.state.borrow_mut().trackers_destroyed += 1;
    }
}

pub struct MockLensDistortion {
    state: Rc<RefCell<MockSdkState>>,
    aspect: f32,
}

impl LensDistortion for MockLensDistortion {
    fn eye_from_head_matrix(&self, eye: Eye) -> Mat4 {
        // The left eye sits at -x in head space, so head points shift +x.
        let offset = match eye {
            Eye::Left => MOCK_IPD / 2.0,
            Eye::Right => -MOCK_IPD / 2.0,
        };
        Mat4::from_translation(Vec3::new(offset, 0.0, 0.0))
    }

    fn projection_matrix(&self, _eye: Eye, z_near: f32, z_far: f32) -> Mat4 {
        Mat4::perspective_rh_gl(MOCK_FOV_Y, self.aspect, z_near, z_far)
    }

    fn distortion_mesh(&self, eye: Eye) -> DistortionMesh {
        // A 2x2 grid covering the eye's half of the screen
        let x0 = if eye == Eye::Left { -1.0 } else { 0.0 };
        DistortionMesh {
            indices: vec![0, 1, 2, 2, 1, 3],
            vertices: vec![x0, -1.0, x0 + 1.0, -1.0, x0, 1.0, x0 + 1.0, 1.0],
            uvs: vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        }
    }
}

impl Drop for MockLensDistortion {
    fn drop(&mut self) {
        self.state.borrow_mut().lens_destroyed += 1;
    }
}

pub struct MockDistortionRenderer {
    state: Rc<RefCell<MockSdkState>>,
}

impl DistortionRenderer for MockDistortionRenderer {
    fn set_mesh(&mut self, mesh: &DistortionMesh, eye: Eye) {
        debug_assert!(!mesh.is_empty());
        self.state.borrow_mut().meshes_set.push(eye);
    }

    fn render_eye_to_display(
        &mut self,
        target_display: u64,
        viewport: Viewport,
        left_eye: &EyeTextureDescription,
        right_eye: &EyeTextureDescription,
    ) {
        self.state.borrow_mut().renders.push(RenderCall {
            target_display,
            viewport,
            left: *left_eye,
            right: *right_eye,
        });
    }
}

impl Drop for MockDistortionRenderer {
    fn drop(&mut self) {
        self.state.borrow_mut().renderers_destroyed += 1;
    }
}

/// One recorded GL call
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    Create(GlObjectKind, GlId),
    Delete(GlObjectKind, GlId),
    TextureImage {
        texture: GlId,
        format: PixelFormat,
        width: i32,
        height: i32,
        with_pixels: bool,
    },
    DepthStorage {
        renderbuffer: GlId,
        width: i32,
        height: i32,
    },
    AttachRenderTarget {
        framebuffer: GlId,
        color: GlId,
        depth: GlId,
    },
    BufferData {
        buffer: GlId,
        target: BufferTarget,
        len: usize,
    },
    LinkProgram(GlId),
    BindFramebuffer(GlId),
    BeginFrame([f32; 4]),
    Viewport(Viewport),
    Draw(TexturedDraw),
}

/// Fake GL driver that records calls and tracks live objects
#[derive(Debug, Default)]
pub struct RecordingGl {
    calls: RefCell<Vec<GlCall>>,
    next_id: Cell<GlId>,
    live: RefCell<HashSet<(GlObjectKind, GlId)>>,
    deletes: RefCell<HashMap<(GlObjectKind, GlId), usize>>,
    link_failure: RefCell<Option<String>>,
    last_upload_len: Cell<Option<usize>>,
    pending_errors: RefCell<Vec<u32>>,
}

impl RecordingGl {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&self, kind: GlObjectKind) -> GlId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.live.borrow_mut().insert((kind, id));
        id
    }

    fn record(&self, call: GlCall) {
        self.calls.borrow_mut().push(call);
    }

    pub fn calls(&self) -> Vec<GlCall> {
        self.calls.borrow().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn draws(&self) -> Vec<TexturedDraw> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                GlCall::Draw(d) => Some(*d),
                _ => None,
            })
            .collect()
    }

    pub fn viewports(&self) -> Vec<Viewport> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                GlCall::Viewport(v) => Some(*v),
                _ => None,
            })
            .collect()
    }

    /// Number of objects created and not yet deleted
    pub fn live_count(&self) -> usize {
        self.live.borrow().len()
    }

    pub fn live_of_kind(&self, kind: GlObjectKind) -> usize {
        self.live.borrow().iter().filter(|(k, _)| *k == kind).count()
    }

    pub fn delete_count(&self, kind: GlObjectKind, id: GlId) -> usize {
        self.deletes.borrow().get(&(kind, id)).copied().unwrap_or(0)
    }

    pub fn fail_next_link(&self, log: &str) {
        *self.link_failure.borrow_mut() = Some(log.to_string());
    }

    /// Byte length of the most recent texture upload that carried pixels
    pub fn last_upload_len(&self) -> Option<usize> {
        self.last_upload_len.get()
    }

    pub fn push_error(&self, code: u32) {
        self.pending_errors.borrow_mut().push(code);
    }
}

impl GlApi for RecordingGl {
    fn create_object(&self, kind: GlObjectKind) -> GlId {
        let id = self.allocate(kind);
        self.record(GlCall::Create(kind, id));
        id
    }

    fn delete_object(&self, kind: GlObjectKind, id: GlId) {
        self.live.borrow_mut().remove(&(kind, id));
        *self.deletes.borrow_mut().entry((kind, id)).or_insert(0) += 1;
        self.record(GlCall::Delete(kind, id));
    }

    fn texture_image(&self, texture: GlId, format: PixelFormat, width: i32, height: i32, pixels: Option<&[u8]>) {
        if let Some(pixels) = pixels {
            self.last_upload_len.set(Some(pixels.len()));
        }
        self.record(GlCall::TextureImage {
            texture,
            format,
            width,
            height,
            with_pixels: pixels.is_some(),
        });
    }

    fn depth_storage(&self, renderbuffer: GlId, width: i32, height: i32) {
        self.record(GlCall::DepthStorage {
            renderbuffer,
            width,
            height,
        });
    }

    fn attach_render_target(&self, framebuffer: GlId, color_texture: GlId, depth_renderbuffer: GlId) {
        self.record(GlCall::AttachRenderTarget {
            framebuffer,
            color: color_texture,
            depth: depth_renderbuffer,
        });
    }

    fn buffer_data(&self, buffer: GlId, target: BufferTarget, data: &[u8]) {
        self.record(GlCall::BufferData {
            buffer,
            target,
            len: data.len(),
        });
    }

    fn link_program(&self, _vertex_src: &str, _fragment_src: &str) -> Result<GlId> {
        if let Some(log) = self.link_failure.borrow_mut().take() {
            return Err(VrError::ProgramLink(log));
        }
        let id = self.allocate(GlObjectKind::Program);
        self.record(GlCall::LinkProgram(id));
        Ok(id)
    }

    fn attrib_location(&self, _program: GlId, name: &str) -> i32 {
        match name {
            "a_Position" => 0,
            "a_UV" => 1,
            _ => -1,
        }
    }

    fn uniform_location(&self, _program: GlId, name: &str) -> i32 {
        match name {
            "u_MVP" => 0,
            _ => -1,
        }
    }

    fn bind_framebuffer(&self, framebuffer: GlId) {
        self.record(GlCall::BindFramebuffer(framebuffer));
    }

    fn begin_frame(&self, clear_color: [f32; 4]) {
        self.record(GlCall::BeginFrame(clear_color));
    }

    fn viewport(&self, viewport: Viewport) {
        self.record(GlCall::Viewport(viewport));
    }

    fn draw_textured(&self, draw: &TexturedDraw) {
        self.record(GlCall::Draw(*draw));
    }

    fn error(&self) -> Option<u32> {
        self.pending_errors.borrow_mut().pop()
    }
}
