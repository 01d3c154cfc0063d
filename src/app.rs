//! Application session
//!
//! `CardboardApp` owns every piece of the demo for one activity lifetime and
//! exposes the lifecycle hooks the Java side calls on the GL thread.

use std::rc::Rc;

use glam::Mat4;
use log::{info, warn};

use crate::config::AppConfig;
use crate::device_params::{DeviceParamsCache, RefreshOutcome};
use crate::error::{Result, VrError};
use crate::gfx::{GlApi, ScreenSize};
use crate::pose::{self, boot_time_nanos, prediction_timestamp};
use crate::renderer::FrameRenderer;
use crate::scene::MeshData;
use crate::sdk::{HeadTracker, VrSdk};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    /// Viewer not calibrated yet; nothing was drawn
    Skipped,
}

pub struct CardboardApp<S: VrSdk> {
    // GL objects go first, then SDK objects
    renderer: Option<FrameRenderer>,
    cache: DeviceParamsCache<S>,
    head_tracker: S::HeadTracker,
    sdk: S,
    gl: Rc<dyn GlApi>,
    config: AppConfig,
    head_view: Mat4,
    target_mesh: Option<MeshData>,
    skipping: bool,
    frames: u64,
}

impl<S: VrSdk> CardboardApp<S> {
    pub fn new(sdk: S, gl: Rc<dyn GlApi>, config: AppConfig) -> Result<Self> {
        let mut head_tracker = sdk.create_head_tracker()?;
        head_tracker.set_low_pass_filter(config.velocity_filter_cutoff_hz);
        info!(
            "Cardboard app created (velocity filter {} Hz)",
            config.velocity_filter_cutoff_hz
        );

        Ok(Self {
            renderer: None,
            cache: DeviceParamsCache::new(),
            head_tracker,
            sdk,
            gl,
            config,
            head_view: Mat4::IDENTITY,
            target_mesh: None,
            skipping: false,
            frames: 0,
        })
    }

    /// GL context is (re)created: every GL object from a previous context is
    /// gone, so the scene and the render target are rebuilt. Stale names are
    /// dropped without being deleted.
    pub fn on_surface_created(&mut self) -> Result<()> {
        if let Some(mut stale) = self.renderer.take() {
            stale.forget_gl_objects();
        }
        self.cache.discard_gl_state();

        let mut renderer = FrameRenderer::new(&self.gl)?;
        renderer.rebuild_quad(self.cache.screen_size(), &self.config);
        if let Some(mesh) = &self.target_mesh {
            renderer.set_target_mesh(mesh)?;
        }
        self.renderer = Some(renderer);
        info!("Surface created");
        Ok(())
    }

    pub fn set_screen_params(&mut self, width: i32, height: i32) {
        info!("Screen params {}x{}", width, height);
        self.cache.set_screen_size(width, height);
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.rebuild_quad(ScreenSize::new(width, height), &self.config);
        }
    }

    pub fn on_draw_frame(&mut self) -> Result<FrameStatus> {
        let renderer = self
            .renderer
            .as_ref()
            .ok_or(VrError::NotInitialized("GL surface"))?;

        let outcome = self.cache.refresh(&self.sdk, &self.gl, &self.config)?;
        if outcome == RefreshOutcome::NotReady {
            if !self.skipping {
                warn!("No device params yet; skipping frames until a viewer is paired");
                self.skipping = true;
            }
            return Ok(FrameStatus::Skipped);
        }
        self.skipping = false;

        let timestamp = prediction_timestamp(boot_time_nanos(), self.config.prediction_nanos);
        let head_pose = self
            .head_tracker
            .pose(timestamp, self.config.viewport_orientation);
        self.head_view = pose::head_view(&head_pose, self.config.floor_height);

        renderer.draw_frame(&mut self.cache, &self.config)?;
        self.frames += 1;
        Ok(FrameStatus::Rendered)
    }

    pub fn on_trigger_event(&mut self) {
        info!("Trigger event");
    }

    pub fn on_pause(&mut self) {
        self.head_tracker.pause();
        info!("Paused");
    }

    pub fn on_resume(&mut self) {
        self.head_tracker.resume();

        // Parameters may have changed while paused (e.g. a new viewer was scanned)
        self.cache.invalidate_device();

        if self.sdk.saved_device_params().is_none() {
            info!("No saved device params; launching QR scan");
            self.sdk.scan_qr_code_and_save_device_params();
        }
        info!("Resumed");
    }

    pub fn switch_viewer(&mut self) {
        info!("Switching viewer");
        self.sdk.scan_qr_code_and_save_device_params();
        self.cache.invalidate_device();
    }

    /// Uploads one RGBA video frame into the quad texture.
    pub fn on_video_frame(&mut self, rgba: &[u8], width: i32, height: i32) -> Result<()> {
        let renderer = self
            .renderer
            .as_mut()
            .ok_or(VrError::NotInitialized("GL surface"))?;
        let gl = Rc::clone(renderer.gl());
        let texture = renderer
            .quad_texture_mut()
            .ok_or(VrError::NotInitialized("screen params"))?;

        texture.upload(gl.as_ref(), rgba, width, height).map_err(|e| {
            warn!("Dropping video frame: {}", e);
            e
        })
    }

    /// Installs (or replaces) the target mesh. Uploaded now when a surface
    /// exists, otherwise on the next `on_surface_created`.
    pub fn set_target_mesh(&mut self, mesh: MeshData) -> Result<()> {
        if let Some(renderer) = self.renderer.as_mut() {
            renderer.set_target_mesh(&mesh)?;
        }
        self.target_mesh = Some(mesh);
        Ok(())
    }

    /// Head view from the most recent frame
    pub fn head_view(&self) -> Mat4 {
        self.head_view
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn sdk(&self) -> &S {
        &self.sdk
    }

    pub fn device_params(&self) -> &DeviceParamsCache<S> {
        &self.cache
    }

    pub fn renderer(&self) -> Option<&FrameRenderer> {
        self.renderer.as_ref()
    }
}

impl<S: VrSdk> Drop for CardboardApp<S> {
    fn drop(&mut self) {
        info!("Cardboard app destroyed after {} frames", self.frames);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_params::CacheState;
    use crate::gfx::GlObjectKind;
    use crate::mock::{GlCall, MockSdk, RecordingGl};
    use crate::pose::HeadPose;
    use crate::sdk::ViewportOrientation;
    use glam::{Quat, Vec3};

    fn app_with(sdk: &MockSdk) -> (CardboardApp<MockSdk>, Rc<RecordingGl>) {
        let recorder = Rc::new(RecordingGl::new());
        let gl: Rc<dyn GlApi> = recorder.clone();
        let app = CardboardApp::new(sdk.clone(), gl, AppConfig::default()).unwrap();
        (app, recorder)
    }

    #[test]
    fn new_creates_tracker_with_velocity_filter() {
        let sdk = MockSdk::new();
        let (_app, _gl) = app_with(&sdk);
        assert_eq!(sdk.state().trackers_created, 1);
        assert_eq!(sdk.state().low_pass_cutoff, Some(6));
    }

    #[test]
    fn frame_before_surface_is_an_error() {
        let sdk = MockSdk::calibrated(b"viewer");
        let (mut app, _gl) = app_with(&sdk);
        assert!(matches!(app.on_draw_frame(), Err(VrError::NotInitialized(_))));
    }

    #[test]
    fn uncalibrated_viewer_skips_frames() {
        let sdk = MockSdk::new();
        let (mut app, recorder) = app_with(&sdk);
        app.on_surface_created().unwrap();
        app.set_screen_params(1920, 1080);

        assert_eq!(app.on_draw_frame().unwrap(), FrameStatus::Skipped);
        assert_eq!(app.on_draw_frame().unwrap(), FrameStatus::Skipped);
        assert!(recorder.draws().is_empty());
        assert!(sdk.state().pose_queries.is_empty());
        assert_eq!(app.device_params().state(), CacheState::Dirty);
    }

    #[test]
    fn calibrated_frame_queries_predicted_pose() {
        let sdk = MockSdk::calibrated(b"viewer");
        sdk.state_mut().pose = HeadPose {
            position: Vec3::new(0.0, 0.1, 0.0),
            orientation: Quat::IDENTITY,
        };
        let (mut app, recorder) = app_with(&sdk);
        app.on_surface_created().unwrap();
        app.set_screen_params(1920, 1080);

        let before = boot_time_nanos();
        assert_eq!(app.on_draw_frame().unwrap(), FrameStatus::Rendered);

        let state = sdk.state();
        assert_eq!(state.pose_queries.len(), 1);
        let (timestamp, orientation) = state.pose_queries[0];
        assert!(timestamp >= before + 50_000_000);
        assert_eq!(orientation, ViewportOrientation::LandscapeLeft);
        assert_eq!(state.renders.len(), 1);
        assert_eq!(recorder.draws().len(), 2);

        let eye_height = app.head_view().transform_point3(Vec3::ZERO);
        assert!(eye_height.abs_diff_eq(Vec3::new(0.0, -1.6, 0.0), 1e-5));
    }

    #[test]
    fn pause_and_resume_reach_tracker() {
        let sdk = MockSdk::calibrated(b"viewer");
        let (mut app, _gl) = app_with(&sdk);
        app.on_pause();
        app.on_resume();
        assert_eq!(sdk.state().tracker_pauses, 1);
        assert_eq!(sdk.state().tracker_resumes, 1);
        assert_eq!(sdk.state().qr_scans, 0);
    }

    #[test]
    fn resume_without_params_scans_once() {
        let sdk = MockSdk::new();
        sdk.state_mut().scan_result = Some(b"scanned".to_vec());
        let (mut app, _gl) = app_with(&sdk);

        app.on_resume();
        assert_eq!(sdk.state().qr_scans, 1);

        // The scan saved params, so a second resume does not scan again
        app.on_resume();
        assert_eq!(sdk.state().qr_scans, 1);
    }

    #[test]
    fn resume_marks_device_params_dirty() {
        let sdk = MockSdk::calibrated(b"viewer");
        let (mut app, _gl) = app_with(&sdk);
        app.on_surface_created().unwrap();
        app.set_screen_params(1920, 1080);
        app.on_draw_frame().unwrap();
        assert!(app.device_params().is_valid());

        app.on_resume();
        assert!(app.device_params().dirty_flags().device_params_changed);
        app.on_draw_frame().unwrap();
        assert_eq!(app.device_params().rebuild_count(), 2);
    }

    #[test]
    fn switch_viewer_scans_and_rebuilds() {
        let sdk = MockSdk::calibrated(b"viewer");
        sdk.state_mut().scan_result = Some(b"other viewer".to_vec());
        let (mut app, _gl) = app_with(&sdk);
        app.on_surface_created().unwrap();
        app.set_screen_params(1920, 1080);
        app.on_draw_frame().unwrap();

        app.switch_viewer();
        assert_eq!(sdk.state().qr_scans, 1);
        app.on_draw_frame().unwrap();
        assert_eq!(sdk.state().lens_created, 2);
    }

    #[test]
    fn video_frame_must_match_dimensions() {
        let sdk = MockSdk::calibrated(b"viewer");
        let (mut app, recorder) = app_with(&sdk);
        app.on_surface_created().unwrap();
        app.set_screen_params(1920, 1080);

        assert!(app.on_video_frame(&[0u8; 8], 4, 4).is_err());
        assert!(app.on_video_frame(&[0u8; 4 * 4 * 4 + 100], 4, 4).is_err());
        assert_eq!(recorder.last_upload_len(), Some(300 * 168 * 4));

        app.on_video_frame(&[0u8; 64], 4, 4).unwrap();
        assert_eq!(recorder.last_upload_len(), Some(64));
    }

    #[test]
    fn surface_recreation_never_deletes_stale_names() {
        let sdk = MockSdk::calibrated(b"viewer");
        let (mut app, recorder) = app_with(&sdk);
        app.on_surface_created().unwrap();
        app.set_screen_params(1920, 1080);
        app.on_draw_frame().unwrap();
        recorder.clear_calls();

        // New context; the old names may be handed out again by the driver
        app.on_surface_created().unwrap();
        app.on_draw_frame().unwrap();

        let calls = recorder.calls();
        assert!(calls.iter().any(|c| matches!(c, GlCall::Create(..))));
        assert!(!calls.iter().any(|c| matches!(c, GlCall::Delete(..))));
        assert_eq!(app.device_params().rebuild_count(), 2);
        // The stale distortion renderer was discarded, not destroyed
        assert_eq!(sdk.state().renderers_destroyed, 0);
    }

    #[test]
    fn target_mesh_set_before_surface_is_uploaded_later() {
        let sdk = MockSdk::calibrated(b"viewer");
        let (mut app, recorder) = app_with(&sdk);
        app.set_target_mesh(MeshData {
            vertices: vec![0.0; 15],
            indices: vec![0, 1, 2],
            texture_rgba: vec![255; 4],
            texture_size: (1, 1),
        })
        .unwrap();
        assert_eq!(recorder.live_count(), 0);

        app.on_surface_created().unwrap();
        app.set_screen_params(1920, 1080);
        assert!(app.renderer().unwrap().has_target_mesh());

        recorder.clear_calls();
        app.on_draw_frame().unwrap();
        // quad + target for each eye
        assert_eq!(recorder.draws().len(), 4);
    }

    #[test]
    fn drop_releases_everything() {
        let sdk = MockSdk::calibrated(b"viewer");
        let (mut app, recorder) = app_with(&sdk);
        app.on_surface_created().unwrap();
        app.set_screen_params(1920, 1080);
        app.on_draw_frame().unwrap();
        assert!(recorder.live_of_kind(GlObjectKind::Framebuffer) > 0);

        drop(app);
        assert_eq!(recorder.live_count(), 0);
        let state = sdk.state();
        assert_eq!(state.trackers_destroyed, 1);
        assert_eq!(state.lens_destroyed, state.lens_created);
        assert_eq!(state.renderers_destroyed, state.renderers_created);
    }
}
