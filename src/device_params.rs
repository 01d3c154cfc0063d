//! Device-parameter cache
//!
//! Everything derived from the viewer calibration and the screen size: the
//! lens distortion, both eyes' matrices, the distortion renderer with its
//! meshes, and the off-screen render target the eyes are drawn into.
//!
//! The cache is `Valid` exactly when neither dirty flag is set. Any lifecycle
//! signal marks it dirty; `refresh` rebuilds it lazily on the next frame, or
//! reports `NotReady` while no calibration has been saved yet.

use std::rc::Rc;

use glam::Mat4;
use log::{debug, info};

use crate::config::AppConfig;
use crate::error::Result;
use crate::gfx::{check_gl_error, GlApi, RenderTarget, ScreenSize};
use crate::renderer::eye_texture_description;
use crate::sdk::{DistortionRenderer, Eye, EyeTextureDescription, LensDistortion, VrSdk};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirtyFlags {
    pub screen_params_changed: bool,
    pub device_params_changed: bool,
}

impl DirtyFlags {
    pub fn is_clean(&self) -> bool {
        !self.screen_params_changed && !self.device_params_changed
    }

    fn clear(&mut self) {
        self.screen_params_changed = false;
        self.device_params_changed = false;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheState {
    Valid,
    Dirty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Nothing was dirty
    Unchanged,
    /// Everything was rebuilt from fresh calibration
    Rebuilt,
    /// No calibration saved yet (or no screen size); skip this frame
    NotReady,
}

impl RefreshOutcome {
    pub fn is_ready(self) -> bool {
        !matches!(self, RefreshOutcome::NotReady)
    }
}

/// Per-eye matrices from the lens distortion provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeParameters {
    pub eye_from_head: Mat4,
    pub projection: Mat4,
}

impl Default for EyeParameters {
    fn default() -> Self {
        Self {
            eye_from_head: Mat4::IDENTITY,
            projection: Mat4::IDENTITY,
        }
    }
}

pub struct DeviceParamsCache<S: VrSdk> {
    flags: DirtyFlags,
    screen: ScreenSize,
    lens_distortion: Option<S::LensDistortion>,
    distortion_renderer: Option<S::DistortionRenderer>,
    render_target: Option<RenderTarget>,
    eyes: [EyeParameters; 2],
    eye_textures: [EyeTextureDescription; 2],
    rebuilds: u64,
}

impl<S: VrSdk> DeviceParamsCache<S> {
    /// Starts dirty so the first frame builds everything.
    pub fn new() -> Self {
        Self {
            flags: DirtyFlags {
                screen_params_changed: false,
                device_params_changed: true,
            },
            screen: ScreenSize::default(),
            lens_distortion: None,
            distortion_renderer: None,
            render_target: None,
            eyes: [EyeParameters::default(); 2],
            eye_textures: [EyeTextureDescription::default(); 2],
            rebuilds: 0,
        }
    }

    pub fn set_screen_size(&mut self, width: i32, height: i32) {
        self.screen = ScreenSize::new(width, height);
        self.flags.screen_params_changed = true;
    }

    /// Viewer switched or app resumed; saved params may differ.
    pub fn invalidate_device(&mut self) {
        self.flags.device_params_changed = true;
    }

    pub fn invalidate(&mut self) {
        self.flags.screen_params_changed = true;
        self.flags.device_params_changed = true;
    }

    pub fn state(&self) -> CacheState {
        if self.flags.is_clean() {
            CacheState::Valid
        } else {
            CacheState::Dirty
        }
    }

    pub fn is_valid(&self) -> bool {
        self.state() == CacheState::Valid
    }

    pub fn dirty_flags(&self) -> DirtyFlags {
        self.flags
    }

    /// Rebuilds the cache if dirty. Missing calibration is not an error: the
    /// cache stays dirty, nothing cached is touched and `NotReady` is returned.
    /// SDK failures leave the cache dirty so the next frame retries.
    pub fn refresh(&mut self, sdk: &S, gl: &Rc<dyn GlApi>, config: &AppConfig) -> Result<RefreshOutcome> {
        if self.flags.is_clean() {
            return Ok(RefreshOutcome::Unchanged);
        }

        if self.screen.is_empty() {
            debug!("Screen size unknown; deferring device params");
            return Ok(RefreshOutcome::NotReady);
        }

        let params = match sdk.saved_device_params() {
            Some(params) => params,
            None => return Ok(RefreshOutcome::NotReady),
        };

        // The old lens goes first so the SDK never holds two at once.
        self.lens_distortion = None;
        let lens = sdk.create_lens_distortion(&params, self.screen)?;

        self.gl_setup(gl);

        self.distortion_renderer = None;
        let mut renderer = sdk.create_distortion_renderer(config.texture_type)?;
        for eye in Eye::BOTH {
            renderer.set_mesh(&lens.distortion_mesh(eye), eye);
        }

        for eye in Eye::BOTH {
            self.eyes[eye.index()] = EyeParameters {
                eye_from_head: lens.eye_from_head_matrix(eye),
                projection: lens.projection_matrix(eye, config.z_near, config.z_far),
            };
        }

        self.lens_distortion = Some(lens);
        self.distortion_renderer = Some(renderer);
        self.flags.clear();
        self.rebuilds += 1;

        check_gl_error(gl.as_ref(), "UpdateDeviceParams");
        info!(
            "Device params applied ({} bytes, {}x{}), rebuild #{}",
            params.len(),
            self.screen.width,
            self.screen.height,
            self.rebuilds
        );
        Ok(RefreshOutcome::Rebuilt)
    }

    /// Replaces the render target; the previous one is torn down first.
    pub fn gl_setup(&mut self, gl: &Rc<dyn GlApi>) {
        debug!("GL setup {}x{}", self.screen.width, self.screen.height);
        self.gl_teardown();

        let target = RenderTarget::new(gl, self.screen);
        let texture = target.color_texture() as u64;
        for eye in Eye::BOTH {
            self.eye_textures[eye.index()] = eye_texture_description(eye, texture);
        }
        self.render_target = Some(target);
    }

    pub fn gl_teardown(&mut self) {
        if let Some(target) = self.render_target.take() {
            debug!("GL teardown of framebuffer {}", target.framebuffer());
            drop(target);
        }
    }

    /// GL context was lost. The render target and the distortion renderer's
    /// GL state died with it, so both are discarded without releasing
    /// anything and the cache is marked dirty.
    pub fn discard_gl_state(&mut self) {
        if let Some(mut target) = self.render_target.take() {
            target.forget();
        }
        if let Some(renderer) = self.distortion_renderer.take() {
            // Destroying it would delete its GL names inside the new context.
            std::mem::forget(renderer);
        }
        self.invalidate();
    }

    pub fn screen_size(&self) -> ScreenSize {
        self.screen
    }

    pub fn eye_parameters(&self, eye: Eye) -> &EyeParameters {
        &self.eyes[eye.index()]
    }

    pub fn eye_texture(&self, eye: Eye) -> &EyeTextureDescription {
        &self.eye_textures[eye.index()]
    }

    pub fn render_target(&self) -> Option<&RenderTarget> {
        self.render_target.as_ref()
    }

    pub fn lens_distortion(&self) -> Option<&S::LensDistortion> {
        self.lens_distortion.as_ref()
    }

    pub fn distortion_renderer_mut(&mut self) -> Option<&mut S::DistortionRenderer> {
        self.distortion_renderer.as_mut()
    }

    /// Number of completed rebuilds
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }
}

impl<S: VrSdk> Default for DeviceParamsCache<S> {
    fn default() -> Self {
        Self::new()
    }
}
