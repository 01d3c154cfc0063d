//! Stereo frame renderer
//!
//! Draws the scene once per eye into the off-screen target, each eye into its
//! half of the screen, then hands both halves to the distortion renderer which
//! warps them onto the display.

use std::rc::Rc;

use glam::{Mat4, Vec3};
use log::debug;

use crate::config::AppConfig;
use crate::device_params::{DeviceParamsCache, EyeParameters};
use crate::error::{Result, VrError};
use crate::gfx::{check_gl_error, GlApi, ScreenSize, Viewport};
use crate::pose::translation;
use crate::scene::{MeshData, ObjProgram, Quad, QuadTexture, TargetMesh};
use crate::sdk::{DistortionRenderer, Eye, EyeTextureDescription, VrSdk};

/// Framebuffer 0 is the window surface
const DISPLAY_FRAMEBUFFER: u32 = 0;

/// Each eye renders into its half of the screen.
pub fn eye_viewport(eye: Eye, screen: ScreenSize) -> Viewport {
    let half = screen.width / 2;
    let x = match eye {
        Eye::Left => 0,
        Eye::Right => half,
    };
    Viewport::new(x, 0, half, screen.height)
}

/// UV rectangle of an eye's half of the shared color texture
pub fn eye_texture_description(eye: Eye, texture: u64) -> EyeTextureDescription {
    let (left_u, right_u) = match eye {
        Eye::Left => (0.0, 0.5),
        Eye::Right => (0.5, 1.0),
    };
    EyeTextureDescription {
        texture,
        left_u,
        right_u,
        top_v: 1.0,
        bottom_v: 0.0,
    }
}

/// `projection × eye_from_head × translate(0, 0, min_target_distance)`
pub fn modelview_projection(eye: &EyeParameters, min_target_distance: f32) -> Mat4 {
    let model = translation(Vec3::new(0.0, 0.0, min_target_distance));
    eye.projection * eye.eye_from_head * model
}

/// GL-side scene state: the object program, the quad and the optional target
/// mesh. Lives as long as the GL surface.
pub struct FrameRenderer {
    gl: Rc<dyn GlApi>,
    program: ObjProgram,
    quad: Option<Quad>,
    target: Option<TargetMesh>,
}

impl FrameRenderer {
    pub fn new(gl: &Rc<dyn GlApi>) -> Result<Self> {
        let program = ObjProgram::new(gl)?;
        Ok(Self {
            gl: Rc::clone(gl),
            program,
            quad: None,
            target: None,
        })
    }

    /// Rebuilds the quad for a new screen aspect. The old buffer and texture
    /// are released before the new ones are created.
    pub fn rebuild_quad(&mut self, screen: ScreenSize, config: &AppConfig) {
        self.quad = None;
        if screen.is_empty() {
            return;
        }
        self.quad = Some(Quad::new(&self.gl, screen, config.quad_height, config.placeholder_size));
    }

    pub fn set_target_mesh(&mut self, mesh: &MeshData) -> Result<()> {
        self.target = None;
        self.target = Some(TargetMesh::upload(&self.gl, mesh)?);
        Ok(())
    }

    /// The GL context these objects lived in is gone; drop the names without
    /// deleting them.
    pub fn forget_gl_objects(&mut self) {
        self.program.forget();
        if let Some(quad) = self.quad.as_mut() {
            quad.forget();
        }
        if let Some(target) = self.target.as_mut() {
            target.forget();
        }
    }

    pub fn has_target_mesh(&self) -> bool {
        self.target.is_some()
    }

    pub fn quad_texture_mut(&mut self) -> Option<&mut QuadTexture> {
        self.quad.as_mut().map(Quad::texture_mut)
    }

    pub fn quad(&self) -> Option<&Quad> {
        self.quad.as_ref()
    }

    pub fn program(&self) -> &ObjProgram {
        &self.program
    }

    pub fn gl(&self) -> &Rc<dyn GlApi> {
        &self.gl
    }

    /// Renders one stereo frame. The cache must be valid.
    pub fn draw_frame<S: VrSdk>(&self, cache: &mut DeviceParamsCache<S>, config: &AppConfig) -> Result<()> {
        let gl = self.gl.as_ref();
        let screen = cache.screen_size();
        let framebuffer = cache
            .render_target()
            .ok_or(VrError::NotInitialized("render target"))?
            .framebuffer();

        gl.bind_framebuffer(framebuffer);
        gl.begin_frame(config.clear_color);

        for eye in Eye::BOTH {
            gl.viewport(eye_viewport(eye, screen));
            let mvp = modelview_projection(cache.eye_parameters(eye), config.min_target_distance);

            if let Some(quad) = &self.quad {
                quad.draw(gl, &self.program, &mvp);
            }
            if let Some(target) = &self.target {
                target.draw(gl, &self.program, &mvp);
            }
        }

        // Distortion pass onto the display
        gl.bind_framebuffer(DISPLAY_FRAMEBUFFER);
        let left = *cache.eye_texture(Eye::Left);
        let right = *cache.eye_texture(Eye::Right);
        let distortion = cache
            .distortion_renderer_mut()
            .ok_or(VrError::NotInitialized("distortion renderer"))?;
        distortion.render_eye_to_display(DISPLAY_FRAMEBUFFER as u64, Viewport::full(screen), &left, &right);

        check_gl_error(gl, "onDrawFrame");
        Ok(())
    }
}

impl Drop for FrameRenderer {
    fn drop(&mut self) {
        debug!("Releasing scene objects (program {})", self.program.id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{GlCall, MockSdk, RecordingGl, MOCK_IPD};

    const EPS: f32 = 1e-6;

    #[test]
    fn eyes_split_the_screen() {
        let screen = ScreenSize::new(1920, 1080);
        assert_eq!(eye_viewport(Eye::Left, screen), Viewport::new(0, 0, 960, 1080));
        assert_eq!(eye_viewport(Eye::Right, screen), Viewport::new(960, 0, 960, 1080));
    }

    #[test]
    fn eye_uv_rectangles() {
        let left = eye_texture_description(Eye::Left, 7);
        let right = eye_texture_description(Eye::Right, 7);
        assert_eq!(left.texture, 7);
        assert!((left.left_u - 0.0).abs() < EPS);
        assert!((left.right_u - 0.5).abs() < EPS);
        assert!((right.left_u - 0.5).abs() < EPS);
        assert!((right.right_u - 1.0).abs() < EPS);
        for desc in [left, right] {
            assert!((desc.top_v - 1.0).abs() < EPS);
            assert!(desc.bottom_v.abs() < EPS);
        }
    }

    #[test]
    fn mvp_pushes_scene_out_by_min_distance() {
        let eye = EyeParameters::default();
        let mvp = modelview_projection(&eye, -0.5);
        let origin = mvp.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 0.0, -0.5), EPS));
    }

    #[test]
    fn mvp_applies_eye_offset_before_projection() {
        let eye = EyeParameters {
            eye_from_head: Mat4::from_translation(Vec3::new(MOCK_IPD / 2.0, 0.0, 0.0)),
            projection: Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)),
        };
        let mvp = modelview_projection(&eye, -0.5);
        let origin = mvp.transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(MOCK_IPD, 0.0, -0.5), EPS));
    }

    #[test]
    fn quad_rebuild_releases_previous_objects() {
        let recorder = Rc::new(RecordingGl::new());
        let gl: Rc<dyn GlApi> = recorder.clone();
        let config = AppConfig::default();
        let mut renderer = FrameRenderer::new(&gl).unwrap();

        renderer.rebuild_quad(ScreenSize::new(1920, 1080), &config);
        let live_after_first = recorder.live_count();
        renderer.rebuild_quad(ScreenSize::new(1080, 1920), &config);
        assert_eq!(recorder.live_count(), live_after_first);

        renderer.rebuild_quad(ScreenSize::default(), &config);
        assert!(renderer.quad().is_none());
        // only the program remains
        assert_eq!(recorder.live_count(), 1);
    }

    #[test]
    fn forgotten_scene_releases_nothing() {
        let recorder = Rc::new(RecordingGl::new());
        let gl: Rc<dyn GlApi> = recorder.clone();
        let mut renderer = FrameRenderer::new(&gl).unwrap();
        renderer.rebuild_quad(ScreenSize::new(1920, 1080), &AppConfig::default());
        recorder.clear_calls();

        renderer.forget_gl_objects();
        drop(renderer);
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn frame_draws_each_eye_then_distorts_once() {
        let sdk = MockSdk::calibrated(b"viewer");
        let recorder = Rc::new(RecordingGl::new());
        let gl: Rc<dyn GlApi> = recorder.clone();
        let config = AppConfig::default();
        let screen = ScreenSize::new(1920, 1080);

        let mut cache = DeviceParamsCache::<MockSdk>::new();
        cache.set_screen_size(screen.width, screen.height);
        cache.refresh(&sdk, &gl, &config).unwrap();

        let mut renderer = FrameRenderer::new(&gl).unwrap();
        renderer.rebuild_quad(screen, &config);
        recorder.clear_calls();

        renderer.draw_frame(&mut cache, &config).unwrap();

        let framebuffer = cache.render_target().unwrap().framebuffer();
        let calls = recorder.calls();
        assert_eq!(calls[0], GlCall::BindFramebuffer(framebuffer));
        assert_eq!(calls[1], GlCall::BeginFrame([0.0, 0.0, 0.0, 1.0]));
        assert_eq!(
            recorder.viewports(),
            vec![eye_viewport(Eye::Left, screen), eye_viewport(Eye::Right, screen)]
        );
        assert_eq!(recorder.draws().len(), 2);
        assert_eq!(calls.last(), Some(&GlCall::BindFramebuffer(0)));

        let state = sdk.state();
        assert_eq!(state.renders.len(), 1);
        let render = &state.renders[0];
        assert_eq!(render.target_display, 0);
        assert_eq!(render.viewport, Viewport::full(screen));
        assert_eq!(render.left, *cache.eye_texture(Eye::Left));
        assert_eq!(render.right, *cache.eye_texture(Eye::Right));
    }

    #[test]
    fn frame_without_render_target_is_an_error() {
        let recorder = Rc::new(RecordingGl::new());
        let gl: Rc<dyn GlApi> = recorder.clone();
        let renderer = FrameRenderer::new(&gl).unwrap();
        let mut cache = DeviceParamsCache::<MockSdk>::new();

        let err = renderer.draw_frame(&mut cache, &AppConfig::default()).unwrap_err();
        assert!(matches!(err, VrError::NotInitialized(_)));
    }
}
