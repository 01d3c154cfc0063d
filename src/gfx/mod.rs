//! Graphics seam
//!
//! `GlApi` covers the slice of OpenGL ES the demo needs. GL objects are held in
//! `GlObject` handles that delete themselves on drop, so a render target can be
//! replaced by simply dropping the old one first.

pub mod gles;

use std::rc::Rc;

use log::error;

use crate::error::Result;

pub type GlId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlObjectKind {
    Texture,
    Framebuffer,
    Renderbuffer,
    Buffer,
    Program,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferTarget {
    Vertex,
    Index,
}

/// Screen dimensions in pixels; zero until the surface reports its size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenSize {
    pub width: i32,
    pub height: i32,
}

impl ScreenSize {
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            return 1.0;
        }
        self.width as f32 / self.height as f32
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Viewport {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn full(screen: ScreenSize) -> Self {
        Self::new(0, 0, screen.width, screen.height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Arrays { count: i32 },
    Elements { index_buffer: GlId, count: i32 },
}

/// One draw of interleaved `x, y, z, u, v` geometry with the object program
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TexturedDraw {
    pub program: GlId,
    pub mvp_location: i32,
    pub position_attrib: i32,
    pub uv_attrib: i32,
    pub mvp: [f32; 16],
    pub texture: GlId,
    pub vertex_buffer: GlId,
    pub primitive: Primitive,
}

pub trait GlApi {
    fn create_object(&self, kind: GlObjectKind) -> GlId;
    fn delete_object(&self, kind: GlObjectKind, id: GlId);

    /// Allocates (and optionally fills) the texture's level 0 with linear
    /// filtering and edge clamping.
    fn texture_image(&self, texture: GlId, format: PixelFormat, width: i32, height: i32, pixels: Option<&[u8]>);
    fn depth_storage(&self, renderbuffer: GlId, width: i32, height: i32);
    fn attach_render_target(&self, framebuffer: GlId, color_texture: GlId, depth_renderbuffer: GlId);
    fn buffer_data(&self, buffer: GlId, target: BufferTarget, data: &[u8]);

    fn link_program(&self, vertex_src: &str, fragment_src: &str) -> Result<GlId>;
    fn attrib_location(&self, program: GlId, name: &str) -> i32;
    fn uniform_location(&self, program: GlId, name: &str) -> i32;

    fn bind_framebuffer(&self, framebuffer: GlId);
    /// Depth test, back-face culling and alpha blending on, scissor off,
    /// then clears color and depth.
    fn begin_frame(&self, clear_color: [f32; 4]);
    fn viewport(&self, viewport: Viewport);
    fn draw_textured(&self, draw: &TexturedDraw);

    /// Next pending error flag, if any
    fn error(&self) -> Option<u32>;
}

/// Owned GL object, deleted exactly once on drop
pub struct GlObject {
    gl: Rc<dyn GlApi>,
    kind: GlObjectKind,
    id: GlId,
}

impl GlObject {
    pub fn new(gl: &Rc<dyn GlApi>, kind: GlObjectKind) -> Self {
        let id = gl.create_object(kind);
        Self::adopt(gl, kind, id)
    }

    /// Takes ownership of an object created elsewhere (e.g. a linked program)
    pub fn adopt(gl: &Rc<dyn GlApi>, kind: GlObjectKind, id: GlId) -> Self {
        Self {
            gl: Rc::clone(gl),
            kind,
            id,
        }
    }

    pub fn id(&self) -> GlId {
        self.id
    }

    pub fn kind(&self) -> GlObjectKind {
        self.kind
    }

    /// Drops the name without deleting it. For objects whose context is
    /// already gone; the same name may be live in the new context.
    pub fn forget(&mut self) {
        self.id = 0;
    }
}

impl Drop for GlObject {
    fn drop(&mut self) {
        if self.id != 0 {
            self.gl.delete_object(self.kind, self.id);
        }
    }
}

impl std::fmt::Debug for GlObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlObject")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}

/// Off-screen color + depth target sized to the screen.
///
/// Fields drop in declaration order: depth renderbuffer, framebuffer, then
/// color texture.
#[derive(Debug)]
pub struct RenderTarget {
    depth: GlObject,
    framebuffer: GlObject,
    color: GlObject,
    size: ScreenSize,
}

impl RenderTarget {
    pub fn new(gl: &Rc<dyn GlApi>, size: ScreenSize) -> Self {
        let color = GlObject::new(gl, GlObjectKind::Texture);
        gl.texture_image(color.id(), PixelFormat::Rgb, size.width, size.height, None);

        let depth = GlObject::new(gl, GlObjectKind::Renderbuffer);
        gl.depth_storage(depth.id(), size.width, size.height);
        check_gl_error(gl.as_ref(), "Create Render buffer");

        let framebuffer = GlObject::new(gl, GlObjectKind::Framebuffer);
        gl.attach_render_target(framebuffer.id(), color.id(), depth.id());
        check_gl_error(gl.as_ref(), "GlSetup");

        Self {
            depth,
            framebuffer,
            color,
            size,
        }
    }

    pub fn framebuffer(&self) -> GlId {
        self.framebuffer.id()
    }

    pub fn color_texture(&self) -> GlId {
        self.color.id()
    }

    pub fn depth_renderbuffer(&self) -> GlId {
        self.depth.id()
    }

    pub fn size(&self) -> ScreenSize {
        self.size
    }

    /// Context lost: release nothing on drop.
    pub fn forget(&mut self) {
        self.depth.forget();
        self.framebuffer.forget();
        self.color.forget();
    }
}

/// Drains and logs pending GL errors. Compiled out of release builds.
pub fn check_gl_error(gl: &dyn GlApi, label: &str) {
    if !cfg!(debug_assertions) {
        return;
    }
    while let Some(code) = gl.error() {
        error!("{}: GL error 0x{:04x}", label, code);
    }
}
