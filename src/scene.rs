//! Scene geometry
//!
//! The textured-object program, the head-locked quad that shows the video
//! texture, and an optional indexed target mesh.

use std::rc::Rc;

use glam::Mat4;
use log::{debug, info};

use crate::error::{Result, VrError};
use crate::gfx::{
    check_gl_error, BufferTarget, GlApi, GlId, GlObject, GlObjectKind, PixelFormat, Primitive, ScreenSize,
    TexturedDraw,
};

// Simple shaders to render textured objects without any lighting.
pub const OBJ_VERTEX_SHADER: &str = r#"
    uniform mat4 u_MVP;
    attribute vec4 a_Position;
    attribute vec2 a_UV;
    varying vec2 v_UV;

    void main() {
      v_UV = a_UV;
      gl_Position = u_MVP * a_Position;
    }"#;

pub const OBJ_FRAGMENT_SHADER: &str = r#"
    precision mediump float;

    uniform sampler2D u_Texture;
    varying vec2 v_UV;

    void main() {
      // Texture rows are stored top-down.
      gl_FragColor = texture2D(u_Texture, vec2(v_UV.x, 1.0 - v_UV.y));
    }"#;

/// Floats per interleaved vertex: x, y, z, u, v
pub const FLOATS_PER_VERTEX: usize = 5;

/// Linked object program and its attribute/uniform locations
pub struct ObjProgram {
    program: GlObject,
    position_attrib: i32,
    uv_attrib: i32,
    mvp_location: i32,
}

impl ObjProgram {
    pub fn new(gl: &Rc<dyn GlApi>) -> Result<Self> {
        let id = gl.link_program(OBJ_VERTEX_SHADER, OBJ_FRAGMENT_SHADER)?;
        let program = GlObject::adopt(gl, GlObjectKind::Program, id);
        check_gl_error(gl.as_ref(), "Obj program");

        let position_attrib = gl.attrib_location(id, "a_Position");
        let uv_attrib = gl.attrib_location(id, "a_UV");
        let mvp_location = gl.uniform_location(id, "u_MVP");
        check_gl_error(gl.as_ref(), "OnSurfaceCreated");

        info!(
            "Object program {} linked (a_Position={}, a_UV={}, u_MVP={})",
            id, position_attrib, uv_attrib, mvp_location
        );
        Ok(Self {
            program,
            position_attrib,
            uv_attrib,
            mvp_location,
        })
    }

    pub fn id(&self) -> GlId {
        self.program.id()
    }

    pub fn forget(&mut self) {
        self.program.forget();
    }

    fn draw(&self, mvp: &Mat4, texture: GlId, vertex_buffer: GlId, primitive: Primitive) -> TexturedDraw {
        TexturedDraw {
            program: self.program.id(),
            mvp_location: self.mvp_location,
            position_attrib: self.position_attrib,
            uv_attrib: self.uv_attrib,
            mvp: mvp.to_cols_array(),
            texture,
            vertex_buffer,
            primitive,
        }
    }
}

/// Two triangles centered at the origin, `height` tall and as wide as the
/// screen aspect requires. Interleaved `x, y, z, u, v`.
pub fn quad_vertices(height: f32, aspect: f32) -> [f32; 6 * FLOATS_PER_VERTEX] {
    let w = height * aspect / 2.0;
    let h = height / 2.0;
    #[rustfmt::skip]
    let vertices = [
        // Triangle 1
        -w, -h, 0.0,  0.0, 0.0, // bottom-left
         w, -h, 0.0,  1.0, 0.0, // bottom-right
         w,  h, 0.0,  1.0, 1.0, // top-right
        // Triangle 2
        -w, -h, 0.0,  0.0, 0.0, // bottom-left
         w,  h, 0.0,  1.0, 1.0, // top-right
        -w,  h, 0.0,  0.0, 1.0, // top-left
    ];
    vertices
}

/// RGBA texture shown on the quad: a white placeholder until video frames
/// arrive.
pub struct QuadTexture {
    texture: GlObject,
    width: i32,
    height: i32,
}

impl QuadTexture {
    pub fn placeholder(gl: &Rc<dyn GlApi>, width: i32, height: i32) -> Self {
        let texture = GlObject::new(gl, GlObjectKind::Texture);
        let white = vec![255u8; (width.max(0) * height.max(0)) as usize * 4];
        gl.texture_image(texture.id(), PixelFormat::Rgba, width, height, Some(&white));
        check_gl_error(gl.as_ref(), "InitWhiteTexture");
        Self { texture, width, height }
    }

    /// Replaces the texture contents with one RGBA frame.
    pub fn upload(&mut self, gl: &dyn GlApi, rgba: &[u8], width: i32, height: i32) -> Result<()> {
        if width <= 0 || height <= 0 {
            return Err(VrError::InvalidFrame(format!("{}x{} frame", width, height)));
        }
        let expected = width as usize * height as usize * PixelFormat::Rgba.bytes_per_pixel();
        if rgba.len() != expected {
            return Err(VrError::InvalidFrame(format!(
                "{}x{} frame needs {} bytes, got {}",
                width,
                height,
                expected,
                rgba.len()
            )));
        }
        gl.texture_image(self.texture.id(), PixelFormat::Rgba, width, height, Some(rgba));
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn id(&self) -> GlId {
        self.texture.id()
    }

    pub fn size(&self) -> (i32, i32) {
        (self.width, self.height)
    }

    fn forget(&mut self) {
        self.texture.forget();
    }
}

/// Screen-aspect quad and its texture
pub struct Quad {
    vertex_buffer: GlObject,
    texture: QuadTexture,
}

impl Quad {
    pub fn new(gl: &Rc<dyn GlApi>, screen: ScreenSize, height: f32, placeholder: (i32, i32)) -> Self {
        let texture = QuadTexture::placeholder(gl, placeholder.0, placeholder.1);

        let vertices = quad_vertices(height, screen.aspect());
        let vertex_buffer = GlObject::new(gl, GlObjectKind::Buffer);
        gl.buffer_data(vertex_buffer.id(), BufferTarget::Vertex, bytemuck::cast_slice(&vertices));
        check_gl_error(gl.as_ref(), "InitWhiteQuad VBO");

        debug!("Quad built for {}x{} screen", screen.width, screen.height);
        Self { vertex_buffer, texture }
    }

    pub fn texture_mut(&mut self) -> &mut QuadTexture {
        &mut self.texture
    }

    pub fn texture(&self) -> &QuadTexture {
        &self.texture
    }

    pub fn forget(&mut self) {
        self.vertex_buffer.forget();
        self.texture.forget();
    }

    pub fn draw(&self, gl: &dyn GlApi, program: &ObjProgram, mvp: &Mat4) {
        let draw = program.draw(
            mvp,
            self.texture.id(),
            self.vertex_buffer.id(),
            Primitive::Arrays { count: 6 },
        );
        gl.draw_textured(&draw);
        check_gl_error(gl, "DrawQuad");
    }
}

/// CPU-side target mesh: interleaved `x, y, z, u, v` vertices, `u16` indices
/// and an RGBA texture.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshData {
    pub vertices: Vec<f32>,
    pub indices: Vec<u16>,
    pub texture_rgba: Vec<u8>,
    pub texture_size: (i32, i32),
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / FLOATS_PER_VERTEX
    }

    fn validate(&self) -> Result<()> {
        if self.vertices.len() % FLOATS_PER_VERTEX != 0 {
            return Err(VrError::InvalidFrame(format!(
                "mesh has {} floats, not a multiple of {}",
                self.vertices.len(),
                FLOATS_PER_VERTEX
            )));
        }
        let count = self.vertex_count();
        if let Some(bad) = self.indices.iter().find(|&&i| i as usize >= count) {
            return Err(VrError::InvalidFrame(format!(
                "mesh index {} out of range for {} vertices",
                bad, count
            )));
        }
        let (w, h) = self.texture_size;
        let expected = w.max(0) as usize * h.max(0) as usize * 4;
        if self.texture_rgba.len() != expected || expected == 0 {
            return Err(VrError::InvalidFrame(format!(
                "mesh texture {}x{} needs {} bytes, got {}",
                w,
                h,
                expected,
                self.texture_rgba.len()
            )));
        }
        Ok(())
    }
}

/// GPU-resident target mesh
pub struct TargetMesh {
    vertex_buffer: GlObject,
    index_buffer: GlObject,
    texture: GlObject,
    index_count: i32,
}

impl TargetMesh {
    pub fn upload(gl: &Rc<dyn GlApi>, mesh: &MeshData) -> Result<Self> {
        mesh.validate()?;

        let vertex_buffer = GlObject::new(gl, GlObjectKind::Buffer);
        gl.buffer_data(vertex_buffer.id(), BufferTarget::Vertex, bytemuck::cast_slice(&mesh.vertices));

        let index_buffer = GlObject::new(gl, GlObjectKind::Buffer);
        gl.buffer_data(index_buffer.id(), BufferTarget::Index, bytemuck::cast_slice(&mesh.indices));

        let texture = GlObject::new(gl, GlObjectKind::Texture);
        let (w, h) = mesh.texture_size;
        gl.texture_image(texture.id(), PixelFormat::Rgba, w, h, Some(&mesh.texture_rgba));
        check_gl_error(gl.as_ref(), "TargetMesh");

        Ok(Self {
            vertex_buffer,
            index_buffer,
            texture,
            index_count: mesh.indices.len() as i32,
        })
    }

    pub fn forget(&mut self) {
        self.vertex_buffer.forget();
        self.index_buffer.forget();
        self.texture.forget();
    }

    pub fn draw(&self, gl: &dyn GlApi, program: &ObjProgram, mvp: &Mat4) {
        let draw = program.draw(
            mvp,
            self.texture.id(),
            self.vertex_buffer.id(),
            Primitive::Elements {
                index_buffer: self.index_buffer.id(),
                count: self.index_count,
            },
        );
        gl.draw_textured(&draw);
        check_gl_error(gl, "DrawTarget");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{GlCall, RecordingGl};

    fn recording() -> (Rc<RecordingGl>, Rc<dyn GlApi>) {
        let recorder = Rc::new(RecordingGl::new());
        let gl: Rc<dyn GlApi> = recorder.clone();
        (recorder, gl)
    }

    #[test]
    fn quad_spans_height_times_aspect() {
        let v = quad_vertices(0.25, 2.0);
        // bottom-left and top-right corners
        assert!((v[0] + 0.25).abs() < 1e-6);
        assert!((v[1] + 0.125).abs() < 1e-6);
        assert!((v[10] - 0.25).abs() < 1e-6);
        assert!((v[11] - 0.125).abs() < 1e-6);
        // every vertex on z = 0 with uv in the unit square
        for vertex in v.chunks(FLOATS_PER_VERTEX) {
            assert_eq!(vertex[2], 0.0);
            assert!((0.0..=1.0).contains(&vertex[3]));
            assert!((0.0..=1.0).contains(&vertex[4]));
        }
    }

    #[test]
    fn program_reports_link_failure() {
        let (recorder, gl) = recording();
        recorder.fail_next_link("missing main");
        match ObjProgram::new(&gl) {
            Err(VrError::ProgramLink(log)) => assert!(log.contains("missing main")),
            other => panic!("expected link error, got {:?}", other.err()),
        }
        assert_eq!(recorder.live_count(), 0);
    }

    #[test]
    fn placeholder_texture_is_opaque_white() {
        let (recorder, gl) = recording();
        let tex = QuadTexture::placeholder(&gl, 300, 168);
        assert_eq!(tex.size(), (300, 168));
        assert!(recorder.calls().contains(&GlCall::TextureImage {
            texture: tex.id(),
            format: PixelFormat::Rgba,
            width: 300,
            height: 168,
            with_pixels: true,
        }));
        assert_eq!(recorder.last_upload_len(), Some(300 * 168 * 4));
    }

    #[test]
    fn undersized_video_frame_is_rejected() {
        let (recorder, gl) = recording();
        let mut tex = QuadTexture::placeholder(&gl, 4, 4);
        recorder.clear_calls();

        let err = tex.upload(gl.as_ref(), &[0u8; 10], 2, 2).unwrap_err();
        assert!(matches!(err, VrError::InvalidFrame(_)));
        assert!(recorder.calls().is_empty());
        assert_eq!(tex.size(), (4, 4));

        tex.upload(gl.as_ref(), &[7u8; 16], 2, 2).unwrap();
        assert_eq!(tex.size(), (2, 2));
        assert_eq!(recorder.last_upload_len(), Some(16));
    }

    #[test]
    fn oversized_video_frame_is_rejected() {
        let (recorder, gl) = recording();
        let mut tex = QuadTexture::placeholder(&gl, 4, 4);
        recorder.clear_calls();

        let err = tex.upload(gl.as_ref(), &[0u8; 4 * 4 * 4 + 100], 4, 4).unwrap_err();
        assert!(matches!(err, VrError::InvalidFrame(_)));
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn mesh_with_out_of_range_index_is_rejected() {
        let (recorder, gl) = recording();
        let mesh = MeshData {
            vertices: vec![0.0; 3 * FLOATS_PER_VERTEX],
            indices: vec![0, 1, 3],
            texture_rgba: vec![255; 4],
            texture_size: (1, 1),
        };
        assert!(TargetMesh::upload(&gl, &mesh).is_err());
        assert_eq!(recorder.live_count(), 0);
    }

    #[test]
    fn target_mesh_draws_indexed() {
        let (recorder, gl) = recording();
        let program = ObjProgram::new(&gl).unwrap();
        let mesh = MeshData {
            vertices: vec![0.0; 4 * FLOATS_PER_VERTEX],
            indices: vec![0, 1, 2, 0, 2, 3],
            texture_rgba: vec![255; 4],
            texture_size: (1, 1),
        };
        let target = TargetMesh::upload(&gl, &mesh).unwrap();
        recorder.clear_calls();

        target.draw(gl.as_ref(), &program, &Mat4::IDENTITY);
        let draws = recorder.draws();
        assert_eq!(draws.len(), 1);
        assert!(matches!(draws[0].primitive, Primitive::Elements { count: 6, .. }));
        assert_eq!(draws[0].program, program.id());
    }
}
