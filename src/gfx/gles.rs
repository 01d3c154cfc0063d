//! OpenGL ES 2 implementation of `GlApi`
//!
//! Entry points come from `libGLESv2.so` via `dlopen`/`dlsym`; the GL context
//! itself is owned by the Java `GLSurfaceView` and is current on the calling
//! thread whenever the lifecycle callbacks run.

use std::ffi::{c_void, CString};
use std::ptr;

use gl::types::{GLchar, GLenum, GLint, GLsizei, GLuint};
use lazy_static::lazy_static;
use log::info;

use super::{BufferTarget, GlApi, GlId, GlObjectKind, PixelFormat, Primitive, TexturedDraw, Viewport};
use crate::error::{Result, VrError};

const GLES_LIBRARY: &str = "libGLESv2.so";
const VERTEX_STRIDE: GLsizei = 5 * std::mem::size_of::<f32>() as GLsizei;
const UV_OFFSET: usize = 3 * std::mem::size_of::<f32>();

lazy_static! {
    // Resolved once per process; GL function pointers are global in the gl crate.
    static ref GLES_LOADED: std::result::Result<(), String> = load_entry_points(GLES_LIBRARY);
}

fn load_entry_points(library: &str) -> std::result::Result<(), String> {
    let name = CString::new(library).map_err(|e| e.to_string())?;
    // Never closed: the resolved entry points live for the whole process.
    let handle = unsafe { libc::dlopen(name.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };
    if handle.is_null() {
        return Err(format!("dlopen({}) failed", library));
    }

    gl::load_with(|symbol| match CString::new(symbol) {
        Ok(symbol) => unsafe { libc::dlsym(handle, symbol.as_ptr()) as *const c_void },
        Err(_) => ptr::null(),
    });

    if !gl::CreateProgram::is_loaded() {
        return Err(format!("{} has no glCreateProgram", library));
    }
    info!("Loaded GL ES entry points from {}", library);
    Ok(())
}

/// Zero-sized handle to the current GL ES context
#[derive(Debug, Clone, Copy)]
pub struct Gles {
    _loaded: (),
}

impl Gles {
    /// Resolves the GL ES entry points on first use.
    pub fn load() -> Result<Self> {
        match &*GLES_LOADED {
            Ok(()) => Ok(Self { _loaded: () }),
            Err(e) => Err(VrError::GlLoad(e.clone())),
        }
    }
}

fn pixel_format(format: PixelFormat) -> GLenum {
    match format {
        PixelFormat::Rgb => gl::RGB,
        PixelFormat::Rgba => gl::RGBA,
    }
}

unsafe fn compile_shader(kind: GLenum, source: &str) -> Result<GLuint> {
    let stage = if kind == gl::VERTEX_SHADER { "vertex" } else { "fragment" };
    let src = CString::new(source).map_err(|e| VrError::ShaderCompile {
        stage,
        log: e.to_string(),
    })?;

    let shader = gl::CreateShader(kind);
    gl::ShaderSource(shader, 1, &src.as_ptr(), ptr::null());
    gl::CompileShader(shader);

    let mut status: GLint = 0;
    gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
    if status == 0 {
        let log = shader_log(shader);
        gl::DeleteShader(shader);
        return Err(VrError::ShaderCompile { stage, log });
    }
    Ok(shader)
}

unsafe fn shader_log(shader: GLuint) -> String {
    let mut len: GLint = 0;
    gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
    let mut buf = vec![0u8; len.max(1) as usize];
    gl::GetShaderInfoLog(shader, len, ptr::null_mut(), buf.as_mut_ptr() as *mut GLchar);
    String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string()
}

unsafe fn program_log(program: GLuint) -> String {
    let mut len: GLint = 0;
    gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
    let mut buf = vec![0u8; len.max(1) as usize];
    gl::GetProgramInfoLog(program, len, ptr::null_mut(), buf.as_mut_ptr() as *mut GLchar);
    String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string()
}

impl GlApi for Gles {
    fn create_object(&self, kind: GlObjectKind) -> GlId {
        let mut id: GLuint = 0;
        unsafe {
            match kind {
                GlObjectKind::Texture => gl::GenTextures(1, &mut id),
                GlObjectKind::Framebuffer => gl::GenFramebuffers(1, &mut id),
                GlObjectKind::Renderbuffer => gl::GenRenderbuffers(1, &mut id),
                GlObjectKind::Buffer => gl::GenBuffers(1, &mut id),
                GlObjectKind::Program => id = gl::CreateProgram(),
            }
        }
        id
    }

    fn delete_object(&self, kind: GlObjectKind, id: GlId) {
        unsafe {
            match kind {
                GlObjectKind::Texture => gl::DeleteTextures(1, &id),
                GlObjectKind::Framebuffer => gl::DeleteFramebuffers(1, &id),
                GlObjectKind::Renderbuffer => gl::DeleteRenderbuffers(1, &id),
                GlObjectKind::Buffer => gl::DeleteBuffers(1, &id),
                GlObjectKind::Program => gl::DeleteProgram(id),
            }
        }
    }

    fn texture_image(&self, texture: GlId, format: PixelFormat, width: i32, height: i32, pixels: Option<&[u8]>) {
        let format = pixel_format(format);
        let data = pixels.map_or(ptr::null(), |p| p.as_ptr() as *const c_void);
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as GLint);
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                format as GLint,
                width,
                height,
                0,
                format,
                gl::UNSIGNED_BYTE,
                data,
            );
            gl::BindTexture(gl::TEXTURE_2D, 0);
        }
    }

    fn depth_storage(&self, renderbuffer: GlId, width: i32, height: i32) {
        unsafe {
            gl::BindRenderbuffer(gl::RENDERBUFFER, renderbuffer);
            gl::RenderbufferStorage(gl::RENDERBUFFER, gl::DEPTH_COMPONENT16, width, height);
        }
    }

    fn attach_render_target(&self, framebuffer: GlId, color_texture: GlId, depth_renderbuffer: GlId) {
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, framebuffer);
            gl::FramebufferTexture2D(gl::FRAMEBUFFER, gl::COLOR_ATTACHMENT0, gl::TEXTURE_2D, color_texture, 0);
            gl::FramebufferRenderbuffer(
                gl::FRAMEBUFFER,
                gl::DEPTH_ATTACHMENT,
                gl::RENDERBUFFER,
                depth_renderbuffer,
            );
        }
    }

    fn buffer_data(&self, buffer: GlId, target: BufferTarget, data: &[u8]) {
        let target = match target {
            BufferTarget::Vertex => gl::ARRAY_BUFFER,
            BufferTarget::Index => gl::ELEMENT_ARRAY_BUFFER,
        };
        unsafe {
            gl::BindBuffer(target, buffer);
            gl::BufferData(
                target,
                data.len() as gl::types::GLsizeiptr,
                data.as_ptr() as *const c_void,
                gl::STATIC_DRAW,
            );
            gl::BindBuffer(target, 0);
        }
    }

    fn link_program(&self, vertex_src: &str, fragment_src: &str) -> Result<GlId> {
        unsafe {
            let vs = compile_shader(gl::VERTEX_SHADER, vertex_src)?;
            let fs = match compile_shader(gl::FRAGMENT_SHADER, fragment_src) {
                Ok(fs) => fs,
                Err(e) => {
                    gl::DeleteShader(vs);
                    return Err(e);
                }
            };

            let program = gl::CreateProgram();
            gl::AttachShader(program, vs);
            gl::AttachShader(program, fs);
            gl::LinkProgram(program);
            // Shaders are only flagged; they go away with the program.
            gl::DeleteShader(vs);
            gl::DeleteShader(fs);

            let mut status: GLint = 0;
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
            if status == 0 {
                let log = program_log(program);
                gl::DeleteProgram(program);
                return Err(VrError::ProgramLink(log));
            }
            Ok(program)
        }
    }

    fn attrib_location(&self, program: GlId, name: &str) -> i32 {
        match CString::new(name) {
            Ok(name) => unsafe { gl::GetAttribLocation(program, name.as_ptr()) },
            Err(_) => -1,
        }
    }

    fn uniform_location(&self, program: GlId, name: &str) -> i32 {
        match CString::new(name) {
            Ok(name) => unsafe { gl::GetUniformLocation(program, name.as_ptr()) },
            Err(_) => -1,
        }
    }

    fn bind_framebuffer(&self, framebuffer: GlId) {
        unsafe { gl::BindFramebuffer(gl::FRAMEBUFFER, framebuffer) };
    }

    fn begin_frame(&self, clear_color: [f32; 4]) {
        unsafe {
            gl::Enable(gl::DEPTH_TEST);
            gl::Enable(gl::CULL_FACE);
            gl::Disable(gl::SCISSOR_TEST);
            gl::Enable(gl::BLEND);
            gl::BlendFunc(gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA);
            gl::ClearColor(clear_color[0], clear_color[1], clear_color[2], clear_color[3]);
            gl::Clear(gl::COLOR_BUFFER_BIT | gl::DEPTH_BUFFER_BIT);
        }
    }

    fn viewport(&self, viewport: Viewport) {
        unsafe { gl::Viewport(viewport.x, viewport.y, viewport.width, viewport.height) };
    }

    fn draw_textured(&self, draw: &TexturedDraw) {
        unsafe {
            gl::UseProgram(draw.program);
            gl::UniformMatrix4fv(draw.mvp_location, 1, gl::FALSE, draw.mvp.as_ptr());

            gl::ActiveTexture(gl::TEXTURE0);
            gl::BindTexture(gl::TEXTURE_2D, draw.texture);
            gl::BindBuffer(gl::ARRAY_BUFFER, draw.vertex_buffer);

            let position = draw.position_attrib as GLuint;
            gl::EnableVertexAttribArray(position);
            gl::VertexAttribPointer(position, 3, gl::FLOAT, gl::FALSE, VERTEX_STRIDE, ptr::null());

            let uv = draw.uv_attrib as GLuint;
            gl::EnableVertexAttribArray(uv);
            gl::VertexAttribPointer(uv, 2, gl::FLOAT, gl::FALSE, VERTEX_STRIDE, UV_OFFSET as *const c_void);

            match draw.primitive {
                Primitive::Arrays { count } => gl::DrawArrays(gl::TRIANGLES, 0, count),
                Primitive::Elements { index_buffer, count } => {
                    gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, index_buffer);
                    gl::DrawElements(gl::TRIANGLES, count, gl::UNSIGNED_SHORT, ptr::null());
                    gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, 0);
                }
            }

            gl::DisableVertexAttribArray(position);
            gl::DisableVertexAttribArray(uv);
            gl::BindBuffer(gl::ARRAY_BUFFER, 0);
        }
    }

    fn error(&self) -> Option<u32> {
        let code = unsafe { gl::GetError() };
        if code == gl::NO_ERROR {
            None
        } else {
            Some(code)
        }
    }
}
