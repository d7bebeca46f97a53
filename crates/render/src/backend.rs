use crate::geometry::Geometry;
use crate::layout::UniformLayout;
use glam::Mat4;
use std::fmt;
use std::path::PathBuf;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

handle!(
    /// A uniform buffer bound at a fixed binding point.
    BufferHandle,
    "buffer"
);
handle!(
    /// A linked vertex + fragment program.
    ProgramHandle,
    "program"
);
handle!(
    /// Uploaded vertex and index data.
    MeshHandle,
    "mesh"
);
handle!(
    /// A six-face cube texture.
    TextureHandle,
    "texture"
);

/// Errors a backend can report. The first five mirror the GL error codes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    #[error("INVALID_ENUM")]
    InvalidEnum,
    #[error("INVALID_VALUE")]
    InvalidValue,
    #[error("INVALID_OPERATION")]
    InvalidOperation,
    #[error("INVALID_FRAMEBUFFER_OPERATION")]
    InvalidFramebufferOperation,
    #[error("OUT_OF_MEMORY")]
    OutOfMemory,
    #[error("{0}")]
    Unknown(u32),
    #[error("shader compilation failed: {0}")]
    ShaderCompile(String),
    #[error("missing resource: {0}")]
    MissingResource(String),
}

impl BackendError {
    /// GL-style numeric code.
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidEnum => 0x0500,
            Self::InvalidValue => 0x0501,
            Self::InvalidOperation | Self::ShaderCompile(_) | Self::MissingResource(_) => 0x0502,
            Self::OutOfMemory => 0x0505,
            Self::InvalidFramebufferOperation => 0x0506,
            Self::Unknown(code) => *code,
        }
    }

    pub fn from_code(code: u32) -> Self {
        match code {
            0x0500 => Self::InvalidEnum,
            0x0501 => Self::InvalidValue,
            0x0502 => Self::InvalidOperation,
            0x0505 => Self::OutOfMemory,
            0x0506 => Self::InvalidFramebufferOperation,
            other => Self::Unknown(other),
        }
    }
}

/// Per-draw values that are not part of a shared uniform buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawUniforms {
    pub model: Mat4,
    pub texture: Option<TextureHandle>,
}

impl Default for DrawUniforms {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            texture: None,
        }
    }
}

/// The capability set the scene needs from a graphics API.
///
/// Shader sources are WGSL with the bind group layout described in
/// [`crate::shaders`]. A frame is `begin_frame`, any number of
/// `draw_indexed`, then `end_frame`; afterwards the caller polls
/// [`Backend::take_error`] for anything raised asynchronously.
pub trait Backend {
    fn create_uniform_buffer(
        &mut self,
        binding: u32,
        layout: &UniformLayout,
    ) -> Result<BufferHandle, BackendError>;

    /// Replace the contents of a buffer. `bytes` may be shorter than the buffer.
    fn write_uniform_buffer(&mut self, buffer: BufferHandle, bytes: &[u8])
    -> Result<(), BackendError>;

    fn release_buffer(&mut self, buffer: BufferHandle);

    fn create_program(&mut self, vertex: &str, fragment: &str)
    -> Result<ProgramHandle, BackendError>;

    fn release_program(&mut self, program: ProgramHandle);

    fn create_mesh(&mut self, geometry: &Geometry) -> Result<MeshHandle, BackendError>;

    fn release_mesh(&mut self, mesh: MeshHandle);

    /// A cube texture with placeholder contents.
    fn create_cubemap_texture(&mut self) -> Result<TextureHandle, BackendError>;

    /// Start loading six face images (+x, -x, +y, -y, +z, -z) into `texture`.
    /// Loading may finish later; until then draws sample the old contents.
    fn load_cubemap_texture(
        &mut self,
        texture: TextureHandle,
        faces: &[PathBuf; 6],
    ) -> Result<(), BackendError>;

    fn release_texture(&mut self, texture: TextureHandle);

    fn begin_frame(&mut self) -> Result<(), BackendError>;

    fn draw_indexed(
        &mut self,
        mesh: MeshHandle,
        program: ProgramHandle,
        uniforms: &DrawUniforms,
    ) -> Result<(), BackendError>;

    fn end_frame(&mut self) -> Result<(), BackendError>;

    /// The oldest error raised outside a `Result`, if any.
    fn take_error(&mut self) -> Option<BackendError>;
}
