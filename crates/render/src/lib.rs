//! Rendering adapter: the capability interface the scene drives.
//!
//! # Invariants
//! - Every handle is owned by exactly one caller; releasing it twice is a no-op.
//! - Uniform data is packed by [`UniformLayout`] (std140 rules) before it
//!   reaches a backend, so every backend sees identical bytes.
//! - Backends report errors through `Result` or [`Backend::take_error`]; they
//!   never panic on bad input.

mod backend;
mod geometry;
mod layout;
mod recording;
pub mod shaders;

pub use backend::{
    Backend, BackendError, BufferHandle, DrawUniforms, MeshHandle, ProgramHandle, TextureHandle,
};
pub use geometry::Geometry;
pub use layout::{FieldKind, FieldSpec, Slot, UniformBlock, UniformLayout};
pub use recording::{Call, RecordingBackend, ResourceKind};
