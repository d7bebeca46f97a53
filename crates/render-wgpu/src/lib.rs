//! wgpu backend for the lumen renderer.
//!
//! All programs share one bind group layout (see `lumen_render::shaders`).
//! Draws are collected between `begin_frame` and `end_frame` and encoded
//! into a single render pass that clears colour and depth.
//!
//! # Invariants
//! - Depth is `Depth32Float` compared with `LessEqual`, so the skybox drawn
//!   at the far plane survives the depth clear.
//! - Cubemap images decode on a loader thread; the texture behind a handle
//!   is swapped on the render thread at the next `begin_frame`.

mod cubemap;
mod gpu;

pub use cubemap::{LoadError, decode_faces};
pub use gpu::WgpuBackend;
