//! The scene: settings schema, GPU resource lifecycle and the frame loop.
//!
//! A [`Session`] mounts the settings store and panel, binds them to a
//! [`ResourceManager`] through change events, and drives the manager with
//! a fixed-timestep [`FrameLoop`].
//!
//! # Invariants
//! - GPU handles are owned by the `ResourceManager` alone; other code talks
//!   to it through settings snapshots.
//! - A settings change rebuilds only the resources that depend on it: light
//!   count drives the light buffer and monkey program, `refractColors` the
//!   program, `lowpoly`/`flatten` the monkey mesh, `skyboxTexture` a texture
//!   reload, and everything else is a uniform write.
//! - Any backend error halts the session until the next reload.
//! - Animation state never reaches the store.

pub mod actions;
pub mod animation;
pub mod bindings;
pub mod camera;
pub mod frame;
pub mod manager;
pub mod schema;
pub mod session;
pub mod settings;
pub mod skybox;

pub use actions::apply_camera;
pub use animation::Animation;
pub use bindings::bind;
pub use frame::{FrameHandler, FrameLoop, FrameOutcome, FrameReport, FrameTimer};
pub use manager::{Phase, ResourceManager, monkey_geometry};
pub use schema::scene_schema;
pub use session::{Session, SessionConfig};
pub use settings::SceneSettings;
pub use skybox::{SkyboxMethod, SkyboxSet, UnknownSkybox};
