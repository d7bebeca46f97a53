//! Input mapped to high-level scene actions.
//!
//! # Invariants
//! - Hosts translate raw window events into [`Action`]s; nothing downstream
//!   sees raw events.
//! - Actions carry deltas, never absolute state, so applying one is a
//!   single store update.

pub mod action;
pub mod pointer;

pub use action::{Action, Axis};
pub use pointer::{PointerButton, PointerTracker};
