//! Shared identifiers used across the lumen workspace.
//!
//! # Invariants
//! - A `Path` is only meaningful relative to the scope that produced it.
//! - `ElementId`s are never reused within a process.

mod types;

pub use types::{ElementId, Key, Path};
