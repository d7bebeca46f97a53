//! Developer tooling: read-only views of a settings store.
//!
//! # Invariants
//! - Inspection never commits; it only reads snapshots.

mod inspector;

pub use inspector::{Entry, StoreInspector, StoreSummary, flatten, render_value};
