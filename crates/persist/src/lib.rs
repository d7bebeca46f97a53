//! Persistence: session key/value storage, JSON snapshots and presets.
//!
//! # Invariants
//! - A snapshot for namespace `ns` lives under the storage key `Option:<ns>`.
//! - Unreadable or malformed entries load as "nothing stored"; they never
//!   fail store initialization.
//! - Loading a preset overwrites the stored snapshot; it is picked up by the
//!   next mount, never patched into a live store.

pub mod presets;
pub mod session;
pub mod storage;

pub use presets::{DEFAULT_NAMESPACE, Preset, PresetError};
pub use session::{SessionPersistence, storage_key};
pub use storage::{FileStorage, MemoryStorage, SessionStorage, StorageError};
