//! Settings state: the authoritative tree behind the settings panel.
//!
//! # Invariants
//! - Every write recomputes only the spine from the scope root to the written path;
//!   untouched subtrees keep their reference, so "did it change" is a pointer compare.
//! - All mutations flow through `Scope::update_with` or a `Handle` terminal operation.
//! - Listeners of one dispatch pass all observe the same committed snapshot.

pub mod event;
pub mod handle;
pub mod list;
pub mod node;
pub mod scope;
pub mod store;
pub mod timer;

pub use event::{ChangeEvent, ListenerRegistry, Subscription};
pub use handle::{Draft, Handle, Root};
pub use list::{Bounds, ListElement, ScopedList};
pub use lumen_common::{ElementId, Key, Path};
pub use node::Node;
pub use scope::{Scope, ScopedSection, Updater};
pub use store::{MemoryPersistence, ObservableStore, PERSIST_DEBOUNCE, Persistence};
pub use timer::{Clock, Debouncer, ManualClock, SystemClock};

#[cfg(test)]
pub(crate) mod testing {
    use crate::{ManualClock, MemoryPersistence, Node, ObservableStore, Scope};
    use std::rc::Rc;

    pub fn open_store(persisted: Option<Node>) -> Rc<ObservableStore> {
        let persistence = match persisted {
            Some(snapshot) => MemoryPersistence::with_snapshot("test", snapshot),
            None => MemoryPersistence::new(),
        };
        ObservableStore::open("test", Rc::new(persistence), Rc::new(ManualClock::new()))
    }

    pub fn mount_store_with<R>(
        persisted: Option<Node>,
        build: impl FnOnce(&Rc<dyn Scope>) -> R,
    ) -> (Rc<ObservableStore>, R) {
        let store = open_store(persisted);
        let scope: Rc<dyn Scope> = store.clone();
        let built = build(&scope);
        store.finish_mount();
        (store, built)
    }

    pub fn mount_store<R>(build: impl FnOnce(&Rc<dyn Scope>) -> R) -> (Rc<ObservableStore>, R) {
        mount_store_with(None, build)
    }
}
