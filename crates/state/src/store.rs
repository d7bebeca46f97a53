use crate::event::ListenerRegistry;
use crate::node::Node;
use crate::scope::{Scope, Updater};
use crate::timer::{Clock, Debouncer};
use lumen_common::Path;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Quiet period after the last commit before the snapshot is written out.
pub const PERSIST_DEBOUNCE: Duration = Duration::from_millis(250);

/// Session-scoped snapshot storage, keyed by store namespace.
pub trait Persistence {
    /// The stored snapshot, or `None` when there is none or it is unreadable.
    fn load(&self, namespace: &str) -> Option<Node>;
    fn save(&self, namespace: &str, snapshot: &Node);
    fn clear(&self, namespace: &str);
}

/// Keeps snapshots in memory for the lifetime of the process.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    snapshots: RefCell<HashMap<String, Node>>,
    saves: Cell<usize>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_snapshot(namespace: &str, snapshot: Node) -> Self {
        let persistence = Self::default();
        persistence
            .snapshots
            .borrow_mut()
            .insert(namespace.to_owned(), snapshot);
        persistence
    }

    /// Number of `save` calls so far.
    pub fn saves(&self) -> usize {
        self.saves.get()
    }
}

impl Persistence for MemoryPersistence {
    fn load(&self, namespace: &str) -> Option<Node> {
        self.snapshots.borrow().get(namespace).cloned()
    }

    fn save(&self, namespace: &str, snapshot: &Node) {
        self.saves.set(self.saves.get() + 1);
        self.snapshots
            .borrow_mut()
            .insert(namespace.to_owned(), snapshot.clone());
    }

    fn clear(&self, namespace: &str) {
        self.snapshots.borrow_mut().remove(namespace);
    }
}

/// The root of a settings tree.
///
/// Holds the committed snapshot plus, until the ready transition, the
/// initial buffer that mounting code registers defaults into. Every commit
/// bumps the revision, notifies listeners and re-arms the persistence
/// debounce; the host drives the debounce by calling [`ObservableStore::poll`].
pub struct ObservableStore {
    namespace: String,
    state: RefCell<Node>,
    initial: RefCell<Option<Node>>,
    revision: Cell<u64>,
    persistence: Rc<dyn Persistence>,
    clock: Rc<dyn Clock>,
    debounce: RefCell<Debouncer>,
    registry: Rc<ListenerRegistry>,
    reload_requested: Cell<bool>,
}

impl ObservableStore {
    /// Load the persisted snapshot for `namespace` (or `{}`) and return a
    /// store that is not ready yet.
    pub fn open(
        namespace: impl Into<String>,
        persistence: Rc<dyn Persistence>,
        clock: Rc<dyn Clock>,
    ) -> Rc<Self> {
        let namespace = namespace.into();
        let loaded = match persistence.load(&namespace) {
            Some(node @ Node::Map(_)) => node,
            Some(other) => {
                warn!(%namespace, kind = other.kind(), "persisted snapshot is not an object, starting empty");
                Node::empty_map()
            }
            None => Node::empty_map(),
        };
        debug!(%namespace, entries = loaded.len(), "store opened");
        Rc::new(Self {
            namespace,
            state: RefCell::new(loaded.clone()),
            initial: RefCell::new(Some(loaded)),
            revision: Cell::new(0),
            persistence,
            clock,
            debounce: RefCell::new(Debouncer::new(PERSIST_DEBOUNCE)),
            registry: Rc::new(ListenerRegistry::new()),
            reload_requested: Cell::new(false),
        })
    }

    /// Open a store, let `build` mount everything below it, then perform
    /// the ready transition.
    pub fn mount<R>(
        namespace: impl Into<String>,
        persistence: Rc<dyn Persistence>,
        clock: Rc<dyn Clock>,
        build: impl FnOnce(&Rc<dyn Scope>) -> R,
    ) -> (Rc<Self>, R) {
        let store = Self::open(namespace, persistence, clock);
        let scope: Rc<dyn Scope> = store.clone();
        let built = build(&scope);
        store.finish_mount();
        (store, built)
    }

    /// The ready transition: commit the initial buffer as the first real
    /// state. Only the first call has any effect.
    pub fn finish_mount(&self) {
        let Some(initial) = self.initial.borrow_mut().take() else {
            return;
        };
        *self.state.borrow_mut() = initial;
        self.bump();
        info!(namespace = %self.namespace, revision = self.revision(), "store ready");
        self.registry.dispatch();
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Number of commits so far, including the ready transition.
    pub fn revision(&self) -> u64 {
        self.revision.get()
    }

    pub fn persist_pending(&self) -> bool {
        self.debounce.borrow().is_pending()
    }

    /// Write the snapshot out if the debounce deadline has passed. Returns
    /// whether a write happened.
    pub fn poll(&self) -> bool {
        let due = self.debounce.borrow_mut().fire_due(self.clock.now());
        if due {
            self.write_through();
        }
        due
    }

    /// Write a pending snapshot out now.
    pub fn flush(&self) -> bool {
        if !self.persist_pending() {
            return false;
        }
        self.debounce.borrow_mut().cancel();
        self.write_through();
        true
    }

    /// Drop a pending write without performing it.
    pub fn cancel_pending_write(&self) -> bool {
        let mut debounce = self.debounce.borrow_mut();
        let pending = debounce.is_pending();
        debounce.cancel();
        pending
    }

    /// Forget the persisted snapshot and ask the host to rebuild everything.
    /// A pending write is dropped so it cannot resurrect the old state.
    pub fn reset(&self) {
        self.cancel_pending_write();
        self.persistence.clear(&self.namespace);
        info!(namespace = %self.namespace, "store reset, reload requested");
        self.request_reload();
    }

    pub fn request_reload(&self) {
        self.reload_requested.set(true);
    }

    /// Whether the host should drop this store and mount a fresh one.
    pub fn reload_requested(&self) -> bool {
        self.reload_requested.get()
    }

    fn write_through(&self) {
        let snapshot = self.state.borrow().clone();
        self.persistence.save(&self.namespace, &snapshot);
        debug!(namespace = %self.namespace, revision = self.revision(), "snapshot persisted");
    }

    fn bump(&self) {
        self.revision.set(self.revision.get() + 1);
        self.debounce.borrow_mut().schedule(self.clock.now());
    }
}

impl Scope for ObservableStore {
    fn state(&self) -> Node {
        self.state.borrow().clone()
    }

    fn ready(&self) -> bool {
        self.initial.borrow().is_none()
    }

    fn update_with(&self, init: bool, updater: Updater<'_>) -> bool {
        let buffered = self.initial.borrow().clone();
        if let Some(current) = buffered {
            // Nothing is visible before the ready transition, so every write
            // lands in the initial buffer.
            if !init {
                debug!(namespace = %self.namespace, "update before ready buffered");
            }
            let next = updater(current.clone());
            let changed = !next.same(&current);
            *self.initial.borrow_mut() = Some(next);
            return changed;
        }

        let current = self.state();
        let next = updater(current.clone());
        if next.same(&current) {
            return false;
        }
        *self.state.borrow_mut() = next;
        self.bump();
        debug!(namespace = %self.namespace, revision = self.revision(), "commit");
        self.registry.dispatch();
        true
    }

    fn path(&self) -> Option<Path> {
        Some(Path::root())
    }

    fn registry(&self) -> Rc<ListenerRegistry> {
        Rc::clone(&self.registry)
    }
}

impl Drop for ObservableStore {
    fn drop(&mut self) {
        let debounce = self.debounce.get_mut();
        if debounce.is_pending() {
            debug!(namespace = %self.namespace, "store dropped with a pending write, cancelled");
        }
        debounce.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::ScopedSection;
    use crate::timer::ManualClock;

    const NS: &str = "PG6201Config";

    fn open(persistence: &Rc<MemoryPersistence>, clock: &Rc<ManualClock>) -> Rc<ObservableStore> {
        let persistence: Rc<dyn Persistence> = persistence.clone();
        let clock: Rc<dyn Clock> = clock.clone();
        ObservableStore::open(NS, persistence, clock)
    }

    #[test]
    fn starts_from_persisted_snapshot() {
        let persistence = Rc::new(MemoryPersistence::with_snapshot(
            NS,
            Node::map([("x", Node::from(1.0))]),
        ));
        let clock = Rc::new(ManualClock::new());
        let store = open(&persistence, &clock);
        assert!(!store.ready());
        assert_eq!(store.state().field("x"), Some(&Node::from(1.0)));
    }

    #[test]
    fn non_object_snapshot_falls_back_to_empty() {
        let persistence = Rc::new(MemoryPersistence::with_snapshot(NS, Node::from(3.0)));
        let clock = Rc::new(ManualClock::new());
        let store = open(&persistence, &clock);
        assert_eq!(store.state(), Node::empty_map());
    }

    #[test]
    fn ready_transition_commits_initial_buffer() {
        let persistence = Rc::new(MemoryPersistence::new());
        let clock = Rc::new(ManualClock::new());
        let store = open(&persistence, &clock);
        let scope: Rc<dyn Scope> = store.clone();

        scope.register_default("fov", 45.0);
        assert_eq!(store.state().field("fov"), None);
        assert_eq!(store.revision(), 0);

        store.finish_mount();
        assert!(store.ready());
        assert_eq!(store.revision(), 1);
        assert_eq!(store.state().field("fov"), Some(&Node::from(45.0)));
    }

    #[test]
    fn rapid_commits_coalesce_into_one_write() {
        let persistence = Rc::new(MemoryPersistence::new());
        let clock = Rc::new(ManualClock::new());
        let store = open(&persistence, &clock);
        store.finish_mount();
        let scope: Rc<dyn Scope> = store.clone();

        for i in 0..5 {
            scope.at("n").set(i as f64);
            clock.advance(Duration::from_millis(100));
            assert!(!store.poll());
        }
        assert_eq!(persistence.saves(), 0);

        clock.advance(Duration::from_millis(150));
        assert!(store.poll());
        assert!(!store.poll());
        assert_eq!(persistence.saves(), 1);
        assert_eq!(
            persistence.load(NS).and_then(|s| s.field("n").cloned()),
            Some(Node::from(4.0))
        );
    }

    #[test]
    fn reset_clears_and_requests_reload() {
        let persistence = Rc::new(MemoryPersistence::with_snapshot(
            NS,
            Node::map([("x", Node::from(1.0))]),
        ));
        let clock = Rc::new(ManualClock::new());
        let store = open(&persistence, &clock);
        store.finish_mount();
        assert!(store.persist_pending());

        store.reset();
        assert!(store.reload_requested());
        assert!(persistence.load(NS).is_none());
        // The cancelled write must not bring the old state back.
        clock.advance(Duration::from_secs(1));
        assert!(!store.poll());
        assert!(persistence.load(NS).is_none());
    }

    #[test]
    fn flush_writes_immediately() {
        let persistence = Rc::new(MemoryPersistence::new());
        let clock = Rc::new(ManualClock::new());
        let store = open(&persistence, &clock);
        store.finish_mount();
        assert!(store.flush());
        assert!(!store.flush());
        assert_eq!(persistence.saves(), 1);
    }

    #[test]
    fn snapshot_survives_a_remount() {
        let persistence = Rc::new(MemoryPersistence::new());
        let clock = Rc::new(ManualClock::new());
        let build = |root: &Rc<dyn Scope>| {
            ScopedSection::mount(root, "camera", |s| {
                s.register_default("fov", 45.0);
            })
        };
        let (store, _) = ObservableStore::mount(NS, persistence.clone(), clock.clone(), build);
        let root: Rc<dyn Scope> = store.clone();
        root.at("camera").at("fov").set(70.0);
        let before = store.state();
        assert!(store.flush());
        drop(root);
        drop(store);

        let (store, _) = ObservableStore::mount(NS, persistence, clock, build);
        assert_eq!(store.state(), before);
    }

    #[test]
    fn update_reports_no_change_for_same_reference() {
        let persistence = Rc::new(MemoryPersistence::new());
        let clock = Rc::new(ManualClock::new());
        let store = open(&persistence, &clock);
        store.finish_mount();
        let scope: Rc<dyn Scope> = store.clone();
        let before = store.revision();
        assert!(!scope.update(|s| s));
        assert_eq!(store.revision(), before);
    }
}
