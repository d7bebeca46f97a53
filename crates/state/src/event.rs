use crate::node::Node;
use crate::scope::Scope;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::trace;

type ReadyFn = Box<dyn FnMut(&Node)>;
type ChangeFn = Box<dyn FnMut(&Node, &Node)>;

/// Ready/change notifications for one scope.
///
/// `on_ready` fires once, the first time the scope is seen ready. After
/// that `on_change` fires for every commit that gives the scope a new
/// reference, with the current and previous state. Both never fire for the
/// same commit.
#[derive(Default)]
pub struct ChangeEvent {
    on_ready: Option<ReadyFn>,
    on_change: Option<ChangeFn>,
}

impl ChangeEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_ready(mut self, f: impl FnMut(&Node) + 'static) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }

    pub fn on_change(mut self, f: impl FnMut(&Node, &Node) + 'static) -> Self {
        self.on_change = Some(Box::new(f));
        self
    }

    /// Start listening. A scope that is already ready gets its `on_ready`
    /// right away.
    pub fn attach(self, scope: &Rc<dyn Scope>) -> Subscription {
        let registry = scope.registry();
        let id = registry.insert(Entry {
            scope: Rc::downgrade(scope),
            prev_ready: false,
            prev_state: Node::Null,
            on_ready: self.on_ready,
            on_change: self.on_change,
        });
        if scope.ready() {
            registry.dispatch();
        }
        Subscription {
            registry: Rc::downgrade(&registry),
            id,
        }
    }
}

/// Keeps a listener registered. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    registry: Weak<ListenerRegistry>,
    id: u64,
}

impl Subscription {
    pub fn is_active(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

struct Entry {
    scope: Weak<dyn Scope>,
    prev_ready: bool,
    prev_state: Node,
    on_ready: Option<ReadyFn>,
    on_change: Option<ChangeFn>,
}

impl Entry {
    fn notify(&mut self, ready: bool, state: Node) {
        if ready {
            if !self.prev_ready {
                if let Some(f) = self.on_ready.as_mut() {
                    f(&state);
                }
            } else if !state.same(&self.prev_state) {
                if let Some(f) = self.on_change.as_mut() {
                    f(&state, &self.prev_state);
                }
            }
        }
        self.prev_ready = ready;
        self.prev_state = state;
    }
}

struct Slot {
    id: u64,
    entry: Rc<RefCell<Entry>>,
}

/// Every listener of one store tree.
///
/// A dispatch pass first captures `(ready, state)` for all listeners and
/// only then runs callbacks, so every listener observes the same commit.
/// Commits made from inside a callback schedule another pass instead of
/// recursing.
#[derive(Default)]
pub struct ListenerRegistry {
    slots: RefCell<Vec<Slot>>,
    next_id: Cell<u64>,
    dispatching: Cell<bool>,
    pending: Cell<bool>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, entry: Entry) -> u64 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.slots.borrow_mut().push(Slot {
            id,
            entry: Rc::new(RefCell::new(entry)),
        });
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.slots.borrow_mut().retain(|slot| slot.id != id);
    }

    pub fn contains(&self, id: u64) -> bool {
        self.slots.borrow().iter().any(|slot| slot.id == id)
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// Notify listeners whose scope changed since they last looked.
    pub fn dispatch(&self) {
        if self.dispatching.replace(true) {
            self.pending.set(true);
            return;
        }
        let mut passes = 0u32;
        loop {
            self.pending.set(false);
            self.pass();
            passes += 1;
            if !self.pending.get() {
                break;
            }
        }
        self.dispatching.set(false);
        trace!(passes, listeners = self.len(), "dispatch finished");
    }

    fn pass(&self) {
        let slots: Vec<(u64, Rc<RefCell<Entry>>)> = self
            .slots
            .borrow()
            .iter()
            .map(|slot| (slot.id, Rc::clone(&slot.entry)))
            .collect();

        let mut observed = Vec::with_capacity(slots.len());
        let mut stale = Vec::new();
        for (id, entry) in slots {
            let scope = entry.borrow().scope.upgrade();
            match scope {
                Some(scope) if scope.path().is_some() => {
                    observed.push((entry, scope.ready(), scope.state()));
                }
                _ => stale.push(id),
            }
        }
        if !stale.is_empty() {
            trace!(count = stale.len(), "pruning detached listeners");
            self.slots
                .borrow_mut()
                .retain(|slot| !stale.contains(&slot.id));
        }

        for (entry, ready, state) in observed {
            entry.borrow_mut().notify(ready, state);
        }
    }
}
