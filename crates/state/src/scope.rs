use crate::event::ListenerRegistry;
use crate::handle::{Handle, Root};
use crate::node::Node;
use lumen_common::{ElementId, Key, Path};
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

/// Produces the next value of a scope from its current one.
pub type Updater<'a> = Box<dyn FnOnce(Node) -> Node + 'a>;

/// A `{state, ready, update}` triple rooted somewhere in the tree.
///
/// The root store and every section or list below it implement this, so
/// code that registers defaults, reads values or listens for changes works
/// the same at any depth.
pub trait Scope {
    /// Current value of this scope. Before the scope is flushed into its
    /// parent this is the locally buffered initial value.
    fn state(&self) -> Node;

    /// Whether the ready transition has happened for this scope.
    fn ready(&self) -> bool;

    /// Apply `updater` to this scope's value.
    ///
    /// With `init` set and the scope not yet ready, the write lands in the
    /// nearest initial buffer instead of being committed. Ready scopes treat
    /// `init` writes as ordinary updates. Returns whether anything changed.
    fn update_with(&self, init: bool, updater: Updater<'_>) -> bool;

    /// Absolute path from the root store, or `None` once the scope has been
    /// detached (a list element that was removed).
    fn path(&self) -> Option<Path>;

    /// Listener registry shared by the whole store tree.
    fn registry(&self) -> Rc<ListenerRegistry>;
}

impl<'s> dyn Scope + 's {
    pub fn update(&self, updater: impl FnOnce(Node) -> Node) -> bool {
        self.update_with(false, Box::new(updater))
    }

    pub fn update_init(&self, updater: impl FnOnce(Node) -> Node) -> bool {
        self.update_with(true, Box::new(updater))
    }

    /// Register `value` under `key` unless a value (for example a persisted
    /// one) is already there.
    pub fn register_default(&self, key: impl Into<Key>, value: impl Into<Node>) -> bool {
        let key = key.into();
        let value = value.into();
        self.update_init(move |state| {
            if state.get(&key).is_some() {
                state
            } else {
                state.with(&key, Some(value))
            }
        })
    }

    pub fn handle(&self) -> Handle<'_, dyn Scope + 's> {
        Handle::new(self, Path::root())
    }

    pub fn at(&self, key: impl Into<Key>) -> Handle<'_, dyn Scope + 's> {
        self.handle().at(key)
    }

    /// Current value under `key`.
    pub fn get(&self, key: impl Into<Key>) -> Option<Node> {
        self.state().get(&key.into()).cloned()
    }
}

impl<'s> Root for dyn Scope + 's {
    fn snapshot(&self) -> Node {
        self.state()
    }

    fn modify(&self, edit: Updater<'_>) -> bool {
        self.update_with(false, edit)
    }
}

/// Apply `updater` to `parent[key]` and write it back only if it changed.
/// A missing child is presented to the updater as `placeholder()`.
pub(crate) fn replace_child(
    parent: Node,
    key: &Key,
    updater: Updater<'_>,
    placeholder: fn() -> Node,
) -> Node {
    let base = parent.get(key).cloned().unwrap_or_else(placeholder);
    let next = updater(base.clone());
    if next.same(&base) {
        parent
    } else {
        parent.with(key, Some(next))
    }
}

/// Implemented by lists so their elements can find their current index
/// without holding the list strongly.
pub(crate) trait ElementParent {
    fn index_of(&self, id: ElementId) -> Option<usize>;
    fn as_scope(&self) -> &dyn Scope;
}

enum Anchor {
    Named { parent: Rc<dyn Scope>, key: Key },
    Element { list: Weak<dyn ElementParent>, id: ElementId },
}

/// A child scope rooted at one key of its parent.
///
/// Owns no data once flushed: reads and writes resolve through the parent.
/// Until then, default registrations accumulate in a local buffer that is
/// written into the parent in a single update when mounting finishes.
pub struct ScopedSection {
    anchor: Anchor,
    initial: RefCell<Node>,
    flushed: Cell<bool>,
    registry: Rc<ListenerRegistry>,
}

impl ScopedSection {
    /// Mount a section at `parent[key]`. `build` runs with the section's
    /// scope before it is flushed, so defaults registered there reach the
    /// parent together.
    pub fn mount<R>(
        parent: &Rc<dyn Scope>,
        key: impl Into<Key>,
        build: impl FnOnce(&Rc<dyn Scope>) -> R,
    ) -> (Rc<Self>, R) {
        let key = key.into();
        let seed = seed_map(parent.state().get(&key));
        let registry = parent.registry();
        let anchor = Anchor::Named {
            parent: Rc::clone(parent),
            key,
        };
        Self::mount_with(anchor, seed, registry, build)
    }

    pub(crate) fn mount_element<R>(
        list: Weak<dyn ElementParent>,
        id: ElementId,
        seed: Option<&Node>,
        registry: Rc<ListenerRegistry>,
        build: impl FnOnce(&Rc<dyn Scope>) -> R,
    ) -> (Rc<Self>, R) {
        Self::mount_with(Anchor::Element { list, id }, seed_map(seed), registry, build)
    }

    fn mount_with<R>(
        anchor: Anchor,
        seed: Node,
        registry: Rc<ListenerRegistry>,
        build: impl FnOnce(&Rc<dyn Scope>) -> R,
    ) -> (Rc<Self>, R) {
        let section = Rc::new(Self {
            anchor,
            initial: RefCell::new(seed),
            flushed: Cell::new(false),
            registry,
        });
        let scope: Rc<dyn Scope> = section.clone();
        let built = build(&scope);
        section.flush();
        (section, built)
    }

    /// The key this section currently lives under.
    pub fn key(&self) -> Option<Key> {
        match &self.anchor {
            Anchor::Named { key, .. } => Some(key.clone()),
            Anchor::Element { list, id } => list.upgrade()?.index_of(*id).map(Key::Index),
        }
    }

    fn flush(&self) {
        if self.flushed.replace(true) {
            return;
        }
        let buffered = self.initial.take();
        trace!(path = ?self.path().map(|p| p.to_string()), "section flushed");
        self.write_parent(true, Box::new(move |_: Node| buffered));
    }

    fn write_parent(&self, init: bool, updater: Updater<'_>) -> bool {
        match &self.anchor {
            Anchor::Named { parent, key } => parent.update_with(
                init,
                Box::new(move |state: Node| replace_child(state, key, updater, Node::empty_map)),
            ),
            Anchor::Element { list, id } => {
                let Some(list) = list.upgrade() else {
                    return false;
                };
                let Some(index) = list.index_of(*id) else {
                    debug!("write to a detached list element ignored");
                    return false;
                };
                let key = Key::Index(index);
                list.as_scope().update_with(
                    init,
                    Box::new(move |state: Node| {
                        replace_child(state, &key, updater, Node::empty_map)
                    }),
                )
            }
        }
    }
}

impl Scope for ScopedSection {
    fn state(&self) -> Node {
        if !self.flushed.get() {
            return self.initial.borrow().clone();
        }
        match &self.anchor {
            Anchor::Named { parent, key } => parent.state().get(key).cloned().unwrap_or_default(),
            Anchor::Element { list, id } => list
                .upgrade()
                .and_then(|list| {
                    let index = list.index_of(*id)?;
                    list.as_scope().state().get(&Key::Index(index)).cloned()
                })
                .unwrap_or_default(),
        }
    }

    fn ready(&self) -> bool {
        if !self.flushed.get() {
            return false;
        }
        match &self.anchor {
            Anchor::Named { parent, .. } => parent.ready(),
            Anchor::Element { list, id } => list
                .upgrade()
                .is_some_and(|list| list.index_of(*id).is_some() && list.as_scope().ready()),
        }
    }

    fn update_with(&self, init: bool, updater: Updater<'_>) -> bool {
        if !self.flushed.get() {
            let current = self.initial.borrow().clone();
            let next = updater(current.clone());
            let changed = !next.same(&current);
            *self.initial.borrow_mut() = next;
            return changed;
        }
        self.write_parent(init, updater)
    }

    fn path(&self) -> Option<Path> {
        match &self.anchor {
            Anchor::Named { parent, key } => Some(parent.path()?.child(key.clone())),
            Anchor::Element { list, id } => {
                let list = list.upgrade()?;
                let index = list.index_of(*id)?;
                Some(list.as_scope().path()?.child(index))
            }
        }
    }

    fn registry(&self) -> Rc<ListenerRegistry> {
        Rc::clone(&self.registry)
    }
}

fn seed_map(existing: Option<&Node>) -> Node {
    match existing {
        Some(node @ Node::Map(_)) => node.clone(),
        _ => Node::empty_map(),
    }
}
