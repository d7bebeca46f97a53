use crate::event::ListenerRegistry;
use crate::node::Node;
use crate::scope::{ElementParent, Scope, ScopedSection, Updater, replace_child};
use lumen_common::{ElementId, Key, Path};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};
use tracing::{debug, info};

/// Inclusive length bounds enforced by list actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bounds {
    pub min: usize,
    pub max: usize,
}

impl Bounds {
    pub fn new(min: usize, max: usize) -> Self {
        Self {
            min,
            max: max.max(min),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(0, usize::MAX)
    }
}

/// One mounted element: its stable id, its section and whatever the
/// element template built for it.
pub struct ListElement<T> {
    id: ElementId,
    section: Rc<ScopedSection>,
    value: T,
}

impl<T> ListElement<T> {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn scope(&self) -> Rc<dyn Scope> {
        self.section.clone()
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Current index, or `None` once removed.
    pub fn index(&self) -> Option<usize> {
        self.section.key().and_then(|key| key.as_index())
    }
}

/// A variable-length list of sections stored as an array at `parent[key]`.
///
/// Elements carry a stable [`ElementId`]; their index, and so their path,
/// is resolved on every access, so removing from the middle renumbers the
/// trailing elements without confusing their scopes. Actions that would
/// leave `[min, max]` are refused; direct writes to the array are not
/// re-validated.
pub struct ScopedList<T> {
    parent: Rc<dyn Scope>,
    key: Key,
    bounds: Bounds,
    initial: RefCell<Node>,
    flushed: Cell<bool>,
    ids: RefCell<Vec<ElementId>>,
    elements: RefCell<BTreeMap<ElementId, Rc<ListElement<T>>>>,
    template: Box<dyn Fn(&Rc<dyn Scope>) -> T>,
    registry: Rc<ListenerRegistry>,
    me: Weak<ScopedList<T>>,
}

impl<T: 'static> ScopedList<T> {
    /// Mount the list at `parent[key]`, creating one element per stored
    /// entry (clamped to `bounds`). `template` builds each element, both now
    /// and on later increments.
    pub fn mount(
        parent: &Rc<dyn Scope>,
        key: impl Into<Key>,
        bounds: Bounds,
        template: impl Fn(&Rc<dyn Scope>) -> T + 'static,
    ) -> Rc<Self> {
        let key = key.into();
        let stored = match parent.state().get(&key) {
            Some(node @ Node::List(_)) => node.clone(),
            _ => Node::empty_list(),
        };
        let count = stored.len().clamp(bounds.min, bounds.max);
        let seed = stored.spliced(count, usize::MAX, Vec::new());

        let list = Rc::new_cyclic(|me| Self {
            parent: Rc::clone(parent),
            key,
            bounds,
            initial: RefCell::new(seed),
            flushed: Cell::new(false),
            ids: RefCell::new(Vec::new()),
            elements: RefCell::new(BTreeMap::new()),
            template: Box::new(template),
            registry: parent.registry(),
            me: me.clone(),
        });
        for _ in 0..count {
            list.spawn();
        }
        list.flush();
        list
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.ids.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn can_increment(&self) -> bool {
        self.len() < self.bounds.max
    }

    pub fn can_decrement(&self) -> bool {
        self.len() > self.bounds.min
    }

    /// Elements in index order.
    pub fn elements(&self) -> Vec<Rc<ListElement<T>>> {
        let elements = self.elements.borrow();
        self.ids
            .borrow()
            .iter()
            .filter_map(|id| elements.get(id).cloned())
            .collect()
    }

    pub fn element(&self, index: usize) -> Option<Rc<ListElement<T>>> {
        let id = *self.ids.borrow().get(index)?;
        self.elements.borrow().get(&id).cloned()
    }

    /// Append one element. Its section registers defaults on mount and
    /// lands in the tree as a single commit.
    pub fn increment(&self) -> bool {
        if !self.can_increment() {
            debug!(path = %self.display_path(), max = self.bounds.max, "increment refused");
            return false;
        }
        self.spawn();
        info!(path = %self.display_path(), len = self.len(), "list element added");
        true
    }

    /// Drop the last element and its state in one commit.
    pub fn decrement(&self) -> bool {
        if !self.can_decrement() {
            debug!(path = %self.display_path(), min = self.bounds.min, "decrement refused");
            return false;
        }
        let index = self.len() - 1;
        self.detach(index);
        info!(path = %self.display_path(), len = self.len(), "list element dropped");
        true
    }

    /// Remove the element at `index`. Later elements shift down by one.
    pub fn remove(&self, index: usize) -> bool {
        if index >= self.len() || !self.can_decrement() {
            debug!(path = %self.display_path(), index, "remove refused");
            return false;
        }
        self.detach(index);
        info!(path = %self.display_path(), index, len = self.len(), "list element removed");
        true
    }

    fn spawn(&self) -> Rc<ListElement<T>> {
        let id = ElementId::new();
        let index = {
            let mut ids = self.ids.borrow_mut();
            ids.push(id);
            ids.len() - 1
        };
        let stored = self.state();
        let parent: Weak<dyn ElementParent> = self.me.clone();
        let (section, value) = ScopedSection::mount_element(
            parent,
            id,
            stored.get(&Key::Index(index)),
            Rc::clone(&self.registry),
            |scope| (self.template)(scope),
        );
        let element = Rc::new(ListElement { id, section, value });
        self.elements.borrow_mut().insert(id, Rc::clone(&element));
        element
    }

    fn detach(&self, index: usize) {
        let id = self.ids.borrow_mut().remove(index);
        let removed = self.elements.borrow_mut().remove(&id);
        self.update_with(
            false,
            Box::new(move |list: Node| list.spliced(index, 1, Vec::new())),
        );
        drop(removed);
    }

    fn flush(&self) {
        if self.flushed.replace(true) {
            return;
        }
        let buffered = self.initial.take();
        self.parent.update_with(
            true,
            Box::new(move |state: Node| {
                replace_child(state, &self.key, Box::new(move |_: Node| buffered), Node::empty_list)
            }),
        );
    }

    fn display_path(&self) -> String {
        self.path()
            .map(|p| p.to_string())
            .unwrap_or_else(|| self.key.to_string())
    }
}

impl<T: 'static> ElementParent for ScopedList<T> {
    fn index_of(&self, id: ElementId) -> Option<usize> {
        self.ids.borrow().iter().position(|other| *other == id)
    }

    fn as_scope(&self) -> &dyn Scope {
        self
    }
}

impl<T: 'static> Scope for ScopedList<T> {
    fn state(&self) -> Node {
        if !self.flushed.get() {
            return self.initial.borrow().clone();
        }
        self.parent
            .state()
            .get(&self.key)
            .cloned()
            .unwrap_or_default()
    }

    fn ready(&self) -> bool {
        self.flushed.get() && self.parent.ready()
    }

    fn update_with(&self, init: bool, updater: Updater<'_>) -> bool {
        if !self.flushed.get() {
            let current = self.initial.borrow().clone();
            let next = updater(current.clone());
            let changed = !next.same(&current);
            *self.initial.borrow_mut() = next;
            return changed;
        }
        self.parent.update_with(
            init,
            Box::new(move |state: Node| {
                replace_child(state, &self.key, updater, Node::empty_list)
            }),
        )
    }

    fn path(&self) -> Option<Path> {
        Some(self.parent.path()?.child(self.key.clone()))
    }

    fn registry(&self) -> Rc<ListenerRegistry> {
        Rc::clone(&self.registry)
    }
}
