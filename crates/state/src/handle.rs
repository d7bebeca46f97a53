use crate::node::Node;
use crate::scope::Updater;
use lumen_common::{Key, Path};
use std::cell::RefCell;
use tracing::warn;

/// Something that owns a root snapshot and can commit a replacement.
pub trait Root {
    /// The latest committed root.
    fn snapshot(&self) -> Node;

    /// Derive a new root from the current one. Returns `false` (and commits
    /// nothing) when `edit` hands back the same reference.
    fn modify(&self, edit: Updater<'_>) -> bool;
}

/// A lazy, path-addressed view into a [`Root`].
///
/// Extending a handle with [`Handle::at`] only grows the path. Nothing in
/// the tree is read or created until a terminal operation runs, and every
/// terminal operation reads the latest snapshot rather than one captured
/// when the handle was made.
pub struct Handle<'r, R: Root + ?Sized + 'r> {
    root: &'r R,
    path: Path,
}

impl<'r, R: Root + ?Sized + 'r> Clone for Handle<'r, R> {
    fn clone(&self) -> Self {
        Self {
            root: self.root,
            path: self.path.clone(),
        }
    }
}

impl<'r, R: Root + ?Sized + 'r> Handle<'r, R> {
    pub fn new(root: &'r R, path: Path) -> Self {
        Self { root, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A handle one segment deeper.
    pub fn at(&self, key: impl Into<Key>) -> Self {
        Self {
            root: self.root,
            path: self.path.child(key),
        }
    }

    /// Current value at this path, if any.
    pub fn read(&self) -> Option<Node> {
        self.root.snapshot().get_path(self.path.keys()).cloned()
    }

    fn refuse_non_finite(&self) -> bool {
        warn!(path = %self.path, "non-finite number refused");
        false
    }

    /// Store `value` at this path, creating missing containers on the way.
    /// NaN and infinite numbers are refused.
    pub fn set(&self, value: impl Into<Node>) -> bool {
        let value = value.into();
        if !value.is_finite() {
            return self.refuse_non_finite();
        }
        let keys = self.path.keys();
        self.root
            .modify(Box::new(move |root: Node| root.with_path(keys, Some(value))))
    }

    /// Store the value produced from the current one. Returning the same
    /// reference commits nothing.
    pub fn set_with(&self, producer: impl FnOnce(Option<&Node>) -> Node) -> bool {
        let keys = self.path.keys();
        self.root.modify(Box::new(move |root: Node| {
            let next = producer(root.get_path(keys));
            if !next.is_finite() {
                warn!(path = ?keys, "non-finite number refused");
                return root;
            }
            root.with_path(keys, Some(next))
        }))
    }

    /// Append to the list at this path. A missing value becomes a new list.
    pub fn push(&self, items: Vec<Node>) -> bool {
        if items.is_empty() {
            return false;
        }
        if !items.iter().all(Node::is_finite) {
            return self.refuse_non_finite();
        }
        let keys = self.path.keys();
        self.root.modify(Box::new(move |root: Node| {
            let target = root.get_path(keys).cloned().unwrap_or_default();
            let next = target.pushed(items);
            if next.same(&target) {
                root
            } else {
                root.with_path(keys, Some(next))
            }
        }))
    }

    /// Remove `delete_count` elements at `start` and insert `items` there.
    pub fn splice(&self, start: usize, delete_count: usize, items: Vec<Node>) -> bool {
        if delete_count == 0 && items.is_empty() {
            return false;
        }
        if !items.iter().all(Node::is_finite) {
            return self.refuse_non_finite();
        }
        let keys = self.path.keys();
        self.root.modify(Box::new(move |root: Node| {
            let next = root.get_path(keys).and_then(|target| {
                let next = target.spliced(start, delete_count, items);
                (!next.same(target)).then_some(next)
            });
            match next {
                Some(next) => root.with_path(keys, Some(next)),
                None => root,
            }
        }))
    }

    /// Remove the key from its map (or null a list slot). The root itself
    /// cannot be deleted.
    pub fn delete(&self) -> bool {
        if self.path.is_empty() {
            return false;
        }
        let keys = self.path.keys();
        self.root
            .modify(Box::new(move |root: Node| root.with_path(keys, None)))
    }
}

/// A free-standing root, used to author snapshots outside a store.
#[derive(Debug, Default)]
pub struct Draft {
    root: RefCell<Node>,
}

impl Draft {
    pub fn new(root: Node) -> Self {
        Self {
            root: RefCell::new(root),
        }
    }

    pub fn handle(&self) -> Handle<'_, Self> {
        Handle::new(self, Path::root())
    }

    pub fn at(&self, key: impl Into<Key>) -> Handle<'_, Self> {
        self.handle().at(key)
    }

    pub fn state(&self) -> Node {
        self.root.borrow().clone()
    }

    pub fn into_state(self) -> Node {
        self.root.into_inner()
    }
}

impl Root for Draft {
    fn snapshot(&self) -> Node {
        self.state()
    }

    fn modify(&self, edit: Updater<'_>) -> bool {
        let current = self.state();
        let next = edit(current.clone());
        if next.same(&current) {
            return false;
        }
        *self.root.borrow_mut() = next;
        true
    }
}
