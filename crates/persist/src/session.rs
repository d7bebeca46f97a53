use crate::storage::{SessionStorage, StorageError};
use lumen_state::{Node, Persistence};
use std::rc::Rc;
use tracing::{debug, warn};

/// Storage key holding the snapshot of `namespace`.
pub fn storage_key(namespace: &str) -> String {
    format!("Option:{namespace}")
}

/// Snapshot persistence over session storage, one JSON document per namespace.
#[derive(Clone)]
pub struct SessionPersistence {
    storage: Rc<dyn SessionStorage>,
}

impl SessionPersistence {
    pub fn new(storage: Rc<dyn SessionStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &Rc<dyn SessionStorage> {
        &self.storage
    }

    /// Strict read: storage and parse errors are returned, not swallowed.
    pub fn read(&self, namespace: &str) -> Result<Option<Node>, StorageError> {
        match self.storage.get(&storage_key(namespace))? {
            Some(text) => Ok(Some(serde_json::from_str(&text)?)),
            None => Ok(None),
        }
    }

    pub fn write(&self, namespace: &str, snapshot: &Node) -> Result<(), StorageError> {
        let text = serde_json::to_string(snapshot)?;
        self.storage.set(&storage_key(namespace), &text)
    }

    pub fn remove(&self, namespace: &str) -> Result<(), StorageError> {
        self.storage.remove(&storage_key(namespace))
    }
}

impl Persistence for SessionPersistence {
    fn load(&self, namespace: &str) -> Option<Node> {
        match self.read(namespace) {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(%namespace, error = %e, "stored snapshot unreadable, starting from defaults");
                None
            }
        }
    }

    fn save(&self, namespace: &str, snapshot: &Node) {
        match self.write(namespace, snapshot) {
            Ok(()) => debug!(%namespace, "snapshot saved"),
            Err(e) => warn!(%namespace, error = %e, "failed to save snapshot"),
        }
    }

    fn clear(&self, namespace: &str) {
        if let Err(e) = self.remove(namespace) {
            warn!(%namespace, error = %e, "failed to clear snapshot");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use lumen_state::{Draft, Key};
    use proptest::prelude::*;

    fn persistence() -> (Rc<MemoryStorage>, SessionPersistence) {
        let storage = Rc::new(MemoryStorage::new());
        let persistence = SessionPersistence::new(storage.clone());
        (storage, persistence)
    }

    #[test]
    fn snapshots_live_under_option_key() {
        let (storage, persistence) = persistence();
        persistence.save("PG6201Config", &Node::map([("x", Node::from(true))]));
        assert_eq!(
            storage.get("Option:PG6201Config").unwrap().as_deref(),
            Some(r#"{"x":true}"#)
        );
    }

    #[test]
    fn malformed_entry_loads_as_nothing() {
        let (storage, persistence) = persistence();
        storage.set("Option:ns", "{not json").unwrap();
        assert_eq!(persistence.load("ns"), None);
        assert!(persistence.read("ns").is_err());
    }

    #[test]
    fn missing_entry_loads_as_nothing() {
        let (_, persistence) = persistence();
        assert_eq!(persistence.load("ns"), None);
    }

    #[test]
    fn clear_removes_entry() {
        let (storage, persistence) = persistence();
        persistence.save("ns", &Node::empty_map());
        persistence.clear("ns");
        assert!(storage.keys().unwrap().is_empty());
    }

    #[test]
    fn save_after_corrupt_file_lands() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = crate::storage::FileStorage::open(tmp.path()).unwrap();
        std::fs::write(storage.path(), b"not json").unwrap();
        let persistence = SessionPersistence::new(Rc::new(storage));
        assert_eq!(persistence.load("ns"), None);

        let snapshot = Node::map([("x", Node::from(1.0))]);
        persistence.save("ns", &snapshot);
        assert_eq!(persistence.load("ns"), Some(snapshot));
    }

    #[test]
    fn refused_infinity_keeps_the_roundtrip() {
        let draft = Draft::new(Node::empty_map());
        draft.at("camera").at("fov").set(45.0);
        draft.at("camera").at("far").set(f64::INFINITY);
        let snapshot = draft.into_state();
        assert_eq!(snapshot.get_path(&[Key::from("camera"), Key::from("far")]), None);

        let (_, persistence) = persistence();
        persistence.save("ns", &snapshot);
        assert_eq!(persistence.load("ns"), Some(snapshot));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Set(Vec<Key>, Node),
        Push(Vec<Key>, Node),
        Delete(Vec<Key>),
    }

    fn key() -> impl Strategy<Value = Key> {
        prop_oneof![
            prop::sample::select(vec!["camera", "material", "lights", "mesh", "fov"])
                .prop_map(Key::from),
            (0usize..3).prop_map(Key::from),
        ]
    }

    fn leaf() -> impl Strategy<Value = Node> {
        prop_oneof![
            any::<bool>().prop_map(Node::from),
            (-4000i32..4000).prop_map(|n| Node::from(f64::from(n) / 8.0)),
            "[a-z ]{0,8}".prop_map(Node::from),
            prop::sample::select(vec![f64::INFINITY, f64::NEG_INFINITY, f64::NAN])
                .prop_map(Node::from),
        ]
    }

    fn op() -> impl Strategy<Value = Op> {
        let path = || prop::collection::vec(key(), 1..4);
        prop_oneof![
            (path(), leaf()).prop_map(|(p, v)| Op::Set(p, v)),
            (path(), leaf()).prop_map(|(p, v)| Op::Push(p, v)),
            path().prop_map(Op::Delete),
        ]
    }

    proptest! {
        #[test]
        fn roundtrip_reproduces_snapshot(ops in prop::collection::vec(op(), 0..24)) {
            let draft = Draft::new(Node::empty_map());
            for op in ops {
                match op {
                    Op::Set(path, value) => {
                        path.into_iter().fold(draft.handle(), |h, k| h.at(k)).set(value);
                    }
                    Op::Push(path, value) => {
                        path.into_iter().fold(draft.handle(), |h, k| h.at(k)).push(vec![value]);
                    }
                    Op::Delete(path) => {
                        path.into_iter().fold(draft.handle(), |h, k| h.at(k)).delete();
                    }
                }
            }
            let snapshot = draft.into_state();
            let (_, persistence) = persistence();
            persistence.save("ns", &snapshot);
            prop_assert_eq!(persistence.load("ns"), Some(snapshot));
        }
    }
}
