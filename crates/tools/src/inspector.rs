use lumen_state::{Node, ObservableStore, Path, Scope};
use std::fmt;

/// Store inspector for developer tooling.
///
/// Provides read-only queries against a store for debugging and the CLI.
pub struct StoreInspector;

impl StoreInspector {
    pub fn summary(store: &ObservableStore) -> StoreSummary {
        let state = store.state();
        StoreSummary {
            namespace: store.namespace().to_owned(),
            ready: store.ready(),
            revision: store.revision(),
            persist_pending: store.persist_pending(),
            entries: flatten(&state).len(),
        }
    }

    /// Every leaf of the current snapshot.
    pub fn entries(store: &ObservableStore) -> Vec<Entry> {
        flatten(&store.state())
    }

    /// Value at `path` in the current snapshot, rendered for display.
    pub fn inspect(store: &ObservableStore, path: &Path) -> Option<String> {
        store.state().get_path(path.keys()).map(render_value)
    }
}

/// Summary of store state for the inspector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSummary {
    pub namespace: String,
    pub ready: bool,
    pub revision: u64,
    pub persist_pending: bool,
    pub entries: usize,
}

impl fmt::Display for StoreSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Store: namespace={} ready={} revision={} entries={} persist_pending={}",
            self.namespace, self.ready, self.revision, self.entries, self.persist_pending
        )
    }
}

/// One `path = value` line of a flattened snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub path: Path,
    pub value: String,
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.path, self.value)
    }
}

fn is_numeric_list(items: &[Node]) -> bool {
    !items.is_empty() && items.iter().all(|item| matches!(item, Node::Number(_)))
}

/// Flatten `node` into leaf entries in key order. Lists of numbers are
/// vectors and stay on one line.
pub fn flatten(node: &Node) -> Vec<Entry> {
    let mut out = Vec::new();
    collect(node, Path::root(), &mut out);
    out
}

fn collect(node: &Node, path: Path, out: &mut Vec<Entry>) {
    match node {
        Node::Map(entries) if !entries.is_empty() => {
            for (key, child) in entries.iter() {
                collect(child, path.child(key.as_str()), out);
            }
        }
        Node::List(items) if !items.is_empty() && !is_numeric_list(items) => {
            for (i, child) in items.iter().enumerate() {
                collect(child, path.child(i), out);
            }
        }
        leaf => out.push(Entry {
            path,
            value: render_value(leaf),
        }),
    }
}

/// Compact one-line rendering of a value.
pub fn render_value(node: &Node) -> String {
    match node {
        Node::Null => "null".to_owned(),
        Node::Bool(b) => b.to_string(),
        Node::Number(n) => n.to_string(),
        Node::Text(s) => format!("{s:?}"),
        Node::List(items) => {
            let inner: Vec<String> = items.iter().map(render_value).collect();
            format!("[{}]", inner.join(", "))
        }
        Node::Map(entries) => {
            let inner: Vec<String> = entries
                .iter()
                .map(|(key, value)| format!("{key}: {}", render_value(value)))
                .collect();
            format!("{{{}}}", inner.join(", "))
        }
    }
}
