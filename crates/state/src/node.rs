use lumen_common::Key;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// One value in the settings tree.
///
/// Containers are reference counted and never mutated in place: a write
/// produces a new container along the written spine and shares every other
/// subtree with the previous snapshot. Vectors (colors, directions,
/// quaternions) are lists of numbers.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Node {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Text(Rc<str>),
    List(Rc<Vec<Node>>),
    Map(Rc<BTreeMap<String, Node>>),
}

impl Node {
    pub fn empty_map() -> Self {
        Self::Map(Rc::new(BTreeMap::new()))
    }

    pub fn empty_list() -> Self {
        Self::List(Rc::new(Vec::new()))
    }

    pub fn list(items: impl IntoIterator<Item = Node>) -> Self {
        Self::List(Rc::new(items.into_iter().collect()))
    }

    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Node)>) -> Self {
        Self::Map(Rc::new(
            entries.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// Identity comparison used for change detection.
    ///
    /// Containers compare by reference, primitives by value. Two deep-equal
    /// maps built independently are *not* the same.
    pub fn same(&self, other: &Node) -> bool {
        match (self, other) {
            (Self::Map(a), Self::Map(b)) => Rc::ptr_eq(a, b),
            (Self::List(a), Self::List(b)) => Rc::ptr_eq(a, b),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Number(a), Self::Number(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Null, Self::Null) => true,
            _ => false,
        }
    }

    pub fn get(&self, key: &Key) -> Option<&Node> {
        match self {
            Self::Map(map) => match key {
                Key::Name(name) => map.get(name),
                Key::Index(_) => map.get(&key.as_name()),
            },
            Self::List(items) => key.as_index().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    /// Shorthand for a named map entry.
    pub fn field(&self, name: &str) -> Option<&Node> {
        match self {
            Self::Map(map) => map.get(name),
            _ => None,
        }
    }

    pub fn get_path(&self, keys: &[Key]) -> Option<&Node> {
        keys.iter().try_fold(self, |node, key| node.get(key))
    }

    /// A copy of this node with `key` set to `value`, or removed when `value`
    /// is `None`. Returns a clone of `self` (same reference) when nothing changes.
    pub fn with(&self, key: &Key, value: Option<Node>) -> Node {
        match self {
            Self::Map(map) => {
                let name = key.as_name();
                match value {
                    Some(v) => {
                        if map.get(&name).is_some_and(|cur| cur.same(&v)) {
                            return self.clone();
                        }
                        let mut next = (**map).clone();
                        next.insert(name, v);
                        Self::Map(Rc::new(next))
                    }
                    None => {
                        if !map.contains_key(&name) {
                            return self.clone();
                        }
                        let mut next = (**map).clone();
                        next.remove(&name);
                        Self::Map(Rc::new(next))
                    }
                }
            }
            Self::List(items) => {
                let Some(index) = key.as_index() else {
                    return self.clone();
                };
                match value {
                    Some(v) => {
                        if items.get(index).is_some_and(|cur| cur.same(&v)) {
                            return self.clone();
                        }
                        // Writes may replace an element or append one, never leave holes.
                        if index > items.len() {
                            return self.clone();
                        }
                        let mut next = (**items).clone();
                        if index == next.len() {
                            next.push(v);
                        } else {
                            next[index] = v;
                        }
                        Self::List(Rc::new(next))
                    }
                    // Lists keep their length; an unset element becomes null.
                    None if index < items.len() && !items[index].is_null() => {
                        let mut next = (**items).clone();
                        next[index] = Self::Null;
                        Self::List(Rc::new(next))
                    }
                    None => self.clone(),
                }
            }
            _ => match (key, value) {
                (_, None) => self.clone(),
                (Key::Index(0), Some(v)) => Self::list([v]),
                (Key::Index(_), Some(_)) => self.clone(),
                (Key::Name(name), Some(v)) => Self::map([(name.clone(), v)]),
            },
        }
    }

    /// Path version of [`Node::with`]. Only the spine along `keys` is copied;
    /// missing intermediate containers are created for writes and left alone
    /// for removals.
    ///
    /// A write whose path would skip past the end of a list commits nothing.
    pub fn with_path(&self, keys: &[Key], value: Option<Node>) -> Node {
        if value.is_some() && !self.reaches(keys) {
            return self.clone();
        }
        self.write_path(keys, value)
    }

    fn write_path(&self, keys: &[Key], value: Option<Node>) -> Node {
        let Some((first, rest)) = keys.split_first() else {
            return value.unwrap_or_default();
        };
        if rest.is_empty() {
            return self.with(first, value);
        }
        match self.get(first) {
            Some(child) => {
                let next = child.write_path(rest, value);
                self.with(first, Some(next))
            }
            None => match value {
                None => self.clone(),
                Some(v) => self.with(first, Some(Self::Null.write_path(rest, Some(v)))),
            },
        }
    }

    /// Whether every index along `keys` addresses an existing list element
    /// or the slot just past the end.
    fn reaches(&self, keys: &[Key]) -> bool {
        let Some((first, rest)) = keys.split_first() else {
            return true;
        };
        let within = match self {
            Self::Map(_) => true,
            Self::List(items) => first.as_index().is_none_or(|i| i <= items.len()),
            _ => !matches!(first, Key::Index(i) if *i > 0),
        };
        within
            && match self.get(first) {
                Some(child) => child.reaches(rest),
                None => Self::Null.reaches(rest),
            }
    }

    /// False when any number in the tree is NaN or infinite. Such values
    /// have no JSON form.
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Number(n) => n.is_finite(),
            Self::List(items) => items.iter().all(Self::is_finite),
            Self::Map(map) => map.values().all(Self::is_finite),
            _ => true,
        }
    }

    /// A list with `items` appended. Null becomes a new list; any other
    /// non-list value is returned unchanged, as is any list when `items` is empty.
    pub fn pushed(&self, items: Vec<Node>) -> Node {
        if items.is_empty() {
            return self.clone();
        }
        match self {
            Self::List(list) => {
                let mut next = (**list).clone();
                next.extend(items);
                Self::List(Rc::new(next))
            }
            Self::Null => Self::List(Rc::new(items)),
            _ => self.clone(),
        }
    }

    /// Splice with clamped bounds. Returns the same reference when nothing
    /// is removed or inserted, or when `self` is not a list.
    pub fn spliced(&self, start: usize, delete_count: usize, items: Vec<Node>) -> Node {
        let Self::List(list) = self else {
            return self.clone();
        };
        let start = start.min(list.len());
        let end = start.saturating_add(delete_count).min(list.len());
        if start == end && items.is_empty() {
            return self.clone();
        }
        let mut next = (**list).clone();
        next.splice(start..end, items);
        Self::List(Rc::new(next))
    }

    /// JSON-style name of the variant, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::List(_) => "array",
            Self::Map(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|n| n as f32)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Numbers of a numeric list, or `None` if any element is not a number.
    pub fn to_f32s(&self) -> Option<Vec<f32>> {
        self.as_list()?.iter().map(Node::as_f32).collect()
    }

    /// Number of entries in a container; zero for primitives.
    pub fn len(&self) -> usize {
        match self {
            Self::List(items) => items.len(),
            Self::Map(map) => map.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<f32> for Node {
    fn from(n: f32) -> Self {
        Self::Number(n as f64)
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Self::Text(s.into())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Self::Text(s.into())
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Self::List(Rc::new(items))
    }
}

impl From<&[f64]> for Node {
    fn from(values: &[f64]) -> Self {
        Self::list(values.iter().copied().map(Self::Number))
    }
}

impl<const N: usize> From<[f64; N]> for Node {
    fn from(values: [f64; N]) -> Self {
        Self::list(values.into_iter().map(Self::Number))
    }
}

impl<const N: usize> From<[f32; N]> for Node {
    fn from(values: [f32; N]) -> Self {
        Self::list(values.into_iter().map(Self::from))
    }
}

impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n.as_f64().map_or(Self::Null, Self::Number),
            Value::String(s) => Self::Text(s.into()),
            Value::Array(items) => Self::list(items.into_iter().map(Self::from)),
            Value::Object(map) => Self::map(map.into_iter().map(|(k, v)| (k, Self::from(v)))),
        }
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Number(n) => serializer.serialize_f64(*n),
            Self::Text(t) => serializer.serialize_str(t),
            Self::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map.iter() {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Node {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}
