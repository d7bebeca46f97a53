use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One segment of a path into the settings tree.
///
/// Names address map entries, indices address list elements.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Index(usize),
    Name(String),
}

impl Key {
    /// The key as a map entry name. Indices are rendered in decimal.
    pub fn as_name(&self) -> String {
        match self {
            Self::Index(i) => i.to_string(),
            Self::Name(n) => n.clone(),
        }
    }

    /// The key as a list index, if it is one or parses as one.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Name(n) => n.parse().ok(),
        }
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Name(name.to_owned())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Name(n) => f.write_str(n),
        }
    }
}

/// Ordered sequence of keys from a scope root to a value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Path(Vec<Key>);

impl Path {
    /// The empty path, addressing the scope root itself.
    pub fn root() -> Self {
        Self::default()
    }

    /// A new path extended by one segment. The receiver is left untouched.
    pub fn child(&self, key: impl Into<Key>) -> Self {
        let mut keys = self.0.clone();
        keys.push(key.into());
        Self(keys)
    }

    pub fn push(&mut self, key: impl Into<Key>) {
        self.0.push(key.into());
    }

    pub fn keys(&self) -> &[Key] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Concatenate `other` after this path.
    pub fn join(&self, other: &Path) -> Self {
        let mut keys = self.0.clone();
        keys.extend(other.0.iter().cloned());
        Self(keys)
    }
}

impl<K: Into<Key>> FromIterator<K> for Path {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("<root>");
        }
        for (i, key) in self.0.iter().enumerate() {
            match key {
                Key::Index(_) => write!(f, "{key}")?,
                Key::Name(_) if i == 0 => write!(f, "{key}")?,
                Key::Name(_) => write!(f, ".{key}")?,
            }
        }
        Ok(())
    }
}

/// Stable identity of a list element, independent of its current index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub Uuid);

impl ElementId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_id_uniqueness() {
        let a = ElementId::new();
        let b = ElementId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn path_display_mixes_names_and_indices() {
        let path: Path = Path::root().child("lights").child(1usize).child("ambient");
        assert_eq!(path.to_string(), "lights[1].ambient");
        assert_eq!(Path::root().to_string(), "<root>");
    }

    #[test]
    fn child_does_not_mutate_parent() {
        let parent = Path::root().child("camera");
        let child = parent.child("fov");
        assert_eq!(parent.len(), 1);
        assert_eq!(child.len(), 2);
    }

    #[test]
    fn key_conversions() {
        assert_eq!(Key::from("3").as_index(), Some(3));
        assert_eq!(Key::from(2usize).as_name(), "2");
        assert_eq!(Key::from("fov").as_index(), None);
    }
}
