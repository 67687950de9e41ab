use im::OrdMap;
use itertools::Itertools;
use smallvec::SmallVec;
use std::fmt::{Debug, Display, Formatter};

use crate::common::constants::DOC_ID;
use crate::common::value::Value;

type FieldVec = SmallVec<[String; 8]>;

/// The raw, storage-shaped mapping for one document: ordered string keys to
/// [Value]s, built on a lock-free persistent data structure.
///
/// A `Doc` is what the mapper hands to and receives from the storage
/// collaborator. It carries no schema knowledge of its own; typed access and
/// validation live on the record layer. The `_id` key is reserved for the
/// document identifier and has dedicated accessors.
///
/// ## Lock-Free Design
///
/// This struct uses `im::OrdMap` (a persistent ordered map):
/// - O(1) cloning via internal Arc sharing
/// - Mutations create new maps via structural sharing
/// - Each mutated doc is completely independent
#[derive(Clone, Eq, PartialEq, Hash, Default, Ord, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Doc {
    data: OrdMap<String, Value>,
}

impl Doc {
    /// Creates a new empty doc.
    pub fn new() -> Self {
        Doc {
            data: OrdMap::new(),
        }
    }

    /// Checks if the doc has no entries.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Associates `value` with `key`, replacing any previous entry.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.data.insert(key.into(), value.into());
    }

    /// Returns the value stored under `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Removes and returns the value stored under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.data.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Returns the document identifier, if one has been assigned.
    pub fn id(&self) -> Option<&Value> {
        self.data.get(DOC_ID)
    }

    /// Assigns the document identifier.
    pub fn set_id(&mut self, id: impl Into<Value>) {
        self.data.insert(DOC_ID.to_string(), id.into());
    }

    /// Returns the keys present in this doc, in order.
    pub fn field_names(&self) -> FieldVec {
        self.data.keys().cloned().collect()
    }

    /// Iterates over `(key, value)` entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.data.iter()
    }

    /// Copies every entry of `other` into this doc, overwriting collisions.
    pub fn merge(&mut self, other: &Doc) {
        for (k, v) in other.iter() {
            self.data.insert(k.clone(), v.clone());
        }
    }
}

impl Display for Doc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.data
                .iter()
                .map(|(k, v)| format!("{}: {:?}", k, v))
                .join(", ")
        )
    }
}

impl Debug for Doc {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl FromIterator<(String, Value)> for Doc {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Doc {
            data: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Doc {
    type Item = (String, Value);
    type IntoIter = im::ordmap::ConsumingIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.data.into_iter()
    }
}

/// Strips surrounding quotes from stringified `doc!` keys so both
/// `doc!{ name: 1 }` and `doc!{ "name": 1 }` address the same key.
pub fn normalize(key: &str) -> String {
    key.trim_matches('"').to_string()
}

/// Creates a [Doc] from key-value pairs.
///
/// ```text
/// let d = doc! {
///     name: "Alice",
///     age: 30,
///     address: { city: "New York", zip: 10001 },
///     tags: ["a", "b"],
/// };
/// ```
#[macro_export]
macro_rules! doc {
    // match an empty doc (with braces for symmetry)
    ({}) => {
        $crate::common::Doc::new()
    };

    // match an empty doc
    () => {
        $crate::common::Doc::new()
    };

    // match a doc with key value pairs (outer braces)
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        $crate::doc!($($key : $value),*)
    };

    // match a doc with key value pairs
    ($($key:tt : $value:tt),* $(,)? ) => {
        {
            #[allow(unused_imports)]
            use $crate::doc_value;

            let mut doc = $crate::common::Doc::new();
            $(
                doc.insert($crate::common::normalize(stringify!($key)), $crate::doc_value!($value));
            )*
            doc
        }
    };
}

/// Helper macro to convert values for the `doc!` macro.
/// Handles nested docs, arrays, and expressions.
#[macro_export]
macro_rules! doc_value {
    // match a nested doc
    ({ $($key:tt : $value:tt),* $(,)? }) => {
        {
            $crate::common::Value::Document($crate::doc!{ $($key : $value),* })
        }
    };

    // match an array of values
    ([ $($value:tt),* $(,)? ]) => {
        $crate::common::Value::Array(vec![$($crate::doc_value!($value)),*])
    };

    // match an expression (variable, function call, literal, etc.)
    ($value:expr) => {
        $crate::common::Value::from($value)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_new_doc_is_empty() {
        let doc = Doc::new();
        assert!(doc.is_empty());
        assert_eq!(doc.len(), 0);
    }

    #[test]
    fn test_insert_get_remove() {
        let mut doc = Doc::new();
        doc.insert("name", "Alice");
        doc.insert("age", 30);
        assert_eq!(doc.get("name"), Some(&Value::from("Alice")));
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.remove("age"), Some(Value::I32(30)));
        assert!(!doc.contains_key("age"));
    }

    #[test]
    fn test_doc_macro() {
        let doc = doc! {
            score: 1034,
            location: {
                city: "New York",
                zip: 10001,
            },
            category: ["food", "produce"],
        };
        assert_eq!(doc.get("score"), Some(&Value::I32(1034)));
        let location = doc.get("location").and_then(|v| v.as_document()).unwrap();
        assert_eq!(location.get("city"), Some(&Value::from("New York")));
        let cats = doc.get("category").and_then(|v| v.as_array()).unwrap();
        assert_eq!(cats.len(), 2);
    }

    #[test]
    fn test_doc_macro_quoted_keys() {
        let doc = doc! { "a": 1, b: 2 };
        assert_eq!(doc.get("a"), Some(&Value::I32(1)));
        assert_eq!(doc.get("b"), Some(&Value::I32(2)));
    }

    #[test]
    fn test_id_accessors() {
        let mut doc = doc! { name: "x" };
        assert!(doc.id().is_none());
        doc.set_id("user_1");
        assert_eq!(doc.id(), Some(&Value::from("user_1")));
    }

    #[test]
    fn test_merge_overwrites() {
        let mut a = doc! { x: 1, y: 2 };
        let b = doc! { y: 3, z: 4 };
        a.merge(&b);
        assert_eq!(a.get("y"), Some(&Value::I32(3)));
        assert_eq!(a.get("z"), Some(&Value::I32(4)));
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_clone_is_independent() {
        let mut a = doc! { x: 1 };
        let b = a.clone();
        a.insert("x", 2);
        assert_eq!(b.get("x"), Some(&Value::I32(1)));
        assert_eq!(a.get("x"), Some(&Value::I32(2)));
    }

    #[test]
    fn test_field_names_ordered() {
        let doc = doc! { b: 1, a: 2, c: 3 };
        let names = doc.field_names();
        assert_eq!(names.as_slice(), ["a", "b", "c"]);
    }
}
