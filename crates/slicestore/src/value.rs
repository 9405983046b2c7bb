//! The state tree.
//!
//! A [`Tree`] is an immutable, reference counted mapping from keys to [`Value`]s.  Cloning a tree
//! is cheap and shares the underlying node, a modified tree is always a new node, so any tree a
//! caller holds is a stable snapshot.
//!
//! Identity is observable via [`Tree::ptr_eq`] and [`Value::is_same`], which is what makes
//! structural sharing useful: consumers can tell that a sub-tree did not change without comparing
//! its contents.

use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A node of the state tree.
///
/// Objects are held as [`Tree`]s so they can be traversed by a [`crate::Path`].  Everything else,
/// including arrays, is a terminal JSON value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum Value {
    /// A terminal value.
    ///
    /// Constructing a `Leaf` from a JSON object makes that object opaque to paths, use
    /// [`Value::from`] to get an [`Value::Object`] instead.
    Leaf(serde_json::Value),
    Object(Tree),
}

impl Value {
    pub fn as_tree(&self) -> Option<&Tree> {
        match self {
            Value::Object(tree) => Some(tree),
            Value::Leaf(_) => None,
        }
    }

    pub fn as_leaf(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Leaf(value) => Some(value),
            Value::Object(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_leaf()
            .and_then(serde_json::Value::as_i64)
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_leaf()
            .and_then(serde_json::Value::as_f64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_leaf()
            .and_then(serde_json::Value::as_str)
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Leaf(value) => value.clone(),
            Value::Object(tree) => tree.to_json(),
        }
    }

    /// Snapshot equality, objects by identity, terminal values by value.
    ///
    /// Two reads of an unchanged slice are always the same.  An object that was copied because
    /// something below it changed is never the same as its previous version, even if the copy
    /// happens to be equal.
    pub fn is_same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Leaf(a), Value::Leaf(b)) => a == b,
            _ => false,
        }
    }

    /// [`Value::is_same`] for possibly absent values.
    pub fn is_same_slice(a: Option<&Value>, b: Option<&Value>) -> bool {
        match (a, b) {
            (None, None) => true,
            (Some(a), Some(b)) => a.is_same(b),
            _ => false,
        }
    }

    /// A copy that shares no object nodes with `self`.
    pub fn deep_copy(&self) -> Value {
        match self {
            Value::Leaf(value) => Value::Leaf(value.clone()),
            Value::Object(tree) => Value::Object(tree.deep_copy()),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => Value::Object(Tree::from_json_map(map)),
            other => Value::Leaf(other),
        }
    }
}

impl From<Tree> for Value {
    fn from(tree: Tree) -> Self {
        Value::Object(tree)
    }
}

impl From<Value> for serde_json::Value {
    fn from(value: Value) -> Self {
        value.to_json()
    }
}

/// An object node of the state tree.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct Tree {
    entries: Arc<IndexMap<String, Value>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        Self {
            entries: Arc::new(
                entries
                    .into_iter()
                    .map(|(key, value)| (key.into(), value))
                    .collect(),
            ),
        }
    }

    fn from_json_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self::from_entries(
            map.into_iter()
                .map(|(key, value)| (key, Value::from(value))),
        )
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.entries.keys()
    }

    /// True if both trees are the same node.
    pub fn ptr_eq(&self, other: &Tree) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// A shallow copy with `key` set to `value`.
    ///
    /// The other entries of the copy share their nodes with `self`.
    pub fn with(&self, key: impl Into<String>, value: Value) -> Tree {
        let mut entries: IndexMap<String, Value> = (*self.entries).clone();
        entries.insert(key.into(), value);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// A shallow copy with the top-level entries of `partial` overwriting those of `self`.
    ///
    /// Keys of `self` not present in `partial` keep their nodes, keys only in `partial` are
    /// appended.
    pub fn merge(&self, partial: &Tree) -> Tree {
        let mut entries: IndexMap<String, Value> = (*self.entries).clone();
        for (key, value) in partial.iter() {
            entries.insert(key.clone(), value.clone());
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// A copy that shares no object nodes with `self`.
    pub fn deep_copy(&self) -> Tree {
        Self::from_entries(
            self.entries
                .iter()
                .map(|(key, value)| (key.clone(), value.deep_copy())),
        )
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect(),
        )
    }
}

impl PartialEq for Tree {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.entries == other.entries
    }
}

impl TryFrom<serde_json::Value> for Tree {
    type Error = ValueError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        match value {
            serde_json::Value::Object(map) => Ok(Tree::from_json_map(map)),
            other => Err(ValueError::NotAnObject(other)),
        }
    }
}

impl From<Tree> for serde_json::Value {
    fn from(tree: Tree) -> Self {
        tree.to_json()
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValueError {
    #[error("Value is not an object. value: {0}")]
    NotAnObject(serde_json::Value),
}
