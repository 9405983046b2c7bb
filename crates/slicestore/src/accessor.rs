//! Reading and writing values at a [`Path`] inside a [`Tree`].
//!
//! Both functions are pure.  Writes are copy-on-write along the path: every object on the path is
//! replaced by a shallow copy and every sibling off the path is shared with the input tree.

use tracing::{trace, warn};

use crate::path::Path;
use crate::value::{Tree, Value};

/// The new value for a location, or a function of the old one.
pub enum Update {
    Value(Value),
    /// Receives the current value at the location, `None` if absent.
    With(Box<dyn FnOnce(Option<Value>) -> Value>),
}

impl Update {
    pub fn with<F>(f: F) -> Self
    where
        F: FnOnce(Option<Value>) -> Value + 'static,
    {
        Update::With(Box::new(f))
    }

    fn apply(self, old: Option<Value>) -> Value {
        match self {
            Update::Value(value) => value,
            Update::With(f) => f(old),
        }
    }
}

impl std::fmt::Debug for Update {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Update::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Update::With(_) => f.write_str("With(..)"),
        }
    }
}

impl From<Value> for Update {
    fn from(value: Value) -> Self {
        Update::Value(value)
    }
}

impl From<serde_json::Value> for Update {
    fn from(value: serde_json::Value) -> Self {
        Update::Value(Value::from(value))
    }
}

impl From<Tree> for Update {
    fn from(tree: Tree) -> Self {
        Update::Value(Value::Object(tree))
    }
}

/// Reads the value at `path`.
///
/// Returns `None` as soon as a key is missing or an intermediate value is not an object.  The
/// root path returns the whole tree.
pub fn read_path(tree: &Tree, path: &Path) -> Option<Value> {
    let Some((last, parents)) = path.split_last() else {
        return Some(Value::Object(tree.clone()));
    };

    let mut node = tree;
    for key in parents {
        node = node.get(key)?.as_tree()?;
    }
    node.get(last).cloned()
}

/// Returns a new tree with the value at `path` replaced.
///
/// Missing or non-object intermediate values are replaced by objects, so the write always
/// succeeds.
///
/// For the root path the update is applied to the whole tree and the result is merged into it at
/// the top level, as for [`crate::Store::set`].  An update that yields a terminal value for the
/// root leaves the entries unchanged.
pub fn write_path(tree: &Tree, path: &Path, update: Update) -> Tree {
    trace!("write_path. path: '{}', update: {:?}", path, update);

    if path.is_root() {
        return match update.apply(Some(Value::Object(tree.clone()))) {
            Value::Object(partial) => tree.merge(&partial),
            Value::Leaf(value) => {
                warn!("Ignoring terminal value written to the root. value: {}", value);
                tree.merge(&Tree::new())
            }
        };
    }

    write_keys(tree, path.keys(), update)
}

fn write_keys(node: &Tree, keys: &[String], update: Update) -> Tree {
    match keys {
        [] => unreachable!("root writes are handled by write_path"),
        [key] => {
            let old = node.get(key).cloned();
            node.with(key.as_str(), update.apply(old))
        }
        [key, rest @ ..] => {
            let child = match node.get(key).and_then(Value::as_tree) {
                Some(child) => write_keys(child, rest, update),
                None => write_keys(&Tree::new(), rest, update),
            };
            node.with(key.as_str(), Value::Object(child))
        }
    }
}
