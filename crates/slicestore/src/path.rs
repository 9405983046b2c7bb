use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde_with::{DeserializeFromStr, SerializeDisplay};
use thiserror::Error;

/// A path to a value inside a state tree.
///
/// An ordered sequence of keys, each key selecting a child of an object node.
///
/// The string representation is dotted, e.g. `user.address.city`.  The empty path (the root) is
/// represented by the empty string and refers to the whole tree.
///
/// valid examples:
///
/// `` (the whole tree)
/// `count`
/// `user.address.city`
///
/// invalid examples:
/// `user..city` (empty key)
/// `.user` (empty key)
#[derive(Debug, Clone, DeserializeFromStr, SerializeDisplay, Eq, PartialEq, Default, Hash)]
pub struct Path {
    keys: Vec<String>,
}

impl Path {
    pub const SEPARATOR: char = '.';

    /// The empty path, i.e. the whole tree.
    pub const fn root() -> Self {
        Self {
            keys: Vec::new(),
        }
    }

    /// See [`Path::from_str`] for a variant that does validation
    ///
    /// Keys may contain the separator when constructed this way, such paths can not be round-tripped
    /// through their string representation.
    pub fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn push(&mut self, key: impl Into<String>) {
        self.keys.push(key.into());
    }

    /// Returns a new path with `key` appended.
    pub fn join(&self, key: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.push(key);
        path
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn is_root(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Splits off the last key, `None` for the root.
    pub fn split_last(&self) -> Option<(&String, &[String])> {
        self.keys.split_last()
    }
}

impl FromStr for Path {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Ok(Path::root());
        }

        let keys = s
            .split(Self::SEPARATOR)
            .map(|key| match key.is_empty() {
                true => Err(PathError::EmptyKey(s.to_string())),
                false => Ok(key.to_string()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            keys,
        })
    }
}

impl Display for Path {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut keys = self.keys.iter();
        if let Some(first) = keys.next() {
            f.write_str(first)?;
            for key in keys {
                write!(f, "{}{}", Self::SEPARATOR, key)?;
            }
        }
        Ok(())
    }
}

impl<K: Into<String>, const N: usize> From<[K; N]> for Path {
    fn from(keys: [K; N]) -> Self {
        Self::from_keys(keys)
    }
}

impl From<Vec<String>> for Path {
    fn from(keys: Vec<String>) -> Self {
        Self {
            keys,
        }
    }
}

impl<'a> IntoIterator for &'a Path {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Path contains an empty key. path: '{0}'")]
    EmptyKey(String),
}
