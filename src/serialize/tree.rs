//! serialize::tree
//!
//! Ordered value tree handed to the host.

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use thiserror::Error;

/// Failure sentinel: the request produced no tree.
///
/// The reason is in the session's last error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("no result")]
pub struct Failed;

/// A host-consumable value.
///
/// Associations keep insertion order, which is part of the output
/// contract.
#[derive(Debug, Clone, PartialEq)]
pub enum Tree {
    /// No value
    Null,
    /// A flag such as `BareQ`
    Bool(bool),
    /// A session key or count
    Integer(u64),
    /// A path, URL or name
    String(String),
    /// An ordered list
    List(Vec<Tree>),
    /// Key-value pairs in insertion order
    Assoc(Vec<(String, Tree)>),
}

impl Tree {
    /// Look up a key in an association.
    pub fn get(&self, key: &str) -> Option<&Tree> {
        match self {
            Tree::Assoc(entries) => entries.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Keys of an association, in order.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Tree::Assoc(entries) => entries.iter().map(|(k, _)| k.as_str()).collect(),
            _ => Vec::new(),
        }
    }

    /// The flag, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Tree::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is an `Integer`.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Tree::Integer(n) => Some(*n),
            _ => None,
        }
    }

    /// The text, if this is a `String`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Tree::String(s) => Some(s),
            _ => None,
        }
    }

    /// The items, if this is a `List`.
    pub fn as_list(&self) -> Option<&[Tree]> {
        match self {
            Tree::List(items) => Some(items),
            _ => None,
        }
    }

    /// A list of strings.
    pub fn strings<I, S>(items: I) -> Tree
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tree::List(items.into_iter().map(|s| Tree::String(s.into())).collect())
    }
}

impl From<bool> for Tree {
    fn from(value: bool) -> Self {
        Tree::Bool(value)
    }
}

impl From<u64> for Tree {
    fn from(value: u64) -> Self {
        Tree::Integer(value)
    }
}

impl From<&str> for Tree {
    fn from(value: &str) -> Self {
        Tree::String(value.to_string())
    }
}

impl From<String> for Tree {
    fn from(value: String) -> Self {
        Tree::String(value)
    }
}

impl<T: Into<Tree>> From<Option<T>> for Tree {
    fn from(value: Option<T>) -> Self {
        value.map_or(Tree::Null, Into::into)
    }
}

impl Serialize for Tree {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Tree::Null => serializer.serialize_unit(),
            Tree::Bool(b) => serializer.serialize_bool(*b),
            Tree::Integer(n) => serializer.serialize_u64(*n),
            Tree::String(s) => serializer.serialize_str(s),
            Tree::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Tree::Assoc(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}
