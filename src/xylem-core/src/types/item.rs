//! Runtime item representation.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::ItemType;

/// An immutable, shareable sequence of items.
pub type Sequence = Arc<[Item]>;

/// Identity of a node in the node store.
///
/// The derived ordering is document order: nodes of one tree are numbered
/// in pre-order, and trees are ordered by creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub tree: u32,
    pub order: u32,
}

impl NodeRef {
    pub fn new(tree: u32, order: u32) -> Self {
        Self { tree, order }
    }
}

/// A single item of a result sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    /// xs:boolean
    Boolean(bool),
    /// xs:integer
    Integer(i64),
    /// xs:double
    Double(f64),
    /// xs:string
    String(String),
    /// xs:untypedAtomic, the result of atomizing a node.
    Untyped(String),
    /// A node in the node store.
    Node(NodeRef),
}

impl Item {
    /// Check if this item is a node.
    pub fn is_node(&self) -> bool {
        matches!(self, Self::Node(_))
    }

    /// Try to get as a node reference.
    pub fn as_node(&self) -> Option<NodeRef> {
        match self {
            Self::Node(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric value with integer promotion.
    #[allow(clippy::cast_precision_loss)]
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            Self::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) | Self::Untyped(s) => Some(s),
            _ => None,
        }
    }

    /// The most specific item type of this item.
    pub fn item_type(&self) -> ItemType {
        match self {
            Self::Boolean(_) => ItemType::Boolean,
            Self::Integer(_) => ItemType::Integer,
            Self::Double(_) => ItemType::Double,
            Self::String(_) => ItemType::String,
            Self::Untyped(_) => ItemType::Untyped,
            Self::Node(_) => ItemType::Node,
        }
    }

    /// Type name for error messages.
    pub fn type_name(&self) -> &'static str {
        self.item_type().display_name()
    }
}

impl From<bool> for Item {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<i64> for Item {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for Item {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Item {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Item {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<NodeRef> for Item {
    fn from(v: NodeRef) -> Self {
        Self::Node(v)
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Double(d) => write!(f, "{d}e0"),
            Self::String(s) => write!(f, "\"{s}\""),
            Self::Untyped(s) => write!(f, "untyped(\"{s}\")"),
            Self::Node(n) => write!(f, "node({}.{})", n.tree, n.order),
        }
    }
}
