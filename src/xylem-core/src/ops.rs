//! Operator kinds shared by the expression tree and the plan.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Navigation axis of a path step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    SelfAxis,
}

impl Axis {
    /// Whether the axis only moves downward in the tree.
    pub fn is_forward(self) -> bool {
        !matches!(self, Self::Parent)
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Child => "child",
            Self::Descendant => "descendant",
            Self::DescendantOrSelf => "descendant-or-self",
            Self::Parent => "parent",
            Self::SelfAxis => "self",
        };
        f.write_str(s)
    }
}

/// Node test of a path step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeTest {
    /// `node()`
    AnyNode,
    /// `text()`
    Text,
    /// `*` or a named element.
    Element(Option<String>),
}

impl fmt::Display for NodeTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnyNode => f.write_str("node()"),
            Self::Text => f.write_str("text()"),
            Self::Element(None) => f.write_str("*"),
            Self::Element(Some(name)) => f.write_str(name),
        }
    }
}

/// `some` or `every`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Quantifier {
    Some,
    Every,
}

/// Kind of a type test expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TypeOp {
    /// `instance of`: yields a boolean.
    InstanceOf,
    /// `treat as`: passes the input through or raises `XPDY0050`.
    Treat,
    /// Argument/return conversion check: passes through or raises `XPTY0004`.
    Coerce,
}

/// Kind of an update primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UpdateKind {
    InsertInto,
    Delete,
    ReplaceValue,
    Rename,
}

impl UpdateKind {
    /// Whether the primitive takes a source operand besides its target.
    pub fn has_source(self) -> bool {
        !matches!(self, Self::Delete)
    }
}
