//! Pending update list.

use xylem_core::{Item, NodeRef, UpdateKind};

/// An update primitive recorded during execution.
///
/// Updates are collected per execution and never applied by the
/// iterators themselves; the caller decides when to apply the list.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingUpdate {
    pub kind: UpdateKind,
    pub target: NodeRef,
    /// Source operand, empty for deletes.
    pub source: Vec<Item>,
}

impl PendingUpdate {
    pub fn new(kind: UpdateKind, target: NodeRef, source: Vec<Item>) -> Self {
        Self {
            kind,
            target,
            source,
        }
    }
}
