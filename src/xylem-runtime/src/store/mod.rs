//! Node store interface.
//!
//! The physical store is an external collaborator. Iterators reach it only
//! through [`NodeStore`], whose implementations are responsible for their
//! own locking discipline.

mod memory;

use common_error::XylemResult;
use xylem_core::{Item, NodeRef};

pub use memory::{DocumentBuilder, MemoryNodeStore};

/// Kind of a stored node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Document,
    Element,
    Text,
}

/// Thread-safe access to stored and constructed nodes.
pub trait NodeStore: Send + Sync {
    /// Root node of the document registered under `uri`.
    fn document(&self, uri: &str) -> Option<NodeRef>;

    fn kind(&self, node: NodeRef) -> Option<NodeKind>;

    /// Element name, `None` for other kinds.
    fn name(&self, node: NodeRef) -> Option<String>;

    fn parent(&self, node: NodeRef) -> Option<NodeRef>;

    /// Children in document order.
    fn children(&self, node: NodeRef) -> Vec<NodeRef>;

    /// Descendants in document order, excluding `node`.
    fn descendants(&self, node: NodeRef) -> Vec<NodeRef>;

    /// Concatenated text content.
    fn string_value(&self, node: NodeRef) -> String;

    /// Create a new element tree. Node items are copied, adjacent atomic
    /// items become one text node joined by spaces.
    fn create_element(&self, name: &str, content: &[Item]) -> XylemResult<NodeRef>;

    /// Create a standalone text node.
    fn create_text(&self, text: &str) -> XylemResult<NodeRef>;
}
