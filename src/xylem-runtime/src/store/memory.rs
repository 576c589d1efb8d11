//! In-memory node store.

use std::collections::HashMap;

use common_error::{XylemError, XylemResult};
use parking_lot::RwLock;
use xylem_core::{Item, NodeRef};

use super::{NodeKind, NodeStore};
use crate::functions::canonical_string;

#[derive(Debug, Clone)]
struct StoredNode {
    kind: NodeKind,
    name: Option<String>,
    text: Option<String>,
    parent: Option<u32>,
    children: Vec<u32>,
    /// Order of the last descendant; equals the node's own order for leaves.
    last: u32,
}

#[derive(Debug, Clone, Default)]
struct Tree {
    nodes: Vec<StoredNode>,
}

impl Tree {
    fn push(&mut self, kind: NodeKind, name: Option<String>, text: Option<String>, parent: Option<u32>) -> u32 {
        let order = self.nodes.len() as u32;
        self.nodes.push(StoredNode {
            kind,
            name,
            text,
            parent,
            children: Vec::new(),
            last: order,
        });
        if let Some(p) = parent {
            self.nodes[p as usize].children.push(order);
        }
        order
    }

    /// Recompute `last` for every node. Nodes are numbered in pre-order,
    /// so a reverse sweep sees children before parents.
    fn seal(&mut self) {
        for i in (0..self.nodes.len()).rev() {
            let last = self.nodes[i]
                .children
                .last()
                .map_or(i as u32, |&c| self.nodes[c as usize].last);
            self.nodes[i].last = last;
        }
    }

    /// Copy the subtree rooted at `from` (of `source`) under `parent`.
    fn copy_subtree(&mut self, source: &Tree, from: u32, parent: Option<u32>) {
        let node = &source.nodes[from as usize];
        if node.kind == NodeKind::Document {
            for &child in &node.children {
                self.copy_subtree(source, child, parent);
            }
            return;
        }
        let copied = self.push(node.kind, node.name.clone(), node.text.clone(), parent);
        for &child in &node.children {
            self.copy_subtree(source, child, Some(copied));
        }
    }
}

/// Builds a document tree in pre-order.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    tree: Tree,
    open: Vec<u32>,
}

impl DocumentBuilder {
    /// Start a document; every following node is a descendant of its root.
    pub fn new() -> Self {
        let mut tree = Tree::default();
        let root = tree.push(NodeKind::Document, None, None, None);
        Self {
            tree,
            open: vec![root],
        }
    }

    /// Open an element.
    #[must_use]
    pub fn start(mut self, name: &str) -> Self {
        let parent = self.open.last().copied();
        let id = self
            .tree
            .push(NodeKind::Element, Some(name.to_string()), None, parent);
        self.open.push(id);
        self
    }

    /// Add a text node to the open element.
    #[must_use]
    pub fn text(mut self, text: &str) -> Self {
        let parent = self.open.last().copied();
        self.tree
            .push(NodeKind::Text, None, Some(text.to_string()), parent);
        self
    }

    /// Add `<name>text</name>`.
    #[must_use]
    pub fn leaf(self, name: &str, text: &str) -> Self {
        self.start(name).text(text).end()
    }

    /// Close the innermost open element.
    #[must_use]
    pub fn end(mut self) -> Self {
        if self.open.len() > 1 {
            self.open.pop();
        }
        self
    }

    fn finish(mut self) -> Tree {
        self.tree.seal();
        self.tree
    }
}

#[derive(Debug, Default)]
struct Inner {
    trees: Vec<Tree>,
    documents: HashMap<String, u32>,
}

/// A store holding every tree in memory behind a reader-writer lock.
#[derive(Debug, Default)]
pub struct MemoryNodeStore {
    inner: RwLock<Inner>,
}

impl MemoryNodeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a document under `uri` and return its root.
    pub fn load(&self, uri: &str, builder: DocumentBuilder) -> NodeRef {
        let mut inner = self.inner.write();
        let tree_id = inner.trees.len() as u32;
        inner.trees.push(builder.finish());
        inner.documents.insert(uri.to_string(), tree_id);
        NodeRef::new(tree_id, 0)
    }

    /// Number of trees, including constructed ones.
    pub fn tree_count(&self) -> usize {
        self.inner.read().trees.len()
    }

    fn with_node<T>(&self, node: NodeRef, f: impl FnOnce(&Tree, &StoredNode) -> T) -> Option<T> {
        let inner = self.inner.read();
        let tree = inner.trees.get(node.tree as usize)?;
        let stored = tree.nodes.get(node.order as usize)?;
        Some(f(tree, stored))
    }

    fn insert_tree(&self, tree: Tree) -> NodeRef {
        let mut inner = self.inner.write();
        let tree_id = inner.trees.len() as u32;
        inner.trees.push(tree);
        NodeRef::new(tree_id, 0)
    }
}

impl NodeStore for MemoryNodeStore {
    fn document(&self, uri: &str) -> Option<NodeRef> {
        let inner = self.inner.read();
        inner.documents.get(uri).map(|&t| NodeRef::new(t, 0))
    }

    fn kind(&self, node: NodeRef) -> Option<NodeKind> {
        self.with_node(node, |_, n| n.kind)
    }

    fn name(&self, node: NodeRef) -> Option<String> {
        self.with_node(node, |_, n| n.name.clone()).flatten()
    }

    fn parent(&self, node: NodeRef) -> Option<NodeRef> {
        self.with_node(node, |_, n| n.parent)
            .flatten()
            .map(|p| NodeRef::new(node.tree, p))
    }

    fn children(&self, node: NodeRef) -> Vec<NodeRef> {
        self.with_node(node, |_, n| {
            n.children
                .iter()
                .map(|&c| NodeRef::new(node.tree, c))
                .collect()
        })
        .unwrap_or_default()
    }

    fn descendants(&self, node: NodeRef) -> Vec<NodeRef> {
        self.with_node(node, |_, n| {
            (node.order + 1..=n.last)
                .map(|o| NodeRef::new(node.tree, o))
                .collect()
        })
        .unwrap_or_default()
    }

    fn string_value(&self, node: NodeRef) -> String {
        self.with_node(node, |tree, n| {
            (node.order..=n.last)
                .filter_map(|o| tree.nodes[o as usize].text.as_deref())
                .collect()
        })
        .unwrap_or_default()
    }

    fn create_element(&self, name: &str, content: &[Item]) -> XylemResult<NodeRef> {
        let mut tree = Tree::default();
        let root = tree.push(NodeKind::Element, Some(name.to_string()), None, None);
        let mut pending_text: Vec<String> = Vec::new();

        {
            let inner = self.inner.read();
            for item in content {
                match item {
                    Item::Node(node) => {
                        if !pending_text.is_empty() {
                            tree.push(NodeKind::Text, None, Some(pending_text.join(" ")), Some(root));
                            pending_text.clear();
                        }
                        let source = inner.trees.get(node.tree as usize).ok_or_else(|| {
                            XylemError::internal(format!("dangling node reference {node:?}"))
                        })?;
                        tree.copy_subtree(source, node.order, Some(root));
                    }
                    atomic => pending_text.push(canonical_string(atomic)),
                }
            }
        }
        if !pending_text.is_empty() {
            tree.push(NodeKind::Text, None, Some(pending_text.join(" ")), Some(root));
        }

        tree.seal();
        Ok(self.insert_tree(tree))
    }

    fn create_text(&self, text: &str) -> XylemResult<NodeRef> {
        let mut tree = Tree::default();
        tree.push(NodeKind::Text, None, Some(text.to_string()), None);
        Ok(self.insert_tree(tree))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DocumentBuilder {
        DocumentBuilder::new()
            .start("books")
            .start("book")
            .leaf("title", "Dune")
            .leaf("year", "1965")
            .end()
            .start("book")
            .leaf("title", "Emma")
            .end()
            .end()
    }

    #[test]
    fn test_navigation() {
        let store = MemoryNodeStore::new();
        let doc = store.load("books.xml", sample());
        assert_eq!(store.document("books.xml"), Some(doc));
        assert_eq!(store.kind(doc), Some(NodeKind::Document));

        let books = store.children(doc);
        assert_eq!(books.len(), 1);
        assert_eq!(store.name(books[0]).as_deref(), Some("books"));

        let book_list = store.children(books[0]);
        assert_eq!(book_list.len(), 2);
        assert_eq!(store.parent(book_list[1]), Some(books[0]));
        assert_eq!(store.string_value(book_list[0]), "Dune1965");

        let all = store.descendants(doc);
        assert!(all.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(all.len(), 9);
    }

    #[test]
    fn test_create_element_copies_content() {
        let store = MemoryNodeStore::new();
        let doc = store.load("books.xml", sample());
        let title = store.descendants(doc)[2];

        let created = store
            .create_element("wrap", &[Item::from(1i64), Item::from("x"), Item::Node(title)])
            .unwrap();
        assert_eq!(store.name(created).as_deref(), Some("wrap"));
        assert_eq!(store.string_value(created), "1 xDune");
        assert_ne!(store.children(created)[1], title);
        assert!(created > doc);
    }
}
