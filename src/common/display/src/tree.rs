//! Tree display for arena-backed structures.
//!
//! Nodes are lightweight views (typically an arena reference plus an
//! index), so children are produced by value rather than borrowed.

use std::fmt;

/// A view of one node in a displayable tree.
pub trait TreeNode: Sized {
    /// Display name of this node.
    fn name(&self) -> String;

    /// Child views, in display order.
    fn children(&self) -> Vec<Self>;

    /// Additional details shown after the name.
    fn details(&self) -> Option<String> {
        None
    }
}

/// Renders a tree with box-drawing connectors.
pub struct DisplayTree<T> {
    root: T,
}

impl<T: TreeNode> DisplayTree<T> {
    /// Create a new display tree.
    pub fn new(root: T) -> Self {
        Self { root }
    }

    fn write_label(f: &mut fmt::Formatter<'_>, node: &T) -> fmt::Result {
        write!(f, "{}", node.name())?;
        if let Some(details) = node.details() {
            write!(f, " ({details})")?;
        }
        writeln!(f)
    }

    fn fmt_children(f: &mut fmt::Formatter<'_>, node: &T, prefix: &str) -> fmt::Result {
        let children = node.children();
        let last = children.len().saturating_sub(1);
        for (i, child) in children.iter().enumerate() {
            let connector = if i == last { "└─ " } else { "├─ " };
            write!(f, "{prefix}{connector}")?;
            Self::write_label(f, child)?;
            let pad = if i == last { "   " } else { "│  " };
            Self::fmt_children(f, child, &format!("{prefix}{pad}"))?;
        }
        Ok(())
    }
}

impl<T: TreeNode> fmt::Display for DisplayTree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Self::write_label(f, &self.root)?;
        Self::fmt_children(f, &self.root, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::truncate_string;

    #[derive(Clone, Copy)]
    struct View<'a> {
        nodes: &'a [(&'a str, &'a [usize])],
        idx: usize,
    }

    impl TreeNode for View<'_> {
        fn name(&self) -> String {
            self.nodes[self.idx].0.to_string()
        }

        fn children(&self) -> Vec<Self> {
            self.nodes[self.idx]
                .1
                .iter()
                .map(|&idx| View { idx, ..*self })
                .collect()
        }

        fn details(&self) -> Option<String> {
            (self.idx == 0).then(|| "root".to_string())
        }
    }

    #[test]
    fn test_display_tree() {
        let nodes: &[(&str, &[usize])] = &[
            ("Flwor", &[1, 2]),
            ("For", &[3]),
            ("Return", &[]),
            ("Literal", &[]),
        ];
        let output = DisplayTree::new(View { nodes, idx: 0 }).to_string();
        assert_eq!(
            output,
            "Flwor (root)\n├─ For\n│  └─ Literal\n└─ Return\n"
        );
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate_string("abc", 5), "abc");
        assert_eq!(truncate_string("abcdefgh", 6), "abc...");
    }
}
