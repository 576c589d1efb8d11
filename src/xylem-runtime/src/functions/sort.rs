//! Node sorting and duplicate elimination.

use std::collections::HashSet;

use common_error::{dynamic_err, XylemResult};
use serde::{Deserialize, Serialize};
use xylem_core::{Item, NodeRef};

/// Direction of a document-order sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// What a sort/distinct iterator does to its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortDistinctMode {
    /// Sort into (reverse) document order, or keep input order.
    pub order: Option<SortOrder>,
    /// Drop repeated nodes.
    pub distinct: bool,
    /// Pass a sequence made only of atomic values through unchanged
    /// instead of raising an error.
    pub allow_atomics: bool,
}

impl SortDistinctMode {
    pub const fn new(order: Option<SortOrder>, distinct: bool, allow_atomics: bool) -> Self {
        Self {
            order,
            distinct,
            allow_atomics,
        }
    }

    /// Whether the iterator changes its input at all.
    pub fn is_noop(&self) -> bool {
        self.order.is_none() && !self.distinct
    }

    pub fn apply(&self, items: Vec<Item>) -> XylemResult<Vec<Item>> {
        let node_count = items.iter().filter(|i| i.is_node()).count();
        if node_count == 0 && !items.is_empty() {
            if self.allow_atomics {
                return Ok(items);
            }
            dynamic_err!(XPTY0004, "node sort applied to atomic values");
        }
        if node_count != items.len() {
            dynamic_err!(XPTY0018, "sequence mixes nodes and atomic values");
        }

        let mut nodes: Vec<NodeRef> = items.iter().filter_map(Item::as_node).collect();
        match self.order {
            Some(order) => {
                nodes.sort_unstable();
                if self.distinct {
                    nodes.dedup();
                }
                if order == SortOrder::Descending {
                    nodes.reverse();
                }
            }
            None if self.distinct => {
                let mut seen = HashSet::new();
                nodes.retain(|n| seen.insert(*n));
            }
            None => {}
        }
        Ok(nodes.into_iter().map(Item::Node).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(orders: &[u32]) -> Vec<Item> {
        orders.iter().map(|o| Item::Node(NodeRef::new(0, *o))).collect()
    }

    #[test]
    fn test_sort_distinct() {
        let mode = SortDistinctMode::new(Some(SortOrder::Ascending), true, false);
        assert_eq!(mode.apply(nodes(&[3, 1, 3, 2])).unwrap(), nodes(&[1, 2, 3]));

        let mode = SortDistinctMode::new(Some(SortOrder::Descending), false, false);
        assert_eq!(mode.apply(nodes(&[3, 1, 3])).unwrap(), nodes(&[3, 3, 1]));

        let mode = SortDistinctMode::new(None, true, false);
        assert_eq!(mode.apply(nodes(&[3, 1, 3])).unwrap(), nodes(&[3, 1]));
    }

    #[test]
    fn test_atomics() {
        let atomics = vec![Item::Integer(2), Item::Integer(1)];
        let lenient = SortDistinctMode::new(Some(SortOrder::Ascending), true, true);
        assert_eq!(lenient.apply(atomics.clone()).unwrap(), atomics);

        let strict = SortDistinctMode::new(Some(SortOrder::Ascending), true, false);
        assert!(strict.apply(atomics).is_err());

        let mut mixed = nodes(&[1]);
        mixed.push(Item::Integer(1));
        assert!(lenient.apply(mixed).is_err());
    }
}
