//! Display utilities for Xylem.
//!
//! Provides tree rendering used by `explain` on expression trees and plans.

mod tree;

pub use tree::{DisplayTree, TreeNode};

/// Truncate a string for display, appending `...` when cut.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}
