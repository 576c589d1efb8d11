//! Static-property annotations attached to expression nodes.
//!
//! Tri-state properties live on the lattice `{Yes, No, Maybe}` where
//! `Maybe` is the conservative top. Producer properties (what a node's
//! result looks like) are derived bottom-up; consumer properties (what a
//! node's parent cares about) are pushed top-down.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use crate::VarId;

/// A lattice value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Tristate {
    Yes,
    No,
    #[default]
    Maybe,
}

impl Tristate {
    pub fn from_bool(b: bool) -> Self {
        if b {
            Self::Yes
        } else {
            Self::No
        }
    }

    /// The weaker of two values: equal values are kept, anything else is `Maybe`.
    #[must_use]
    pub fn combine(self, other: Self) -> Self {
        if self == other {
            self
        } else {
            Self::Maybe
        }
    }

    /// Whether the value carries information.
    pub fn is_precise(self) -> bool {
        self != Self::Maybe
    }

    pub fn is_yes(self) -> bool {
        self == Self::Yes
    }

    pub fn is_no(self) -> bool {
        self == Self::No
    }
}

/// Enumerated annotation keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationKey {
    /// Set of variables referenced but not bound inside the subtree.
    FreeVars,
    Deterministic,
    SideEffectFree,
    /// The result may contain the same node twice.
    ProducesDuplicates,
    /// The result is in document order.
    ProducesSortedNodes,
    RequiresDynamicContext,
    /// The consumer of this node does not depend on result order.
    IgnoresSortedNodes,
    /// The consumer of this node does not depend on duplicate nodes.
    IgnoresDuplicates,
    /// Evaluating the subtree at compile time would change behavior.
    Unfoldable,
    /// The subtree is costly or yields large results if folded.
    Expensive,
}

impl AnnotationKey {
    /// Keys pushed from parent to child.
    pub const CONSUMER: [Self; 2] = [Self::IgnoresSortedNodes, Self::IgnoresDuplicates];

    pub fn is_consumer(self) -> bool {
        Self::CONSUMER.contains(&self)
    }
}

/// Value stored under an annotation key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationValue {
    Tristate(Tristate),
    VarSet(BTreeSet<VarId>),
}

/// Per-node annotation map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationHolder {
    values: BTreeMap<AnnotationKey, AnnotationValue>,
}

impl AnnotationHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tri-state value of `key`; absent keys read as `Maybe`.
    pub fn get(&self, key: AnnotationKey) -> Tristate {
        match self.values.get(&key) {
            Some(AnnotationValue::Tristate(t)) => *t,
            _ => Tristate::Maybe,
        }
    }

    /// Whether `key` has been written since the last clear.
    pub fn contains(&self, key: AnnotationKey) -> bool {
        self.values.contains_key(&key)
    }

    /// Record a value, combining with any value already present.
    pub fn update(&mut self, key: AnnotationKey, value: Tristate) {
        match self.values.entry(key) {
            Entry::Vacant(e) => {
                e.insert(AnnotationValue::Tristate(value));
            }
            Entry::Occupied(mut e) => {
                let old = match e.get() {
                    AnnotationValue::Tristate(t) => *t,
                    AnnotationValue::VarSet(_) => Tristate::Maybe,
                };
                e.insert(AnnotationValue::Tristate(old.combine(value)));
            }
        }
    }

    /// Narrow `key` to a precise value.
    ///
    /// Only a `Maybe` (or absent) value may change; returns whether it did.
    pub fn refine(&mut self, key: AnnotationKey, value: Tristate) -> bool {
        if !value.is_precise() || self.get(key).is_precise() {
            return false;
        }
        self.values.insert(key, AnnotationValue::Tristate(value));
        true
    }

    /// Overwrite `key` unconditionally. Used by derivation at the start of a pass.
    pub fn set(&mut self, key: AnnotationKey, value: Tristate) {
        self.values.insert(key, AnnotationValue::Tristate(value));
    }

    pub fn free_vars(&self) -> Option<&BTreeSet<VarId>> {
        match self.values.get(&AnnotationKey::FreeVars) {
            Some(AnnotationValue::VarSet(vars)) => Some(vars),
            _ => None,
        }
    }

    pub fn set_free_vars(&mut self, vars: BTreeSet<VarId>) {
        self.values
            .insert(AnnotationKey::FreeVars, AnnotationValue::VarSet(vars));
    }

    /// Copy consumer keys from another holder, e.g. onto a replacement node.
    pub fn inherit_consumer_keys(&mut self, other: &AnnotationHolder) {
        for key in AnnotationKey::CONSUMER {
            if let Some(v) = other.values.get(&key) {
                self.values.insert(key, v.clone());
            }
        }
    }

    /// Drop every derived value at the start of an annotation pass.
    pub fn begin_pass(&mut self) {
        self.values.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
