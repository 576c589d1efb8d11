//! State shared by the rules of one pass.

use std::collections::BTreeSet;

use common_config::RewriterConfig;
use xylem_catalog::FunctionCatalog;
use xylem_core::{Item, SequenceType};
use xylem_ir::{AnnotationKey, ExprArena, ExprId, ExprKind, StaticContext, Tristate, VarId};

/// What a rule sees while rewriting.
///
/// Annotations are recomputed at the start of every pass. Nodes created
/// during the pass carry none, so every key reads `Maybe` on them and
/// rules that depend on annotations decline until the next pass.
pub struct RewriteContext<'a> {
    pub arena: &'a mut ExprArena,
    pub sctx: &'a StaticContext,
    pub catalog: &'a FunctionCatalog,
    pub config: &'a RewriterConfig,
}

impl<'a> RewriteContext<'a> {
    pub fn new(
        arena: &'a mut ExprArena,
        sctx: &'a StaticContext,
        catalog: &'a FunctionCatalog,
        config: &'a RewriterConfig,
    ) -> Self {
        Self {
            arena,
            sctx,
            catalog,
            config,
        }
    }

    pub fn annotation(&self, id: ExprId, key: AnnotationKey) -> Tristate {
        self.arena.node(id).annotations.get(key)
    }

    pub fn is_yes(&self, id: ExprId, key: AnnotationKey) -> bool {
        self.annotation(id, key).is_yes()
    }

    /// Static type from the last annotation pass, if the node existed then.
    pub fn static_type(&self, id: ExprId) -> Option<SequenceType> {
        self.arena.node(id).static_type
    }

    /// Free variables of the subtree as it is now.
    pub fn free_vars(&self, id: ExprId) -> BTreeSet<VarId> {
        self.arena.free_vars(id)
    }

    /// Whether the subtree can be evaluated any number of times, or not at
    /// all, without changing the result.
    pub fn is_pure(&self, id: ExprId) -> bool {
        self.is_yes(id, AnnotationKey::Deterministic) && self.is_yes(id, AnnotationKey::SideEffectFree)
    }

    /// Hand the consumer context of `old` to its replacement.
    ///
    /// The replacement takes over the old node's position, so it inherits
    /// what the parent asked of that position and, when it has none yet,
    /// the old static type.
    pub fn replace(&mut self, old: ExprId, new: ExprId) -> ExprId {
        if old == new {
            return new;
        }
        let from = self.arena.node(old).clone();
        let node = self.arena.node_mut(new);
        node.annotations.inherit_consumer_keys(&from.annotations);
        if node.static_type.is_none() {
            node.static_type = from.static_type;
        }
        new
    }

    /// Allocate a literal carrying its exact static type.
    pub fn literal(&mut self, items: Vec<Item>) -> ExprId {
        let ty = SequenceType::of_items(&items);
        let id = self.arena.literal(items);
        self.arena.node_mut(id).static_type = Some(ty);
        id
    }

    pub fn is_literal(&self, id: ExprId) -> bool {
        matches!(self.arena.kind(id), ExprKind::Literal(_))
    }
}
