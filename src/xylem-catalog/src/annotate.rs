//! Annotation pass.
//!
//! Computes the static type and tri-state properties of every node
//! reachable from a query's main expression and function bodies.
//!
//! # Lifecycle
//!
//! ```text
//! begin_pass ──► producers (bottom-up) ──► consumers (top-down)
//! ```
//!
//! Every pass starts from cleared holders, so values never carry over from
//! a tree that has since been rewritten. Within a pass, each key is written
//! once per node.

use std::collections::{HashMap, HashSet};

use common_error::{ErrorCode, XylemError, XylemResult};
use xylem_core::{Axis, ItemType, NodeRef, Occurrence, SequenceType, TypeOp};
use xylem_ir::{
    AnnotationKey, Clause, ExprArena, ExprId, ExprKind, FunctionId, QueryModule, StaticContext,
    Tristate, VarId,
};

use crate::entry::{FunctionCatalog, Producer, Propagation};

/// Annotate a whole module.
pub fn annotate_module(module: &mut QueryModule, catalog: &FunctionCatalog) -> XylemResult<()> {
    annotate(&mut module.arena, module.root, &module.context, catalog)
}

/// Annotate the tree rooted at `root` and every declared function body.
///
/// # Errors
///
/// Static errors: `XPST0008` for an unbound variable, `XPST0017` for a
/// call with the wrong arity and `XPTY0004` for an argument that can never
/// match its parameter.
pub fn annotate(
    arena: &mut ExprArena,
    root: ExprId,
    sctx: &StaticContext,
    catalog: &FunctionCatalog,
) -> XylemResult<()> {
    let mut roots: Vec<ExprId> = sctx.functions.iter().map(|f| f.body).collect();
    roots.push(root);
    for id in roots.iter().flat_map(|r| arena.descendants(*r)).collect::<Vec<_>>() {
        let node = arena.node_mut(id);
        node.annotations.begin_pass();
        node.static_type = None;
    }

    let mut annotator = Annotator {
        arena,
        sctx,
        catalog,
        vars: HashMap::new(),
        functions: HashMap::new(),
    };
    for function in &sctx.functions {
        for (var, ty) in &function.params {
            let (duplicates, sorted) = default_order(ty);
            annotator.vars.insert(
                *var,
                VarFacts {
                    ty: *ty,
                    duplicates,
                    sorted,
                },
            );
        }
        annotator.producer(function.body)?;
        annotator.consumer(function.body, Tristate::No, Tristate::No);
    }
    annotator.producer(root)?;
    annotator.consumer(root, Tristate::No, Tristate::No);
    log::trace!("Annotated {} nodes", annotator.arena.len());
    Ok(())
}

/// Whether the result of `id` may contain the same node twice.
pub fn produces_duplicates(arena: &ExprArena, id: ExprId) -> bool {
    !arena
        .node(id)
        .annotations
        .get(AnnotationKey::ProducesDuplicates)
        .is_no()
}

/// Whether the result of `id` is proven to be in document order.
pub fn produces_sorted_nodes(arena: &ExprArena, id: ExprId) -> bool {
    arena
        .node(id)
        .annotations
        .get(AnnotationKey::ProducesSortedNodes)
        .is_yes()
}

/// Static type from the last pass, `item()*` when unknown.
pub fn static_type(arena: &ExprArena, id: ExprId) -> SequenceType {
    arena.node(id).static_type.unwrap_or_else(SequenceType::any)
}

/// Producer values implied by a type alone.
pub fn default_order(ty: &SequenceType) -> (Tristate, Tristate) {
    if ty.is_singleton_or_empty() || ty.is_builtin_atomic() {
        (Tristate::No, Tristate::Yes)
    } else {
        (Tristate::Maybe, Tristate::Maybe)
    }
}

// ============================================================================
// Annotator
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct VarFacts {
    ty: SequenceType,
    duplicates: Tristate,
    sorted: Tristate,
}

/// Effects of a declared function, including everything it calls.
#[derive(Debug, Clone, Copy)]
struct FunctionFacts {
    deterministic: bool,
    side_effect_free: bool,
    requires_dynamic_context: bool,
}

/// Properties a node contributes on its own, before its children.
#[derive(Debug, Clone, Copy)]
struct OwnFacts {
    ty: SequenceType,
    deterministic: bool,
    side_effect_free: bool,
    requires_dynamic_context: bool,
    unfoldable: bool,
    expensive: bool,
    duplicates: Tristate,
    sorted: Tristate,
}

impl OwnFacts {
    fn new(ty: SequenceType) -> Self {
        let (duplicates, sorted) = default_order(&ty);
        Self {
            ty,
            deterministic: true,
            side_effect_free: true,
            requires_dynamic_context: false,
            unfoldable: false,
            expensive: false,
            duplicates,
            sorted,
        }
    }

    fn with_order(mut self, duplicates: Tristate, sorted: Tristate) -> Self {
        self.duplicates = duplicates;
        self.sorted = sorted;
        self
    }
}

struct Annotator<'a> {
    arena: &'a mut ExprArena,
    sctx: &'a StaticContext,
    catalog: &'a FunctionCatalog,
    vars: HashMap<VarId, VarFacts>,
    functions: HashMap<FunctionId, FunctionFacts>,
}

impl Annotator<'_> {
    fn facts_of(&self, id: ExprId) -> VarFacts {
        let node = self.arena.node(id);
        VarFacts {
            ty: node.static_type.unwrap_or_else(SequenceType::any),
            duplicates: node.annotations.get(AnnotationKey::ProducesDuplicates),
            sorted: node.annotations.get(AnnotationKey::ProducesSortedNodes),
        }
    }

    fn type_of(&self, id: ExprId) -> SequenceType {
        static_type(self.arena, id)
    }

    fn bind_item(&mut self, var: VarId, domain: SequenceType) {
        let ty = if domain.is_empty() {
            SequenceType::empty()
        } else {
            SequenceType::one(domain.item)
        };
        self.vars.insert(
            var,
            VarFacts {
                ty,
                duplicates: Tristate::No,
                sorted: Tristate::Yes,
            },
        );
    }

    fn bind_position(&mut self, var: VarId) {
        self.bind_item(var, SequenceType::one(ItemType::Integer));
    }

    // ========== Producers ==========

    fn producer(&mut self, id: ExprId) -> XylemResult<()> {
        let kind = self.arena.kind(id).clone();
        self.visit_children(&kind)?;
        let own = self.own_facts(&kind)?;

        let children = kind.children();
        let all = |key: AnnotationKey, own: bool| {
            own && children
                .iter()
                .all(|c| self.arena.node(*c).annotations.get(key).is_yes())
        };
        let any = |key: AnnotationKey, own: bool| {
            own || children
                .iter()
                .any(|c| self.arena.node(*c).annotations.get(key).is_yes())
        };
        let deterministic = all(AnnotationKey::Deterministic, own.deterministic);
        let side_effect_free = all(AnnotationKey::SideEffectFree, own.side_effect_free);
        let dynamic = any(AnnotationKey::RequiresDynamicContext, own.requires_dynamic_context);
        let unfoldable = any(AnnotationKey::Unfoldable, own.unfoldable);
        let expensive = any(AnnotationKey::Expensive, own.expensive);

        let (duplicates, sorted) = match default_order(&own.ty) {
            (Tristate::No, Tristate::Yes) => (Tristate::No, Tristate::Yes),
            _ => (own.duplicates, own.sorted),
        };

        let arena: &ExprArena = &*self.arena;
        let free = arena.scoped_free_vars(id, |c| {
            arena
                .node(c)
                .annotations
                .free_vars()
                .cloned()
                .unwrap_or_default()
        });

        let node = self.arena.node_mut(id);
        node.static_type = Some(own.ty);
        let holder = &mut node.annotations;
        holder.set_free_vars(free);
        holder.set(AnnotationKey::Deterministic, Tristate::from_bool(deterministic));
        holder.set(AnnotationKey::SideEffectFree, Tristate::from_bool(side_effect_free));
        holder.set(AnnotationKey::RequiresDynamicContext, Tristate::from_bool(dynamic));
        holder.set(AnnotationKey::Unfoldable, Tristate::from_bool(unfoldable));
        holder.set(AnnotationKey::Expensive, Tristate::from_bool(expensive));
        holder.set(AnnotationKey::ProducesDuplicates, duplicates);
        holder.set(AnnotationKey::ProducesSortedNodes, sorted);
        Ok(())
    }

    /// Annotate children, binding variables in scope order.
    fn visit_children(&mut self, kind: &ExprKind) -> XylemResult<()> {
        match kind {
            ExprKind::Flwor(f) => {
                for clause in &f.clauses {
                    match clause {
                        Clause::For {
                            var,
                            position,
                            domain,
                        } => {
                            self.producer(*domain)?;
                            self.bind_item(*var, self.type_of(*domain));
                            if let Some(p) = position {
                                self.bind_position(*p);
                            }
                        }
                        Clause::Let { var, domain } => {
                            self.producer(*domain)?;
                            let facts = self.facts_of(*domain);
                            self.vars.insert(*var, facts);
                        }
                        Clause::Where(cond) => self.producer(*cond)?,
                        Clause::OrderBy(specs) => {
                            for key in specs {
                                self.producer(key.expr)?;
                            }
                        }
                    }
                }
                self.producer(f.ret)
            }
            ExprKind::Filter {
                input,
                predicate,
                dot,
                position,
            } => {
                self.producer(*input)?;
                self.bind_item(*dot, self.type_of(*input));
                if let Some(p) = position {
                    self.bind_position(*p);
                }
                self.producer(*predicate)
            }
            ExprKind::Quantified {
                var,
                domain,
                satisfies,
                ..
            } => {
                self.producer(*domain)?;
                self.bind_item(*var, self.type_of(*domain));
                self.producer(*satisfies)
            }
            ExprKind::IndexProbe(p) => {
                self.producer(p.build)?;
                self.bind_item(p.build_var, self.type_of(p.build));
                self.producer(p.build_key)?;
                self.producer(p.probe_key)
            }
            other => {
                for child in other.children() {
                    self.producer(child)?;
                }
                Ok(())
            }
        }
    }

    fn own_facts(&mut self, kind: &ExprKind) -> XylemResult<OwnFacts> {
        let facts = match kind {
            ExprKind::Literal(items) => {
                let nodes: Vec<NodeRef> = items.iter().filter_map(|i| i.as_node()).collect();
                let sorted = nodes.windows(2).all(|w| w[0] <= w[1]);
                let distinct = nodes.iter().collect::<HashSet<_>>().len() == nodes.len();
                OwnFacts::new(SequenceType::of_items(items))
                    .with_order(Tristate::from_bool(!distinct), Tristate::from_bool(sorted))
            }
            ExprKind::VarRef(var) => {
                let Some(facts) = self.vars.get(var) else {
                    return Err(XylemError::static_error(
                        ErrorCode::XPST0008,
                        format!("variable ${} is not in scope", self.arena.var_name(*var)),
                    ));
                };
                OwnFacts::new(facts.ty).with_order(facts.duplicates, facts.sorted)
            }
            ExprKind::Call { name, args } => {
                let entry = self.catalog.resolve(name, args.len())?;
                let arg_types: Vec<SequenceType> = args.iter().map(|a| self.type_of(*a)).collect();
                let ty = entry.type_check(&arg_types)?;
                let mut facts = OwnFacts::new(ty);
                facts.deterministic = entry.props.deterministic;
                facts.side_effect_free = entry.props.side_effect_free;
                facts.requires_dynamic_context = entry.props.requires_dynamic_context;
                facts.unfoldable = entry.props.unfoldable;
                facts.expensive = entry.props.expensive;
                let behavior = entry.annotations;
                let duplicates = self.produced(behavior.duplicates, args, facts.duplicates, |f| f.duplicates);
                let sorted = self.produced(behavior.sorted, args, facts.sorted, |f| f.sorted);
                facts.with_order(duplicates, sorted)
            }
            ExprKind::UserCall { function, args } => {
                let Some(declared) = self.sctx.function(*function) else {
                    return Err(XylemError::internal(format!(
                        "call of undeclared function #{}",
                        function.0
                    )));
                };
                if declared.params.len() != args.len() {
                    return Err(XylemError::arity_mismatch(
                        declared.name.to_string(),
                        declared.params.len().to_string(),
                        args.len(),
                    ));
                }
                let effects = self.function_facts(*function);
                let mut facts = OwnFacts::new(declared.return_type);
                facts.deterministic = effects.deterministic;
                facts.side_effect_free = effects.side_effect_free;
                facts.requires_dynamic_context = effects.requires_dynamic_context;
                facts.unfoldable = true;
                facts
            }
            ExprKind::Flwor(f) => {
                let mut occurrence = Occurrence::One;
                let mut iterates = false;
                for clause in &f.clauses {
                    match clause {
                        Clause::For { domain, .. } => {
                            let domain = self.type_of(*domain);
                            iterates |= !domain.is_singleton_or_empty();
                            occurrence = occurrence.product(domain.occurrence);
                        }
                        Clause::Where(_) => occurrence = occurrence.optional(),
                        Clause::Let { .. } | Clause::OrderBy(_) => {}
                    }
                }
                let ret = self.facts_of(f.ret);
                let occurrence = occurrence.product(ret.ty.occurrence);
                let ty = if occurrence == Occurrence::Empty {
                    SequenceType::empty()
                } else {
                    SequenceType::new(ret.ty.item, occurrence)
                };
                let facts = OwnFacts::new(ty);
                if iterates {
                    facts
                } else {
                    facts.with_order(ret.duplicates, ret.sorted)
                }
            }
            ExprKind::Filter {
                input, predicate, ..
            } => {
                let input = self.facts_of(*input);
                let predicate = self.type_of(*predicate);
                let positional = predicate.is_singleton_or_empty()
                    && predicate.item.is_subtype_of(ItemType::Numeric);
                let max = if positional {
                    input.ty.max_count().map_or(Some(1), |m| Some(m.min(1)))
                } else {
                    input.ty.max_count()
                };
                let occurrence = Occurrence::from_bounds(0, max);
                let ty = if occurrence == Occurrence::Empty {
                    SequenceType::empty()
                } else {
                    SequenceType::new(input.ty.item, occurrence)
                };
                OwnFacts::new(ty).with_order(input.duplicates, input.sorted)
            }
            ExprKind::PathStep { input, axis, .. } => {
                let input = self.facts_of(*input);
                let ty = if input.ty.is_empty() {
                    SequenceType::empty()
                } else if *axis == Axis::Parent || *axis == Axis::SelfAxis {
                    SequenceType::new(ItemType::Node, input.ty.occurrence.optional())
                } else {
                    SequenceType::star(ItemType::Node)
                };
                let single = input.ty.is_singleton_or_empty();
                let (duplicates, sorted) = match axis {
                    _ if single => (Tristate::No, Tristate::Yes),
                    Axis::SelfAxis => (input.duplicates, input.sorted),
                    Axis::Child if input.duplicates.is_no() => (Tristate::No, Tristate::Maybe),
                    _ => (Tristate::Maybe, Tristate::Maybe),
                };
                let mut facts = OwnFacts::new(ty).with_order(duplicates, sorted);
                facts.requires_dynamic_context = true;
                facts.unfoldable = true;
                facts
            }
            ExprKind::ElementCtor { .. } | ExprKind::TextCtor { .. } => {
                let mut facts = OwnFacts::new(SequenceType::one(ItemType::Node));
                // Every evaluation creates a node with a new identity.
                facts.deterministic = false;
                facts.requires_dynamic_context = true;
                facts.unfoldable = true;
                facts
            }
            ExprKind::If {
                then_branch,
                else_branch,
                ..
            } => {
                let (a, b) = (self.facts_of(*then_branch), self.facts_of(*else_branch));
                OwnFacts::new(a.ty.union(&b.ty))
                    .with_order(a.duplicates.combine(b.duplicates), a.sorted.combine(b.sorted))
            }
            ExprKind::Quantified { .. } => OwnFacts::new(SequenceType::one(ItemType::Boolean)),
            ExprKind::TypeTest { op, input, target } => match op {
                TypeOp::InstanceOf => OwnFacts::new(SequenceType::one(ItemType::Boolean)),
                TypeOp::Treat | TypeOp::Coerce => {
                    let input = self.facts_of(*input);
                    OwnFacts::new(*target).with_order(input.duplicates, input.sorted)
                }
            },
            ExprKind::Update { .. } => {
                let mut facts = OwnFacts::new(SequenceType::empty());
                facts.side_effect_free = false;
                facts.unfoldable = true;
                facts
            }
            ExprKind::IndexProbe(p) => {
                let build = self.facts_of(p.build);
                let ty = build.ty.with_occurrence(build.ty.occurrence.optional());
                let mut facts = OwnFacts::new(ty).with_order(build.duplicates, build.sorted);
                facts.unfoldable = true;
                facts
            }
        };
        Ok(facts)
    }

    /// Resolve a producer rule of a catalog entry.
    fn produced<F>(&self, rule: Producer, args: &[ExprId], default: Tristate, pick: F) -> Tristate
    where
        F: Fn(&VarFacts) -> Tristate,
    {
        match rule {
            Producer::Default => default,
            Producer::Fixed(value) => value,
            Producer::Input(i) => args
                .get(i)
                .map_or(Tristate::Maybe, |a| pick(&self.facts_of(*a))),
            Producer::Inputs => {
                let live: Vec<VarFacts> = args
                    .iter()
                    .map(|a| self.facts_of(*a))
                    .filter(|f| !f.ty.is_empty())
                    .collect();
                match live.as_slice() {
                    [] => default,
                    [only] => pick(only),
                    _ => Tristate::Maybe,
                }
            }
        }
    }

    /// Effects of a declared function and every function it reaches.
    fn function_facts(&mut self, id: FunctionId) -> FunctionFacts {
        if let Some(facts) = self.functions.get(&id) {
            return *facts;
        }
        let mut facts = FunctionFacts {
            deterministic: true,
            side_effect_free: true,
            requires_dynamic_context: false,
        };
        let mut seen = HashSet::from([id]);
        let mut work = vec![id];
        while let Some(current) = work.pop() {
            let Some(function) = self.sctx.function(current) else {
                continue;
            };
            for node in self.arena.descendants(function.body) {
                match self.arena.kind(node) {
                    ExprKind::Call { name, args } => {
                        if let Some(entry) = self.catalog.lookup(name, args.len()) {
                            facts.deterministic &= entry.props.deterministic;
                            facts.side_effect_free &= entry.props.side_effect_free;
                            facts.requires_dynamic_context |= entry.props.requires_dynamic_context;
                        }
                    }
                    ExprKind::UserCall { function, .. } => {
                        if seen.insert(*function) {
                            work.push(*function);
                        }
                    }
                    ExprKind::ElementCtor { .. } | ExprKind::TextCtor { .. } => {
                        facts.deterministic = false;
                        facts.requires_dynamic_context = true;
                    }
                    ExprKind::PathStep { .. } => facts.requires_dynamic_context = true,
                    ExprKind::Update { .. } => facts.side_effect_free = false,
                    _ => {}
                }
            }
        }
        self.functions.insert(id, facts);
        facts
    }

    // ========== Consumers ==========

    fn consumer(&mut self, id: ExprId, ignores_sorted: Tristate, ignores_duplicates: Tristate) {
        let holder = &mut self.arena.node_mut(id).annotations;
        holder.update(AnnotationKey::IgnoresSortedNodes, ignores_sorted);
        holder.update(AnnotationKey::IgnoresDuplicates, ignores_duplicates);
        let sorted = holder.get(AnnotationKey::IgnoresSortedNodes);
        let duplicates = holder.get(AnnotationKey::IgnoresDuplicates);

        let kind = self.arena.kind(id).clone();
        for (child, s, d) in self.child_consumers(&kind, sorted, duplicates) {
            self.consumer(child, s, d);
        }
    }

    /// Consumer values for each child of a node whose own consumer
    /// values are `sorted` and `duplicates`.
    fn child_consumers(
        &self,
        kind: &ExprKind,
        sorted: Tristate,
        duplicates: Tristate,
    ) -> Vec<(ExprId, Tristate, Tristate)> {
        use Tristate::{Maybe, Yes};

        let both = |ids: Vec<ExprId>, s: Tristate, d: Tristate| -> Vec<(ExprId, Tristate, Tristate)> {
            ids.into_iter().map(|c| (c, s, d)).collect()
        };

        match kind {
            ExprKind::Literal(_) | ExprKind::VarRef(_) => Vec::new(),
            ExprKind::Call { name, args } => {
                let Some(entry) = self.catalog.lookup(name, args.len()) else {
                    return both(args.clone(), Maybe, Maybe);
                };
                let apply = |p: Propagation, inherited: Tristate| match p {
                    Propagation::Conservative => Maybe,
                    Propagation::Inherit => inherited,
                    Propagation::Assert(value) => value,
                };
                let s = apply(entry.annotations.ignores_sorted, sorted);
                let d = apply(entry.annotations.ignores_duplicates, duplicates);
                both(args.clone(), s, d)
            }
            ExprKind::Flwor(f) => {
                let positional = f
                    .clauses
                    .iter()
                    .any(|c| matches!(c, Clause::For { position: Some(_), .. }));
                // Repeated or reordered tuples only repeat or reorder node
                // results, which the consumer already tolerates.
                let nodes_out = self.type_of(f.ret).item.is_subtype_of(ItemType::Node);
                let domain_s = if positional || f.has_order_by() || !nodes_out {
                    Maybe
                } else {
                    sorted
                };
                let domain_d = if positional || !nodes_out { Maybe } else { duplicates };

                let mut out = Vec::new();
                for clause in &f.clauses {
                    match clause {
                        Clause::For { domain, .. } => out.push((*domain, domain_s, domain_d)),
                        Clause::Let { domain, .. } => out.push((*domain, Maybe, Maybe)),
                        Clause::Where(cond) => out.push((*cond, Yes, Yes)),
                        Clause::OrderBy(specs) => {
                            out.extend(specs.iter().map(|s| (s.expr, Maybe, Maybe)));
                        }
                    }
                }
                out.push((f.ret, sorted, duplicates));
                out
            }
            ExprKind::PathStep { input, .. } => vec![(*input, sorted, duplicates)],
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => vec![
                (*cond, Yes, Yes),
                (*then_branch, sorted, duplicates),
                (*else_branch, sorted, duplicates),
            ],
            ExprKind::Quantified {
                domain, satisfies, ..
            } => vec![(*domain, Yes, Yes), (*satisfies, Yes, Yes)],
            ExprKind::TypeTest { op, input, .. } => match op {
                TypeOp::InstanceOf => vec![(*input, Yes, Maybe)],
                TypeOp::Treat | TypeOp::Coerce => vec![(*input, sorted, duplicates)],
            },
            other => both(other.children(), Maybe, Maybe),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use xylem_core::{Item, NodeTest, QName};
    use xylem_ir::UserFunction;

    fn catalog() -> FunctionCatalog {
        FunctionCatalog::builtin().unwrap()
    }

    fn get(arena: &ExprArena, id: ExprId, key: AnnotationKey) -> Tristate {
        arena.node(id).annotations.get(key)
    }

    #[test]
    fn test_literal_arithmetic() {
        let mut arena = ExprArena::new();
        let (a, b) = (arena.item(1i64), arena.item(2i64));
        let add = arena.call_op("add", vec![a, b]);
        annotate(&mut arena, add, &StaticContext::default(), &catalog()).unwrap();

        assert_eq!(static_type(&arena, add), SequenceType::one(ItemType::Integer));
        assert_eq!(get(&arena, add, AnnotationKey::Deterministic), Tristate::Yes);
        assert_eq!(get(&arena, add, AnnotationKey::Unfoldable), Tristate::No);
        assert!(!produces_duplicates(&arena, add));
        assert!(produces_sorted_nodes(&arena, add));
    }

    #[test]
    fn test_nondeterminism_propagates_up() {
        let mut arena = ExprArena::new();
        let random = arena.call_fn("random-number", vec![]);
        let one = arena.item(1.0);
        let add = arena.call_op("add", vec![random, one]);
        annotate(&mut arena, add, &StaticContext::default(), &catalog()).unwrap();

        assert_eq!(get(&arena, add, AnnotationKey::Deterministic), Tristate::No);
        assert_eq!(get(&arena, one, AnnotationKey::Deterministic), Tristate::Yes);
    }

    #[test]
    fn test_unbound_variable_is_static_error() {
        let mut arena = ExprArena::new();
        let x = arena.new_var("x");
        let r = arena.var_ref(x);
        let err = annotate(&mut arena, r, &StaticContext::default(), &catalog()).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::XPST0008));
    }

    #[test]
    fn test_flwor_binds_and_types() {
        let mut arena = ExprArena::new();
        let x = arena.new_var("x");
        let domain = arena.literal(vec![Item::Integer(1), Item::Integer(2)]);
        let xr = arena.var_ref(x);
        let one = arena.item(1i64);
        let ret = arena.call_op("add", vec![xr, one]);
        let flwor = arena.flwor(
            vec![Clause::For {
                var: x,
                position: None,
                domain,
            }],
            ret,
        );
        annotate(&mut arena, flwor, &StaticContext::default(), &catalog()).unwrap();

        assert_eq!(static_type(&arena, ret), SequenceType::one(ItemType::Integer));
        let ty = static_type(&arena, flwor);
        assert_eq!(ty.item, ItemType::Integer);
        assert_eq!(ty.occurrence, Occurrence::OneOrMore);
        assert!(arena.node(flwor).annotations.free_vars().unwrap().is_empty());
        assert!(arena.node(ret).annotations.free_vars().unwrap().contains(&x));
    }

    #[test]
    fn test_sort_op_consumers() {
        let mut arena = ExprArena::new();
        let uri = arena.item("books.xml");
        let doc = arena.call_fn("doc", vec![uri]);
        let step = arena.path_step(doc, Axis::Descendant, NodeTest::AnyNode);
        let sorted = arena.call_op("sort-distinct-nodes-asc", vec![step]);
        let count = arena.call_fn("count", vec![sorted]);
        annotate(&mut arena, count, &StaticContext::default(), &catalog()).unwrap();

        assert_eq!(get(&arena, sorted, AnnotationKey::IgnoresSortedNodes), Tristate::Yes);
        assert_eq!(get(&arena, sorted, AnnotationKey::IgnoresDuplicates), Tristate::Maybe);
        assert_eq!(get(&arena, step, AnnotationKey::IgnoresSortedNodes), Tristate::Yes);
        assert_eq!(get(&arena, step, AnnotationKey::IgnoresDuplicates), Tristate::Yes);
        assert!(produces_sorted_nodes(&arena, sorted));
        assert!(!produces_duplicates(&arena, sorted));
        // A single document node steps into a sorted, distinct result.
        assert!(produces_sorted_nodes(&arena, step));
        assert_eq!(get(&arena, count, AnnotationKey::IgnoresSortedNodes), Tristate::No);
    }

    #[test]
    fn test_recursive_function_effects() {
        let mut arena = ExprArena::new();
        let mut sctx = StaticContext::default();
        let n = arena.new_var("n");
        // Body placeholder, patched after the declaration exists.
        let placeholder = arena.empty_sequence();
        let f = sctx.declare_function(UserFunction {
            name: QName::local("loop"),
            params: vec![(n, SequenceType::one(ItemType::Integer))],
            return_type: SequenceType::any(),
            body: placeholder,
        });
        let nr = arena.var_ref(n);
        let recurse = arena.user_call(f, vec![nr]);
        let random = arena.call_fn("random-number", vec![]);
        let body = arena.call_op("concatenate", vec![recurse, random]);
        sctx.functions[f.index()].body = body;

        let arg = arena.item(1i64);
        let call = arena.user_call(f, vec![arg]);
        annotate(&mut arena, call, &sctx, &catalog()).unwrap();

        assert_eq!(get(&arena, call, AnnotationKey::Deterministic), Tristate::No);
        assert_eq!(get(&arena, call, AnnotationKey::Unfoldable), Tristate::Yes);
        assert_eq!(get(&arena, call, AnnotationKey::SideEffectFree), Tristate::Yes);
    }

    #[test]
    fn test_pass_clears_stale_values() {
        let mut arena = ExprArena::new();
        let lit = arena.item(1i64);
        arena
            .node_mut(lit)
            .annotations
            .set(AnnotationKey::Expensive, Tristate::Yes);
        annotate(&mut arena, lit, &StaticContext::default(), &catalog()).unwrap();
        assert_eq!(get(&arena, lit, AnnotationKey::Expensive), Tristate::No);
    }
}
