//! Lowering of an annotated expression tree into a plan.

use std::collections::HashMap;

use common_error::{XylemError, XylemResult};
use xylem_core::SequenceType;
use xylem_ir::{AnnotationKey, Clause, ExprArena, ExprId, ExprKind, FunctionId, QueryModule, StaticContext, VarId};
use xylem_runtime::{FunctionPlan, NodeMeta, Plan, PlanBuilder, PlanClause, PlanKind, PlanNodeId, VarSlot};

use crate::entry::FunctionCatalog;

/// Generate the plan of a module's main expression.
///
/// Only functions reachable from the main expression are lowered.
pub fn generate(module: &QueryModule, catalog: &FunctionCatalog) -> XylemResult<Plan> {
    generate_expr(&module.arena, module.root, &module.context, catalog)
}

/// Generate a plan for the subtree rooted at `root`.
///
/// # Errors
///
/// `ArityMismatch` when a call does not fit any registered signature;
/// `Internal` for an unregistered function name.
pub fn generate_expr(
    arena: &ExprArena,
    root: ExprId,
    sctx: &StaticContext,
    catalog: &FunctionCatalog,
) -> XylemResult<Plan> {
    let mut lowering = Lowering {
        arena,
        sctx,
        catalog,
        builder: PlanBuilder::new(),
        slots: HashMap::new(),
        functions: HashMap::new(),
    };
    let root = lowering.lower(root)?;
    let plan = lowering.builder.finish(root)?;
    log::debug!(
        "Generated plan with {} operators and {} state records",
        plan.operator_count(),
        plan.state_size()
    );
    Ok(plan)
}

struct Lowering<'a> {
    arena: &'a ExprArena,
    sctx: &'a StaticContext,
    catalog: &'a FunctionCatalog,
    builder: PlanBuilder,
    slots: HashMap<VarId, VarSlot>,
    functions: HashMap<FunctionId, u32>,
}

impl Lowering<'_> {
    fn slot(&mut self, var: VarId) -> VarSlot {
        let builder = &mut self.builder;
        *self.slots.entry(var).or_insert_with(|| builder.new_var_slot())
    }

    fn meta(&self, id: ExprId) -> NodeMeta {
        let node = self.arena.node(id);
        NodeMeta {
            static_type: node.static_type.unwrap_or_else(SequenceType::any),
            sorted: node.annotations.get(AnnotationKey::ProducesSortedNodes).is_yes(),
            distinct: node.annotations.get(AnnotationKey::ProducesDuplicates).is_no(),
        }
    }

    fn lower_all(&mut self, ids: &[ExprId]) -> XylemResult<Vec<PlanNodeId>> {
        ids.iter().map(|id| self.lower(*id)).collect()
    }

    fn lower(&mut self, id: ExprId) -> XylemResult<PlanNodeId> {
        let meta = self.meta(id);
        let arena = self.arena;
        let kind = match arena.kind(id) {
            ExprKind::Literal(items) => PlanKind::Literal(items.clone()),
            ExprKind::VarRef(var) => PlanKind::Var(self.slot(*var)),
            ExprKind::Call { name, args } => {
                let entry = self.catalog.resolve(name, args.len())?;
                let args = self.lower_all(args)?;
                return entry.codegen(&mut self.builder, args, meta);
            }
            ExprKind::UserCall { function, args } => {
                let args = self.lower_all(args)?;
                PlanKind::UserCall {
                    function: self.function(*function)?,
                    args,
                }
            }
            ExprKind::Flwor(f) => {
                let mut clauses = Vec::with_capacity(f.clauses.len());
                for clause in &f.clauses {
                    clauses.push(match clause {
                        Clause::For {
                            var,
                            position,
                            domain,
                        } => {
                            let domain = self.lower(*domain)?;
                            PlanClause::For {
                                var: self.slot(*var),
                                position: position.map(|p| self.slot(p)),
                                domain,
                            }
                        }
                        Clause::Let { var, domain } => {
                            let domain = self.lower(*domain)?;
                            PlanClause::Let {
                                var: self.slot(*var),
                                domain,
                            }
                        }
                        Clause::Where(cond) => PlanClause::Where(self.lower(*cond)?),
                        Clause::OrderBy(specs) => PlanClause::OrderBy(
                            specs
                                .iter()
                                .map(|s| Ok((self.lower(s.expr)?, s.descending)))
                                .collect::<XylemResult<_>>()?,
                        ),
                    });
                }
                let ret = self.lower(f.ret)?;
                PlanKind::Flwor { clauses, ret }
            }
            ExprKind::Filter {
                input,
                predicate,
                dot,
                position,
            } => PlanKind::Filter {
                input: self.lower(*input)?,
                predicate: self.lower(*predicate)?,
                dot: self.slot(*dot),
                position: position.map(|p| self.slot(p)),
            },
            ExprKind::PathStep { input, axis, test } => PlanKind::PathStep {
                input: self.lower(*input)?,
                axis: *axis,
                test: test.clone(),
            },
            ExprKind::ElementCtor { name, content } => PlanKind::ElementCtor {
                name: name.clone(),
                content: self.lower(*content)?,
            },
            ExprKind::TextCtor { content } => PlanKind::TextCtor {
                content: self.lower(*content)?,
            },
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => PlanKind::If {
                cond: self.lower(*cond)?,
                then_branch: self.lower(*then_branch)?,
                else_branch: self.lower(*else_branch)?,
            },
            ExprKind::Quantified {
                quantifier,
                var,
                domain,
                satisfies,
            } => {
                let domain = self.lower(*domain)?;
                PlanKind::Quantified {
                    quantifier: *quantifier,
                    var: self.slot(*var),
                    domain,
                    test: self.lower(*satisfies)?,
                }
            }
            ExprKind::TypeTest { op, input, target } => PlanKind::TypeTest {
                op: *op,
                input: self.lower(*input)?,
                target: *target,
            },
            ExprKind::Update {
                kind,
                target,
                source,
            } => PlanKind::Update {
                kind: *kind,
                target: self.lower(*target)?,
                source: source.map(|s| self.lower(s)).transpose()?,
            },
            ExprKind::IndexProbe(p) => {
                let build = self.lower(p.build)?;
                PlanKind::IndexProbe {
                    build,
                    build_var: self.slot(p.build_var),
                    build_key: self.lower(p.build_key)?,
                    probe_key: self.lower(p.probe_key)?,
                }
            }
        };
        Ok(self.builder.add(kind, meta))
    }

    /// Index of a function plan, lowering the body on first use.
    fn function(&mut self, id: FunctionId) -> XylemResult<u32> {
        if let Some(index) = self.functions.get(&id) {
            return Ok(*index);
        }
        let sctx = self.sctx;
        let declared = sctx
            .function(id)
            .ok_or_else(|| XylemError::internal(format!("call of undeclared function #{}", id.0)))?;
        let params = declared
            .params
            .iter()
            .map(|(var, ty)| (self.slot(*var), *ty))
            .collect();
        // Registered before the body so recursive calls resolve.
        let index = self.builder.add_function(FunctionPlan {
            name: declared.name.to_string(),
            params,
            return_type: declared.return_type,
            body: PlanNodeId(0),
        });
        self.functions.insert(id, index);
        let body = self.lower(declared.body)?;
        self.builder.set_function_body(index, body)?;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::annotate;
    use common_error::ErrorCode;
    use xylem_core::{Item, ItemType, QName};
    use xylem_ir::UserFunction;
    use xylem_runtime::{DynamicContext, Execution};

    fn run(module: &mut QueryModule) -> Vec<Item> {
        let catalog = FunctionCatalog::builtin().unwrap();
        annotate::annotate_module(module, &catalog).unwrap();
        let plan = generate(module, &catalog).unwrap();
        Execution::new(Arc::new(plan), DynamicContext::default())
            .collect()
            .unwrap()
    }

    #[test]
    fn test_arithmetic_plan() {
        let mut arena = ExprArena::new();
        let (a, b) = (arena.item(1i64), arena.item(2i64));
        let add = arena.call_op("add", vec![a, b]);
        let mut module = QueryModule::main_only(arena, add);
        assert_eq!(run(&mut module), vec![Item::Integer(3)]);
    }

    #[test]
    fn test_meta_carries_annotations() {
        let mut arena = ExprArena::new();
        let (a, b) = (arena.item(1i64), arena.item(2i64));
        let add = arena.call_op("add", vec![a, b]);
        let mut module = QueryModule::main_only(arena, add);
        let catalog = FunctionCatalog::builtin().unwrap();
        annotate::annotate_module(&mut module, &catalog).unwrap();

        let plan = generate(&module, &catalog).unwrap();
        let meta = plan.node(plan.root()).meta;
        assert_eq!(meta.static_type, SequenceType::one(ItemType::Integer));
        assert!(meta.sorted && meta.distinct);
    }

    #[test]
    fn test_wrong_arity_fails_before_execution() {
        let mut arena = ExprArena::new();
        let args: Vec<ExprId> = (1..=3).map(|i| arena.item(i as i64)).collect();
        let add = arena.call_op("add", args);
        let catalog = FunctionCatalog::builtin().unwrap();

        let err = generate_expr(&arena, add, &StaticContext::default(), &catalog).unwrap_err();
        assert!(matches!(err, XylemError::ArityMismatch { actual: 3, .. }));
        assert_eq!(err.code(), Some(ErrorCode::XPST0017));
    }

    #[test]
    fn test_unregistered_function_is_internal() {
        let mut arena = ExprArena::new();
        let call = arena.call(QName::local("nope"), vec![]);
        let catalog = FunctionCatalog::builtin().unwrap();
        let err = generate_expr(&arena, call, &StaticContext::default(), &catalog).unwrap_err();
        assert!(matches!(err, XylemError::Internal(_)));
    }

    #[test]
    fn test_recursive_function_lowered_once() {
        // declare function local:down($n) { if ($n le 0) then 0 else local:down($n - 1) }
        let mut arena = ExprArena::new();
        let mut sctx = StaticContext::default();
        let n = arena.new_var("n");
        let placeholder = arena.empty_sequence();
        let f = sctx.declare_function(UserFunction {
            name: QName::local("down"),
            params: vec![(n, SequenceType::one(ItemType::Integer))],
            return_type: SequenceType::one(ItemType::Integer),
            body: placeholder,
        });
        let nr = arena.var_ref(n);
        let zero = arena.item(0i64);
        let cond = arena.call_op("value-less-equal", vec![nr, zero]);
        let zero_out = arena.item(0i64);
        let nr2 = arena.var_ref(n);
        let one = arena.item(1i64);
        let minus = arena.call_op("subtract", vec![nr2, one]);
        let recurse = arena.user_call(f, vec![minus]);
        let body = arena.if_then_else(cond, zero_out, recurse);
        sctx.functions[f.index()].body = body;

        let start = arena.item(20i64);
        let call = arena.user_call(f, vec![start]);
        let mut module = QueryModule::new(arena, call, sctx);

        let catalog = FunctionCatalog::builtin().unwrap();
        annotate::annotate_module(&mut module, &catalog).unwrap();
        let plan = generate(&module, &catalog).unwrap();
        assert_eq!(plan.functions().len(), 1);
        assert_eq!(run(&mut module), vec![Item::Integer(0)]);
    }
}
