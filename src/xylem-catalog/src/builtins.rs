//! Built-in functions and operators.

use common_error::{XylemError, XylemResult};
use xylem_core::{Item, ItemType, Occurrence, QName, SequenceType};
use xylem_ir::Tristate;
use xylem_runtime::functions::{ArithOp, CompareOp, ScalarOp, SortDistinctMode, SortOrder};
use xylem_runtime::{NodeMeta, PlanBuilder, PlanKind, PlanNodeId};

use crate::entry::{
    AnnotationBehavior, CatalogBuilder, FunctionEntry, FunctionProps, Producer, Propagation,
};
use crate::signature::Signature;

const ANY: SequenceType = SequenceType::any();
const OPT_ATOMIC: SequenceType = SequenceType::optional(ItemType::AnyAtomic);
const OPT_NUMERIC: SequenceType = SequenceType::optional(ItemType::Numeric);
const STAR_ATOMIC: SequenceType = SequenceType::star(ItemType::AnyAtomic);
const BOOLEAN: SequenceType = SequenceType::one(ItemType::Boolean);
const INTEGER: SequenceType = SequenceType::one(ItemType::Integer);
const DOUBLE: SequenceType = SequenceType::one(ItemType::Double);
const STRING: SequenceType = SequenceType::one(ItemType::String);

/// Register every built-in entry.
pub fn register_builtins(builder: &mut CatalogBuilder) -> XylemResult<()> {
    register_sequence_ops(builder)?;
    register_arithmetic(builder)?;
    register_comparisons(builder)?;
    register_boolean(builder)?;
    register_aggregates(builder)?;
    register_strings(builder)?;
    register_cardinality(builder)?;
    register_context_functions(builder)?;
    register_sort_family(builder)?;
    log::debug!("Registered built-in functions");
    Ok(())
}

// ============================================================================
// Codegen helpers
// ============================================================================

fn scalar(
    op: ScalarOp,
) -> impl Fn(&mut PlanBuilder, Vec<PlanNodeId>, NodeMeta) -> XylemResult<PlanNodeId> + Send + Sync {
    move |b, args, meta| Ok(b.add(PlanKind::Scalar { op, args }, meta))
}

fn constant(
    value: bool,
) -> impl Fn(&mut PlanBuilder, Vec<PlanNodeId>, NodeMeta) -> XylemResult<PlanNodeId> + Send + Sync {
    move |b, _, meta| Ok(b.add(PlanKind::Literal(vec![Item::Boolean(value)].into()), meta))
}

fn scalar_entry(name: QName, signature: Signature, op: ScalarOp) -> FunctionEntry {
    FunctionEntry::new(name, signature, scalar(op))
}

/// Result type keeping the item type of the first argument.
fn first_arg(args: &[SequenceType]) -> SequenceType {
    args.first().copied().unwrap_or_else(SequenceType::empty)
}

/// Item type after atomization.
fn atomized(item: ItemType) -> ItemType {
    match item {
        ItemType::Node => ItemType::Untyped,
        ItemType::Item => ItemType::AnyAtomic,
        other => other,
    }
}

/// Occurrence of an operator over two optional operands.
fn binary_occurrence(args: &[SequenceType]) -> Occurrence {
    if args.iter().any(SequenceType::is_empty) {
        Occurrence::Empty
    } else if args.iter().all(|a| a.occurrence == Occurrence::One) {
        Occurrence::One
    } else {
        Occurrence::ZeroOrOne
    }
}

// ============================================================================
// Sequence constructors
// ============================================================================

fn register_sequence_ops(builder: &mut CatalogBuilder) -> XylemResult<()> {
    builder.register(
        FunctionEntry::new(
            QName::op("concatenate"),
            Signature::variadic(ANY, 0, ANY),
            |b, args, meta| Ok(b.add(PlanKind::Concat(args), meta)),
        )
        .with_annotations(AnnotationBehavior::transparent())
        .with_type_check(|args| {
            Ok(args
                .iter()
                .fold(SequenceType::empty(), |acc, t| acc.concat(t)))
        }),
    )?;

    builder.register(
        FunctionEntry::new(
            QName::op("to"),
            Signature::fixed(vec![OPT_ATOMIC, OPT_ATOMIC], SequenceType::star(ItemType::Integer)),
            |b, args, meta| match args.as_slice() {
                [low, high] => Ok(b.add(PlanKind::Range { low: *low, high: *high }, meta)),
                _ => Err(XylemError::internal("op:to lowered with wrong arity")),
            },
        )
        .with_props(FunctionProps {
            expensive: true,
            ..FunctionProps::default()
        }),
    )?;

    builder.register(
        FunctionEntry::new(
            QName::func("unordered"),
            Signature::fixed(vec![ANY], ANY),
            |b, args, meta| Ok(b.add(PlanKind::Concat(args), meta)),
        )
        .with_annotations(AnnotationBehavior {
            ignores_sorted: Propagation::Assert(Tristate::Yes),
            ..AnnotationBehavior::transparent()
        })
        .with_type_check(|args| Ok(first_arg(args))),
    )?;

    builder.register(
        scalar_entry(QName::func("reverse"), Signature::fixed(vec![ANY], ANY), ScalarOp::Reverse)
            .with_annotations(AnnotationBehavior {
                duplicates: Producer::Input(0),
                ignores_duplicates: Propagation::Inherit,
                ..AnnotationBehavior::default()
            })
            .with_type_check(|args| Ok(first_arg(args))),
    )?;

    let subsequence_type = |args: &[SequenceType]| {
        let t = first_arg(args);
        Ok(t.with_occurrence(t.occurrence.optional()))
    };
    builder.register(
        scalar_entry(
            QName::func("subsequence"),
            Signature::fixed(vec![ANY, DOUBLE], ANY),
            ScalarOp::Subsequence,
        )
        .with_annotations(subsequence_annotations())
        .with_type_check(subsequence_type),
    )?;
    builder.register(
        scalar_entry(
            QName::func("subsequence"),
            Signature::fixed(vec![ANY, DOUBLE, DOUBLE], ANY),
            ScalarOp::Subsequence,
        )
        .with_annotations(subsequence_annotations())
        .with_type_check(subsequence_type),
    )?;
    Ok(())
}

fn subsequence_annotations() -> AnnotationBehavior {
    AnnotationBehavior {
        duplicates: Producer::Input(0),
        sorted: Producer::Input(0),
        ..AnnotationBehavior::default()
    }
}

// ============================================================================
// Arithmetic and comparisons
// ============================================================================

fn register_arithmetic(builder: &mut CatalogBuilder) -> XylemResult<()> {
    let ops = [
        ("add", ArithOp::Add),
        ("subtract", ArithOp::Subtract),
        ("multiply", ArithOp::Multiply),
        ("divide", ArithOp::Divide),
        ("integer-divide", ArithOp::IntegerDivide),
        ("mod", ArithOp::Mod),
    ];
    for (local, op) in ops {
        builder.register(
            scalar_entry(
                QName::op(local),
                Signature::fixed(vec![OPT_NUMERIC, OPT_NUMERIC], OPT_NUMERIC),
                ScalarOp::Arith(op),
            )
            .with_type_check(move |args| {
                let item = match op {
                    ArithOp::IntegerDivide => ItemType::Integer,
                    ArithOp::Divide => ItemType::Numeric,
                    _ => args
                        .iter()
                        .map(|a| atomized(a.item))
                        .fold(ItemType::Integer, |acc, t| match (acc, t) {
                            (ItemType::Integer, ItemType::Integer) => ItemType::Integer,
                            (ItemType::Integer | ItemType::Double, ItemType::Double)
                            | (ItemType::Double, ItemType::Integer) => ItemType::Double,
                            _ => ItemType::Numeric,
                        }),
                };
                Ok(SequenceType::new(item, binary_occurrence(args)))
            }),
        )?;
    }
    Ok(())
}

fn register_comparisons(builder: &mut CatalogBuilder) -> XylemResult<()> {
    let ops = [
        ("equal", CompareOp::Eq),
        ("not-equal", CompareOp::Ne),
        ("less-than", CompareOp::Lt),
        ("less-equal", CompareOp::Le),
        ("greater-than", CompareOp::Gt),
        ("greater-equal", CompareOp::Ge),
    ];
    for (local, op) in ops {
        builder.register(
            scalar_entry(
                QName::op(format!("value-{local}")),
                Signature::fixed(vec![OPT_ATOMIC, OPT_ATOMIC], SequenceType::optional(ItemType::Boolean)),
                ScalarOp::ValueCompare(op),
            )
            .with_type_check(|args| Ok(SequenceType::new(ItemType::Boolean, binary_occurrence(args)))),
        )?;
        // Existential comparison: neither order nor duplicates matter.
        builder.register(
            scalar_entry(
                QName::op(local),
                Signature::fixed(vec![STAR_ATOMIC, STAR_ATOMIC], BOOLEAN),
                ScalarOp::GeneralCompare(op),
            )
            .with_annotations(AnnotationBehavior::insensitive()),
        )?;
    }
    Ok(())
}

fn register_boolean(builder: &mut CatalogBuilder) -> XylemResult<()> {
    for (name, op) in [(QName::op("and"), ScalarOp::And), (QName::op("or"), ScalarOp::Or)] {
        builder.register(
            scalar_entry(name, Signature::fixed(vec![ANY, ANY], BOOLEAN), op)
                .with_annotations(AnnotationBehavior::insensitive()),
        )?;
    }
    for (local, op) in [("not", ScalarOp::Not), ("boolean", ScalarOp::Boolean)] {
        builder.register(
            scalar_entry(QName::func(local), Signature::fixed(vec![ANY], BOOLEAN), op)
                .with_annotations(AnnotationBehavior::insensitive()),
        )?;
    }
    builder.register(FunctionEntry::new(
        QName::func("true"),
        Signature::fixed(vec![], BOOLEAN),
        constant(true),
    ))?;
    builder.register(FunctionEntry::new(
        QName::func("false"),
        Signature::fixed(vec![], BOOLEAN),
        constant(false),
    ))?;
    Ok(())
}

// ============================================================================
// Aggregates and accessors
// ============================================================================

fn register_aggregates(builder: &mut CatalogBuilder) -> XylemResult<()> {
    builder.register(
        scalar_entry(QName::func("count"), Signature::fixed(vec![ANY], INTEGER), ScalarOp::Count)
            .with_annotations(AnnotationBehavior {
                ignores_sorted: Propagation::Assert(Tristate::Yes),
                ..AnnotationBehavior::default()
            }),
    )?;
    builder.register(scalar_entry(
        QName::func("sum"),
        Signature::fixed(vec![STAR_ATOMIC], SequenceType::one(ItemType::Numeric)),
        ScalarOp::Sum,
    ))?;
    for (local, op) in [("empty", ScalarOp::Empty), ("exists", ScalarOp::Exists)] {
        builder.register(
            scalar_entry(QName::func(local), Signature::fixed(vec![ANY], BOOLEAN), op)
                .with_annotations(AnnotationBehavior::insensitive()),
        )?;
    }
    builder.register(
        scalar_entry(
            QName::func("distinct-values"),
            Signature::fixed(vec![STAR_ATOMIC], STAR_ATOMIC),
            ScalarOp::DistinctValues,
        )
        .with_annotations(AnnotationBehavior {
            ignores_duplicates: Propagation::Assert(Tristate::Yes),
            ..AnnotationBehavior::default()
        })
        .with_type_check(|args| {
            let t = first_arg(args);
            Ok(SequenceType::new(atomized(t.item), t.occurrence))
        }),
    )?;
    builder.register(
        scalar_entry(QName::func("data"), Signature::fixed(vec![ANY], STAR_ATOMIC), ScalarOp::Data)
            .with_type_check(|args| {
                let t = first_arg(args);
                Ok(SequenceType::new(atomized(t.item), t.occurrence))
            }),
    )?;
    Ok(())
}

fn register_strings(builder: &mut CatalogBuilder) -> XylemResult<()> {
    builder.register(scalar_entry(
        QName::func("concat"),
        Signature::variadic(OPT_ATOMIC, 2, STRING),
        ScalarOp::StringConcat,
    ))?;
    builder.register(scalar_entry(
        QName::func("string"),
        Signature::fixed(vec![SequenceType::optional(ItemType::Item)], STRING),
        ScalarOp::String,
    ))?;
    builder.register(scalar_entry(
        QName::func("string-length"),
        Signature::fixed(vec![SequenceType::optional(ItemType::String)], INTEGER),
        ScalarOp::StringLength,
    ))?;
    Ok(())
}

fn register_cardinality(builder: &mut CatalogBuilder) -> XylemResult<()> {
    let checks = [
        ("zero-or-one", ScalarOp::ZeroOrOne, Occurrence::ZeroOrOne),
        ("one-or-more", ScalarOp::OneOrMore, Occurrence::OneOrMore),
        ("exactly-one", ScalarOp::ExactlyOne, Occurrence::One),
    ];
    for (local, op, occurrence) in checks {
        builder.register(
            scalar_entry(
                QName::func(local),
                Signature::fixed(vec![ANY], SequenceType::new(ItemType::Item, occurrence)),
                op,
            )
            .with_annotations(AnnotationBehavior {
                duplicates: Producer::Input(0),
                sorted: Producer::Input(0),
                ..AnnotationBehavior::default()
            })
            .with_type_check(move |args| Ok(SequenceType::new(first_arg(args).item, occurrence))),
        )?;
    }
    Ok(())
}

// ============================================================================
// Context-dependent and side-effecting functions
// ============================================================================

fn register_context_functions(builder: &mut CatalogBuilder) -> XylemResult<()> {
    builder.register(
        FunctionEntry::new(
            QName::func("doc"),
            Signature::fixed(
                vec![SequenceType::optional(ItemType::String)],
                SequenceType::optional(ItemType::Node),
            ),
            |b, args, meta| match args.as_slice() {
                [uri] => Ok(b.add(PlanKind::DocFetch { uri: *uri }, meta)),
                _ => Err(XylemError::internal("fn:doc lowered with wrong arity")),
            },
        )
        .with_props(FunctionProps {
            requires_dynamic_context: true,
            ..FunctionProps::default()
        }),
    )?;

    builder.register(
        scalar_entry(
            QName::func("random-number"),
            Signature::fixed(vec![], DOUBLE),
            ScalarOp::RandomNumber,
        )
        .with_props(FunctionProps {
            deterministic: false,
            ..FunctionProps::default()
        }),
    )?;

    let error_props = FunctionProps {
        unfoldable: true,
        ..FunctionProps::default()
    };
    builder.register(
        scalar_entry(QName::func("error"), Signature::fixed(vec![], ANY), ScalarOp::Error)
            .with_props(error_props),
    )?;
    builder.register(
        scalar_entry(
            QName::func("error"),
            Signature::fixed(vec![SequenceType::optional(ItemType::Item)], ANY),
            ScalarOp::Error,
        )
        .with_props(error_props),
    )?;
    Ok(())
}

// ============================================================================
// Document-order sort and duplicate elimination
// ============================================================================

/// Local names of the sort family with their iterator modes.
pub const SORT_FAMILY: [(&str, SortDistinctMode); 10] = [
    ("sort-nodes-asc", SortDistinctMode::new(Some(SortOrder::Ascending), false, false)),
    ("sort-nodes-desc", SortDistinctMode::new(Some(SortOrder::Descending), false, false)),
    ("distinct-nodes", SortDistinctMode::new(None, true, false)),
    ("sort-distinct-nodes-asc", SortDistinctMode::new(Some(SortOrder::Ascending), true, false)),
    ("sort-distinct-nodes-desc", SortDistinctMode::new(Some(SortOrder::Descending), true, false)),
    ("sort-nodes-asc-or-atomics", SortDistinctMode::new(Some(SortOrder::Ascending), false, true)),
    ("sort-nodes-desc-or-atomics", SortDistinctMode::new(Some(SortOrder::Descending), false, true)),
    ("distinct-nodes-or-atomics", SortDistinctMode::new(None, true, true)),
    (
        "sort-distinct-nodes-asc-or-atomics",
        SortDistinctMode::new(Some(SortOrder::Ascending), true, true),
    ),
    (
        "sort-distinct-nodes-desc-or-atomics",
        SortDistinctMode::new(Some(SortOrder::Descending), true, true),
    ),
];

/// Mode of a sort-family operator, `None` for any other name.
pub fn sort_mode(name: &QName) -> Option<SortDistinctMode> {
    if name.prefix != "op" {
        return None;
    }
    SORT_FAMILY
        .iter()
        .find(|(local, _)| *local == name.local)
        .map(|(_, mode)| *mode)
}

/// Annotation behavior of a sort-family operator.
pub fn sort_annotations(mode: SortDistinctMode) -> AnnotationBehavior {
    let sorted = match mode.order {
        Some(SortOrder::Ascending) => Producer::Fixed(Tristate::Yes),
        Some(SortOrder::Descending) => Producer::Fixed(Tristate::No),
        None => Producer::Input(0),
    };
    let duplicates = if mode.distinct {
        Producer::Fixed(Tristate::No)
    } else {
        Producer::Input(0)
    };
    // Atomic input passes through unchanged, so only the node-only
    // variants make the order and duplicates of their input irrelevant.
    let asserts = !mode.allow_atomics;
    AnnotationBehavior {
        duplicates,
        sorted,
        ignores_sorted: if asserts && mode.order.is_some() {
            Propagation::Assert(Tristate::Yes)
        } else {
            Propagation::Inherit
        },
        ignores_duplicates: if asserts && mode.distinct {
            Propagation::Assert(Tristate::Yes)
        } else {
            Propagation::Inherit
        },
    }
}

fn register_sort_family(builder: &mut CatalogBuilder) -> XylemResult<()> {
    for (local, mode) in SORT_FAMILY {
        builder.register(
            FunctionEntry::new(
                QName::op(local),
                Signature::fixed(vec![ANY], ANY),
                move |b, args, meta| match args.as_slice() {
                    [input] => Ok(b.add(PlanKind::SortDistinct { input: *input, mode }, meta)),
                    _ => Err(XylemError::internal(format!(
                        "op:{local} lowered with wrong arity"
                    ))),
                },
            )
            .with_annotations(sort_annotations(mode))
            .with_type_check(|args| Ok(first_arg(args))),
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FunctionCatalog;

    #[test]
    fn test_builtins_register_without_collisions() {
        let catalog = FunctionCatalog::builtin().unwrap();
        assert!(catalog.contains(&QName::op("add")));
        assert!(catalog.lookup(&QName::func("subsequence"), 2).is_some());
        assert!(catalog.lookup(&QName::func("subsequence"), 3).is_some());
        assert!(catalog.lookup(&QName::func("concat"), 5).is_some());
        assert!(catalog.lookup(&QName::func("concat"), 1).is_none());
        assert!(catalog.lookup(&QName::op("concatenate"), 0).is_some());
    }

    #[test]
    fn test_arithmetic_result_types() {
        let catalog = FunctionCatalog::builtin().unwrap();
        let add = catalog.lookup(&QName::op("add"), 2).unwrap();
        let int = SequenceType::one(ItemType::Integer);
        let dbl = SequenceType::one(ItemType::Double);

        assert_eq!(add.type_check(&[int, int]).unwrap(), int);
        assert_eq!(add.type_check(&[int, dbl]).unwrap(), dbl);
        let opt = add.type_check(&[int, SequenceType::optional(ItemType::Integer)]).unwrap();
        assert_eq!(opt.occurrence, Occurrence::ZeroOrOne);
        // Node operands atomize to untyped values and stay acceptable.
        assert!(add.type_check(&[SequenceType::one(ItemType::Node), int]).is_ok());
        assert!(add.type_check(&[SequenceType::one(ItemType::String), int]).is_err());
    }

    #[test]
    fn test_sort_family_annotations() {
        let mode = sort_mode(&QName::op("sort-distinct-nodes-asc")).unwrap();
        let behavior = sort_annotations(mode);
        assert_eq!(behavior.sorted, Producer::Fixed(Tristate::Yes));
        assert_eq!(behavior.duplicates, Producer::Fixed(Tristate::No));

        let mode = sort_mode(&QName::op("distinct-nodes")).unwrap();
        assert_eq!(sort_annotations(mode).sorted, Producer::Input(0));
        assert!(sort_mode(&QName::func("sort-nodes-asc")).is_none());
    }
}
