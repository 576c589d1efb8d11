//! Integration tests for the xylem-ir crate.
//!
//! ## Test Categories
//!
//! 1. **Scope Tests**: free variables under binding clauses
//! 2. **Property Tests**: copying and substitution respect variable scope

use std::collections::{BTreeSet, HashMap};

use proptest::prelude::*;
use xylem_ir::{Clause, ExprArena, ExprId, VarId};

/// Expression shape; `Ref` indexes the variables in scope.
#[derive(Debug, Clone)]
enum Shape {
    Lit(i64),
    Ref(usize),
    Add(Box<Shape>, Box<Shape>),
    Let(Box<Shape>, Box<Shape>),
    For(Box<Shape>, Box<Shape>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![(-9i64..9).prop_map(Shape::Lit), (0usize..8).prop_map(Shape::Ref)];
    leaf.prop_recursive(4, 24, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Shape::Add(Box::new(a), Box::new(b))),
            (inner.clone(), inner.clone()).prop_map(|(d, b)| Shape::Let(Box::new(d), Box::new(b))),
            (inner.clone(), inner).prop_map(|(d, b)| Shape::For(Box::new(d), Box::new(b))),
        ]
    })
}

fn build(arena: &mut ExprArena, shape: &Shape, scope: &mut Vec<VarId>) -> ExprId {
    match shape {
        Shape::Lit(v) => arena.item(*v),
        Shape::Ref(k) => {
            let var = scope[k % scope.len()];
            arena.var_ref(var)
        }
        Shape::Add(a, b) => {
            let a = build(arena, a, scope);
            let b = build(arena, b, scope);
            arena.call_op("add", vec![a, b])
        }
        Shape::Let(domain, body) | Shape::For(domain, body) => {
            let domain = build(arena, domain, scope);
            let var = arena.new_var("v");
            scope.push(var);
            let ret = build(arena, body, scope);
            scope.pop();
            let clause = if matches!(shape, Shape::Let(..)) {
                Clause::Let { var, domain }
            } else {
                Clause::For {
                    var,
                    position: None,
                    domain,
                }
            };
            arena.flwor(vec![clause], ret)
        }
    }
}

/// Arena with three outer variables and `shape` built over them.
fn setup(shape: &Shape) -> (ExprArena, Vec<VarId>, ExprId) {
    let mut arena = ExprArena::new();
    let outer: Vec<VarId> = ["a", "b", "c"].iter().map(|n| arena.new_var(*n)).collect();
    let root = build(&mut arena, shape, &mut outer.clone());
    (arena, outer, root)
}

// ============================================================================
// Scope Tests
// ============================================================================

#[test]
fn test_let_binding_hides_its_variable() {
    let mut arena = ExprArena::new();
    let a = arena.new_var("a");
    let x = arena.new_var("x");
    let domain = arena.var_ref(a);
    let xr = arena.var_ref(x);
    let root = arena.flwor(vec![Clause::Let { var: x, domain }], xr);

    assert_eq!(arena.free_vars(root), BTreeSet::from([a]));
}

#[test]
fn test_clone_gives_bound_variables_fresh_ids() {
    let mut arena = ExprArena::new();
    let x = arena.new_var("x");
    let domain = arena.item(1i64);
    let xr = arena.var_ref(x);
    let root = arena.flwor(vec![Clause::Let { var: x, domain }], xr);

    let copy = arena.deep_clone(root, &mut HashMap::new());
    assert_eq!(arena.count_var_refs(copy, x), 0);
    assert!(arena.free_vars(copy).is_empty());
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #[test]
    fn prop_clone_renames_free_variables(shape in arb_shape()) {
        let (mut arena, outer, root) = setup(&shape);
        let fresh = arena.new_var("a2");
        let mut renames = HashMap::from([(outer[0], fresh)]);

        let copy = arena.deep_clone(root, &mut renames);

        let expected: BTreeSet<VarId> = arena
            .free_vars(root)
            .into_iter()
            .map(|v| if v == outer[0] { fresh } else { v })
            .collect();
        prop_assert_eq!(arena.free_vars(copy), expected);
        prop_assert_eq!(arena.subtree_size(copy), arena.subtree_size(root));
    }

    #[test]
    fn prop_substitution_removes_the_variable(shape in arb_shape(), value in -9i64..9) {
        let (mut arena, outer, root) = setup(&shape);
        let before = arena.free_vars(root);
        let with = arena.item(value);

        let root = arena.substitute_var(root, outer[1], with);

        let mut expected = before;
        expected.remove(&outer[1]);
        prop_assert_eq!(arena.free_vars(root), expected);
        prop_assert_eq!(arena.count_var_refs(root, outer[1]), 0);
    }
}
