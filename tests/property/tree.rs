//! Property-based tests over generated expression trees.
//!
//! Run with more cases:
//!   PROPTEST_CASES=1000 cargo test --test tree_properties

#[path = "../integration/common/mod.rs"]
mod common;

use common::*;
use exprlower::ScopeMode;
use exprlower::eval::{Interpreter, Value};
use exprlower::lowering::{alias, optimize};
use exprlower::tree::build::*;
use exprlower::tree::{Expr, Type, UnaryOp, Variable};
use proptest::prelude::*;

/// Shape of a generated int-valued tree. Every `Let` binds the same variable
/// identity, so nested lets alias each other.
#[derive(Debug, Clone)]
enum Shape {
    Lit(i64),
    Await(i64),
    Add(Box<Shape>, Box<Shape>),
    Neg(Box<Shape>),
    Block(Vec<Shape>),
    Cond(bool, Box<Shape>, Box<Shape>),
    Let(Box<Shape>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![(-50i64..50).prop_map(Shape::Lit), (0i64..50).prop_map(Shape::Await)];
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| Shape::Add(Box::new(a), Box::new(b))),
            inner.clone().prop_map(|a| Shape::Neg(Box::new(a))),
            prop::collection::vec(inner.clone(), 1..4).prop_map(Shape::Block),
            (any::<bool>(), inner.clone(), inner.clone()).prop_map(|(c, a, b)| Shape::Cond(c, Box::new(a), Box::new(b))),
            inner.prop_map(|a| Shape::Let(Box::new(a))),
        ]
    })
}

fn build(shape: &Shape, shared: &Variable) -> Expr {
    match shape {
        Shape::Lit(n) => int(*n),
        Shape::Await(n) => await_int(*n),
        Shape::Add(a, b) => add(build(a, shared), build(b, shared)).unwrap(),
        Shape::Neg(a) => unary(UnaryOp::Negate, build(a, shared)).unwrap(),
        Shape::Block(items) => block(vec![], items.iter().map(|s| build(s, shared)).collect()),
        Shape::Cond(c, a, b) => condition(boolean(*c), build(a, shared), build(b, shared)).unwrap(),
        Shape::Let(a) => block(
            vec![shared.clone()],
            vec![
                assign(param(shared), build(a, shared)).unwrap(),
                add(param(shared), int(1)).unwrap(),
            ],
        ),
    }
}

fn eval(expr: &Expr) -> Value {
    Interpreter::new().eval(expr).unwrap()
}

proptest! {
    /// Property: lowering never changes the value an async body produces.
    #[test]
    fn lowering_preserves_value(shape in arb_shape()) {
        let shared = Variable::new("x", Type::Int);
        let lambda = async_lambda("generated", vec![], build(&shape, &shared), None).unwrap();
        prop_assert_eq!(lower_and_run(&lambda).0, run_original(&lambda));
    }

    /// Property: alias elimination is idempotent and preserves the value.
    #[test]
    fn alias_elimination_is_idempotent(shape in arb_shape()) {
        let shared = Variable::new("x", Type::Int);
        let tree = build(&shape, &shared);
        for mode in [ScopeMode::Alias, ScopeMode::Shadow] {
            let once = alias::eliminate_aliases(&tree, mode);
            let twice = alias::eliminate_aliases(&once, mode);
            prop_assert!(twice.ptr_eq(&once));
            prop_assert_eq!(eval(&once), eval(&tree));
        }
    }

    /// Property: one flattening pass reaches the fixed point.
    #[test]
    fn optimizer_fixed_point(shape in arb_shape()) {
        let shared = Variable::new("x", Type::Int);
        let tree = build(&shape, &shared);
        let once = optimize::optimize(&tree);
        prop_assert!(optimize::optimize(&once).ptr_eq(&once));
        prop_assert_eq!(eval(&once), eval(&tree));
    }
}
