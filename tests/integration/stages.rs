mod common;

use common::*;
use exprlower::eval::{Interpreter, Value};
use exprlower::lowering::{alias, await_check, catch, goto, optimize, percolate, reducer, ref_local, spiller, typed_label};
use exprlower::tree::build::*;
use exprlower::tree::{ClassInfo, Expr, ExprKind, LabelTarget, Type, Variable};
use exprlower::visit::composers::{contains_await, count_exprs};
use exprlower::{LowerError, ScopeMode};

#[test]
fn alias_elimination_is_a_no_op_the_second_time() {
    let x = Variable::new("x", Type::Int);
    let tree = block(
        vec![x.clone()],
        vec![block(vec![x.clone()], vec![assign(param(&x), int(1)).unwrap()]), param(&x)],
    );
    let once = alias::eliminate_aliases(&tree, ScopeMode::Alias);
    assert!(!once.ptr_eq(&tree));
    let twice = alias::eliminate_aliases(&once, ScopeMode::Alias);
    assert!(twice.ptr_eq(&once));
}

#[test]
fn checker_accepts_awaits_in_finally_and_handlers() {
    let body = try_catch_finally(
        await_int(1),
        vec![catch(Type::Object, None, await_int(2))],
        block(vec![], vec![await_int(3), empty()]),
    )
    .unwrap();
    assert!(await_check::check_awaits(&body).is_ok());
}

#[test]
fn reducer_returns_primitive_trees_unchanged() {
    let x = Variable::new("x", Type::Int);
    let tree = block(
        vec![x.clone()],
        vec![
            assign(param(&x), int(1)).unwrap(),
            if_then_else(less_than(param(&x), int(2)).unwrap(), param(&x), int(0)).unwrap(),
        ],
    );
    assert!(reducer::reduce(&tree).unwrap().ptr_eq(&tree));
}

#[test]
fn spiller_output_evaluates_like_its_input() {
    let body = add(await_int(2), binary(exprlower::tree::BinaryOp::Multiply, await_int(3), await_int(4)).unwrap()).unwrap();
    let spilled = spiller::spill(&body).unwrap();
    assert_eq!(Interpreter::new().eval(&spilled).unwrap(), Value::Int(14));
}

#[test]
fn two_gotos_to_one_target_share_an_entry() {
    let out_label = LabelTarget::new("out", Type::Int);
    let body = block(
        vec![],
        vec![
            if_then(boolean(true), goto_value(&out_label, int(1)).unwrap()).unwrap(),
            goto_value(&out_label, int(2)).unwrap(),
            empty(),
        ],
    );
    let rewritten = goto::rewrite_gotos(&body).unwrap();
    assert_eq!(rewritten.leave_labels.len(), 1);
    let data = rewritten.leave_labels.get(&out_label).unwrap();
    assert_eq!(data.index, 1);
    assert_eq!(data.carried.as_ref().unwrap().ty(), &Type::Int);
    let pending_writes = count_exprs(&rewritten.body, |k| {
        matches!(k, ExprKind::Assign { target, value }
            if target.as_parameter() == Some(&rewritten.pending_branch)
                && matches!(value.kind(), ExprKind::Constant { .. }))
    });
    assert_eq!(pending_writes, 2);
}

#[test]
fn catch_rewriter_leaves_no_await_in_handlers() {
    let e = Variable::new("e", exprlower::well_known::well_known().exception_type());
    let tree = try_catch(
        boom("x", Type::Int),
        vec![catch(exprlower::well_known::well_known().exception_type(), Some(e), add(await_int(1), int(1)).unwrap())],
    )
    .unwrap();
    let out = catch::rewrite_catches(&tree).unwrap();
    let awaiting_handlers = count_exprs(&out, |k| match k {
        ExprKind::Try { handlers, .. } => handlers.iter().any(|h| contains_await(&h.body)),
        _ => false,
    });
    assert_eq!(awaiting_handlers, 0);
    assert_eq!(Interpreter::new().eval(&out).unwrap(), Value::Int(2));
}

#[test]
fn ref_local_pattern_must_be_well_formed() {
    let x = Variable::new("x", Type::Int);
    let r = Variable::new("r", Type::reference(Type::Int));
    let tree = block(
        vec![x.clone(), r.clone()],
        vec![
            assign(param(&r), make_ref(param(&x)).unwrap()).unwrap(),
            assign(param(&r), make_ref(param(&x)).unwrap()).unwrap(),
        ],
    );
    assert!(matches!(ref_local::rewrite_ref_locals(&tree), Err(LowerError::Internal { .. })));
}

#[test]
fn typed_labels_become_void() {
    let l = LabelTarget::new("l", Type::Int);
    let tree = block(vec![], vec![goto_value(&l, int(9)).unwrap(), label(&l, Some(int(0))).unwrap()]);
    let out = typed_label::rewrite_typed_labels(&tree).unwrap();
    assert_eq!(count_exprs(&out, |k| matches!(k, ExprKind::Label { target, .. } if !target.ty().is_void())), 0);
    assert_eq!(Interpreter::new().eval(&out).unwrap(), Value::Int(9));
}

#[test]
fn percolation_lands_on_the_widened_tail() {
    // result = { A; B; (Base)(Derived)x }  =>  { A; B; result = (Base)(Derived)x }
    let base = Type::Class(ClassInfo::new("Base", None, vec![]));
    let derived = Type::Class(ClassInfo::new("Derived", Some(base.clone()), vec![]));
    let x = Variable::new("x", Type::Object);
    let a = Variable::new("a", Type::Int);
    let result = Variable::new("result", base.clone());
    let rhs = typed_block(
        base.clone(),
        vec![],
        vec![
            assign(param(&a), int(1)).unwrap(),
            assign(param(&a), int(2)).unwrap(),
            convert(param(&x), derived.clone()).unwrap(),
        ],
    )
    .unwrap();

    let out = percolate::percolate_result(&result, &rhs).unwrap();
    let ExprKind::Block { exprs, .. } = out.kind() else { panic!("expected a block: {out}") };
    assert!(matches!(exprs[0].kind(), ExprKind::Assign { .. }));
    assert!(matches!(exprs[1].kind(), ExprKind::Assign { .. }));
    match exprs[2].kind() {
        ExprKind::Assign { target, value } => {
            assert_eq!(target.as_parameter(), Some(&result));
            let ExprKind::Convert { operand, ty } = value.kind() else { panic!("expected (Base): {value}") };
            assert_eq!(ty, &base);
            assert!(matches!(operand.kind(), ExprKind::Convert { ty, .. } if ty == &derived));
        }
        other => panic!("expected the result assignment, got {other:?}"),
    }
    let result_assigns =
        count_exprs(&out, |k| matches!(k, ExprKind::Assign { target, .. } if target.as_parameter() == Some(&result)));
    assert_eq!(result_assigns, 1);
}

fn nested(depth: usize) -> Expr {
    (0..depth).fold(int(1), |inner, i| block(vec![], vec![int(i as i64), inner]))
}

#[test]
fn optimizer_reaches_a_fixed_point() {
    let tree = nested(6);
    let once = optimize::optimize(&tree);
    assert!(optimize::optimize(&once).ptr_eq(&once));
    let nested_blocks = count_exprs(&once, |k| match k {
        ExprKind::Block { exprs, .. } => exprs.iter().any(|e| matches!(e.kind(), ExprKind::Block { .. })),
        _ => false,
    });
    assert_eq!(nested_blocks, 0);
    assert_eq!(Interpreter::new().eval(&once).unwrap(), Value::Int(1));
}

#[test]
fn typed_label_with_awaiting_default_is_rewritten() {
    // { if (take) goto l(5); l: await 7 }
    for (take, expected) in [(true, 5), (false, 7)] {
        let l = LabelTarget::new("l", Type::Int);
        let body = block(
            vec![],
            vec![
                if_then(boolean(take), goto_value(&l, int(5)).unwrap()).unwrap(),
                label(&l, Some(await_int(7))).unwrap(),
            ],
        );
        let lambda = async_lambda("typed_label", vec![], body, None).unwrap();
        let lowered = exprlower::lower(&lambda).unwrap();
        let typed = count_exprs(&lowered.body, |k| matches!(k, ExprKind::Label { target, .. } if !target.ty().is_void()));
        assert_eq!(typed, 0, "{}", lowered.body);
        let (value, _) = lower_and_run(&lambda);
        assert_eq!(value, Value::Int(expected));
        assert_eq!(value, run_original(&lambda));
    }
}
