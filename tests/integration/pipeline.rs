mod common;

use std::sync::{Arc, Mutex};

use common::*;
use exprlower::eval::{EvalError, Object, Value};
use exprlower::tree::build::*;
use exprlower::tree::{BinaryOp, LabelTarget, LambdaExpr, Method, Type, Variable};
use exprlower::{AsyncLowering, ForbiddenReason, LowerError, LoweringOptions};

/// `Foo()` returns a task yielding 40 after two incomplete polls.
fn foo() -> Method {
    let class = tasks().task.clone();
    Method::new_static(
        "Foo",
        vec![],
        task_type(),
        Arc::new(move |_| {
            let obj = Object::new(class.clone());
            obj.set("Result", Value::Int(40));
            obj.set("Pending", Value::Int(2));
            Ok(Value::Object(obj))
        }),
    )
}

#[test]
fn end_to_end_with_external_return_label() {
    // int x = 1; x += await Foo(); return x + 1;
    let ret = LabelTarget::new("return", Type::Int);
    let x = Variable::new("x", Type::Int);
    let body = block(
        vec![x.clone()],
        vec![
            assign(param(&x), int(1)).unwrap(),
            compound_assign(BinaryOp::Add, param(&x), await_expr(call_static(&foo(), vec![]).unwrap()).unwrap()).unwrap(),
            return_to(&ret, Some(add(param(&x), int(1)).unwrap())).unwrap(),
            empty(),
        ],
    );
    let lambda = async_lambda("Main", vec![], body, Some(ret)).unwrap();
    let (value, suspensions) = lower_and_run(&lambda);
    assert_eq!(value, Value::Int(42));
    assert_eq!(suspensions, 2);
}

#[test]
fn end_to_end_with_return_label_in_body() {
    let ret = LabelTarget::new("return", Type::Int);
    let x = Variable::new("x", Type::Int);
    let body = block(
        vec![x.clone()],
        vec![
            assign(param(&x), int(1)).unwrap(),
            compound_assign(BinaryOp::Add, param(&x), await_expr(call_static(&foo(), vec![]).unwrap()).unwrap()).unwrap(),
            return_to(&ret, Some(add(param(&x), int(1)).unwrap())).unwrap(),
            label(&ret, Some(default(Type::Int))).unwrap(),
        ],
    );
    let lambda = async_lambda("Main", vec![], body, None).unwrap();
    let lowered = AsyncLowering::default().lower(&lambda).unwrap();
    assert!(lowered.leave_labels.is_empty());
    assert!(lowered.result.is_some());
    let (value, _) = lower_and_run(&lambda);
    assert_eq!(value, Value::Int(42));
}

#[test]
fn await_in_lock_body_is_forbidden() {
    let o = Variable::new("o", Type::Object);
    let body = lock(param(&o), block(vec![], vec![await_int(1), empty()])).unwrap();
    let lambda = async_lambda("Locked", vec![o], body, None).unwrap();
    match AsyncLowering::default().lower(&lambda) {
        Err(LowerError::AwaitForbidden { reason, .. }) => assert_eq!(reason, ForbiddenReason::Lock),
        other => panic!("expected AwaitForbidden, got {other:?}"),
    }
}

#[test]
fn await_as_switch_value_is_allowed() {
    let body = switch(await_int(2), vec![switch_case(vec![int(2)], int(20))], Some(int(0))).unwrap();
    let lambda = async_lambda("Switch", vec![], body, None).unwrap();
    let (value, suspensions) = lower_and_run(&lambda);
    assert_eq!(value, Value::Int(20));
    assert_eq!(suspensions, 1);
}

#[test]
fn await_in_switch_case_test_is_forbidden() {
    let body = switch(int(2), vec![switch_case(vec![await_int(2)], int(20))], Some(int(0))).unwrap();
    let lambda = async_lambda("Switch", vec![], body, None).unwrap();
    let err = AsyncLowering::default().lower(&lambda).unwrap_err();
    assert!(matches!(err, LowerError::AwaitForbidden { reason: ForbiddenReason::SwitchCaseTest, .. }));
}

fn guarded_await(first: bool) -> (LambdaExpr, Arc<Mutex<Vec<String>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let f = logging_method(log.clone(), "f", Type::Bool, Value::Bool(first));
    let side = logging_method(log.clone(), "right", Type::Void, Value::Unit);
    let right = block(vec![], vec![call_static(&side, vec![]).unwrap(), equal(await_int(1), int(1)).unwrap()]);
    let body = and_also(call_static(&f, vec![]).unwrap(), right).unwrap();
    (async_lambda("Guarded", vec![], body, None).unwrap(), log)
}

#[test]
fn short_circuit_skips_the_awaiting_operand() {
    let (lambda, log) = guarded_await(false);
    let (value, suspensions) = lower_and_run(&lambda);
    assert_eq!(value, Value::Bool(false));
    assert_eq!(suspensions, 0);
    assert_eq!(*log.lock().unwrap(), vec!["f".to_string()]);
}

#[test]
fn short_circuit_evaluates_the_awaiting_operand_when_needed() {
    let (lambda, log) = guarded_await(true);
    let (value, suspensions) = lower_and_run(&lambda);
    assert_eq!(value, Value::Bool(true));
    assert_eq!(suspensions, 1);
    assert_eq!(*log.lock().unwrap(), vec!["f".to_string(), "right".to_string()]);
}

#[test]
fn rethrow_after_await_reports_the_original_throw_site() {
    let origin = LambdaExpr {
        name: Some("origin".into()),
        ..lambda(vec![], block(vec![], vec![boom("first", Type::Void), int(0)]))
    };
    let handler = block(vec![], vec![await_int(1), rethrow(Type::Int)]);
    let body = try_catch(
        invoke(lambda_expr(origin), vec![]).unwrap(),
        vec![catch(exprlower::well_known::well_known().exception_type(), None, handler)],
    )
    .unwrap();
    let lambda = async_lambda("Main", vec![], body, None).unwrap();
    match lower_and_try(&lambda) {
        Err(EvalError::Uncaught(exc)) => {
            assert_eq!(exc.origin().as_deref(), Some("origin"));
            assert_eq!(exc.message, "first");
        }
        other => panic!("expected the exception to escape, got {other:?}"),
    }
}

#[test]
fn options_do_not_change_results() {
    let x = Variable::new("x", Type::Int);
    let inner = block(vec![x.clone()], vec![assign(param(&x), await_int(2)).unwrap(), param(&x)]);
    let body = block(
        vec![x.clone()],
        vec![assign(param(&x), add(inner, await_int(3)).unwrap()).unwrap(), param(&x)],
    );
    let lambda = async_lambda("Reused", vec![], body, None).unwrap();
    let variants = [
        LoweringOptions::default(),
        LoweringOptions::default().with_scope_mode(exprlower::ScopeMode::Shadow),
        LoweringOptions::default().with_optimize(false),
        LoweringOptions::default().with_trace_stages(true),
    ];
    for options in variants {
        let lowered = lower_with(&lambda, options.clone());
        let value = exprlower::eval::Interpreter::new().run(&lowered, &[]).unwrap();
        assert_eq!(value, Value::Int(5), "{options:?}");
    }
}

#[test]
fn trace_output_goes_through_tracing() {
    let subscriber = tracing_subscriber::fmt().with_max_level(tracing::Level::TRACE).with_test_writer().finish();
    tracing::subscriber::with_default(subscriber, || {
        let lambda = async_lambda("Traced", vec![], add(await_int(1), int(1)).unwrap(), None).unwrap();
        let lowered = exprlower::lower_to_lambda(&lambda, &LoweringOptions::default().with_trace_stages(true)).unwrap();
        assert_eq!(exprlower::eval::Interpreter::new().run(&lowered, &[]).unwrap(), Value::Int(2));
    });
}
