//! Lowered bodies must behave like the async bodies they came from.

mod common;

use std::sync::{Arc, Mutex};

use common::*;
use exprlower::eval::Value;
use exprlower::tree::build::*;
use exprlower::tree::{BinaryOp, ClassInfo, Expr, IncrementOp, LabelTarget, Method, Type, Variable};

fn await_of(result: Expr) -> Expr {
    await_expr(call_static(&tasks().make, vec![result, int(1)]).unwrap()).unwrap()
}

fn async_fn(body: Expr) -> exprlower::tree::LambdaExpr {
    async_lambda("body", vec![], body, None).unwrap()
}

#[test]
fn while_loop_accumulates_awaited_values() {
    let sum = Variable::new("sum", Type::Int);
    let i = Variable::new("i", Type::Int);
    let body = block(
        vec![sum.clone(), i.clone()],
        vec![
            while_loop(
                less_than(param(&i), int(3)).unwrap(),
                block(
                    vec![],
                    vec![
                        compound_assign(BinaryOp::Add, param(&sum), await_of(param(&i))).unwrap(),
                        increment(IncrementOp::PostIncrement, param(&i)).unwrap(),
                    ],
                ),
                None,
                None,
            )
            .unwrap(),
            param(&sum),
        ],
    );
    let (value, suspensions) = lower_and_run(&async_fn(body));
    assert_eq!(value, Value::Int(3));
    assert_eq!(suspensions, 3);
}

#[test]
fn for_each_awaits_every_element() {
    let sum = Variable::new("sum", Type::Int);
    let item = Variable::new("item", Type::Int);
    let items = new_array(Type::Int, vec![int(1), int(2), int(3)]).unwrap();
    let body = block(
        vec![sum.clone()],
        vec![
            for_each(
                item.clone(),
                items,
                compound_assign(BinaryOp::Add, param(&sum), await_of(param(&item))).unwrap(),
                None,
                None,
            )
            .unwrap(),
            param(&sum),
        ],
    );
    assert_eq!(lower_and_run(&async_fn(body)).0, Value::Int(6));
}

#[test]
fn break_out_of_a_loop_after_an_await() {
    let x = Variable::new("x", Type::Int);
    let brk = LabelTarget::void("brk");
    let body = block(
        vec![x.clone()],
        vec![
            loop_expr(
                block(
                    vec![],
                    vec![
                        compound_assign(BinaryOp::Add, param(&x), await_int(1)).unwrap(),
                        if_then(less_than(int(2), param(&x)).unwrap(), break_to(&brk).unwrap()).unwrap(),
                    ],
                ),
                Some(brk.clone()),
                None,
            )
            .unwrap(),
            param(&x),
        ],
    );
    assert_eq!(lower_and_run(&async_fn(body)).0, Value::Int(3));
}

#[test]
fn postfix_increment_on_an_awaited_index() {
    let arr = Variable::new("arr", Type::array(Type::Int));
    let old = Variable::new("old", Type::Int);
    let body = block(
        vec![arr.clone(), old.clone()],
        vec![
            assign(param(&arr), new_array(Type::Int, vec![int(1), int(2)]).unwrap()).unwrap(),
            assign(param(&old), increment(IncrementOp::PostIncrement, index(param(&arr), await_int(1)).unwrap()).unwrap())
                .unwrap(),
            add(binary(BinaryOp::Multiply, param(&old), int(10)).unwrap(), index(param(&arr), int(1)).unwrap()).unwrap(),
        ],
    );
    // old = 2, arr[1] = 3
    assert_eq!(lower_and_run(&async_fn(body)).0, Value::Int(23));
}

#[test]
fn using_disposes_after_an_awaiting_body() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let resource = ClassInfo::new("Resource", None, vec![]);
    let sink = log.clone();
    resource.define_methods(vec![Method::new_instance(
        "Resource",
        "Dispose",
        vec![],
        Type::Void,
        Arc::new(move |_| {
            sink.lock().unwrap().push("dispose".to_string());
            Ok(Value::Unit)
        }),
    )]);
    let noted = logging_method(log.clone(), "body", Type::Void, Value::Unit);
    let inner = block(vec![], vec![call_static(&noted, vec![]).unwrap(), await_int(7)]);
    let body = using(None, new_object(Type::Class(resource)).unwrap(), inner).unwrap();
    assert_eq!(lower_and_run(&async_fn(body)).0, Value::Int(7));
    assert_eq!(*log.lock().unwrap(), vec!["body".to_string(), "dispose".to_string()]);
}

#[test]
fn finally_runs_after_a_deferred_handler() {
    let log = Variable::new("log", Type::Int);
    let handler = catch(
        Type::Object,
        None,
        block(vec![], vec![assign(param(&log), await_int(4)).unwrap(), empty()]),
    );
    let body = block(
        vec![log.clone()],
        vec![
            try_catch_finally(
                block(vec![], vec![boom("x", Type::Void), empty()]),
                vec![handler],
                assign(param(&log), add(param(&log), int(1)).unwrap()).unwrap(),
            )
            .unwrap(),
            param(&log),
        ],
    );
    assert_eq!(lower_and_run(&async_fn(body)).0, Value::Int(5));
}

#[test]
fn closures_see_values_assigned_after_awaits() {
    let x = Variable::new("x", Type::Int);
    let read = lambda(vec![], param(&x));
    let f = Variable::new("f", read.ty());
    let body = block(
        vec![x.clone(), f.clone()],
        vec![
            assign(param(&f), lambda_expr(read)).unwrap(),
            assign(param(&x), await_int(11)).unwrap(),
            invoke(param(&f), vec![]).unwrap(),
        ],
    );
    assert_eq!(lower_and_run(&async_fn(body)).0, Value::Int(11));
}

#[test]
fn coalesce_with_an_awaiting_fallback() {
    let s = Variable::new("s", Type::String);
    let fallback = block(vec![], vec![await_int(1), string("fallback")]);
    let body = block(vec![s.clone()], vec![coalesce(param(&s), fallback).unwrap()]);
    let (value, suspensions) = lower_and_run(&async_fn(body));
    assert_eq!(value, Value::str("fallback"));
    assert_eq!(suspensions, 1);
}

/// Trees made of primitive nodes plus `Await` run directly; lowering must not
/// change their result.
#[test]
fn lowering_preserves_primitive_results() {
    let x = Variable::new("x", Type::Int);
    let y = Variable::new("y", Type::Int);
    let bodies = vec![
        add(await_int(20), await_int(22)).unwrap(),
        condition(less_than(await_int(1), int(2)).unwrap(), await_int(3), int(4)).unwrap(),
        block(
            vec![x.clone(), y.clone()],
            vec![
                assign(param(&x), await_int(5)).unwrap(),
                assign(param(&y), binary(BinaryOp::Subtract, param(&x), await_int(2)).unwrap()).unwrap(),
                binary(BinaryOp::Multiply, param(&x), param(&y)).unwrap(),
            ],
        ),
        switch(add(await_int(1), int(1)).unwrap(), vec![switch_case(vec![int(2)], await_int(8))], Some(int(0))).unwrap(),
        unary(exprlower::tree::UnaryOp::Negate, await_int(6)).unwrap(),
    ];
    for body in bodies {
        let lambda = async_fn(body);
        assert_eq!(lower_and_run(&lambda).0, run_original(&lambda), "{}", lambda.body);
    }
}
