#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use exprlower::eval::{EvalError, Interpreter, Object, Value};
use exprlower::tree::build::*;
use exprlower::tree::{ClassInfo, Expr, LambdaExpr, Method, Type};
use exprlower::{AsyncLowering, LoweringOptions};

/// An awaitable whose `IsCompleted` reports false for `Pending` polls.
pub struct Tasks {
    pub task: Arc<ClassInfo>,
    pub make: Method,
}

pub fn tasks() -> &'static Tasks {
    static TASKS: OnceLock<Tasks> = OnceLock::new();
    TASKS.get_or_init(|| {
        let task = ClassInfo::new("Task", None, vec![("Result".into(), Type::Int), ("Pending".into(), Type::Int)]);
        let task_ty = Type::Class(task.clone());
        task.define_methods(vec![
            Method::new_instance("Task", "GetAwaiter", vec![], task_ty.clone(), Arc::new(|args| Ok(args[0].clone()))),
            Method::new_instance(
                "Task",
                "IsCompleted",
                vec![],
                Type::Bool,
                Arc::new(|args| {
                    let obj = args[0].as_object().expect("task object");
                    let pending = obj.get("Pending").as_int().unwrap_or(0);
                    if pending > 0 {
                        obj.set("Pending", Value::Int(pending - 1));
                    }
                    Ok(Value::Bool(pending == 0))
                }),
            ),
            Method::new_instance(
                "Task",
                "GetResult",
                vec![],
                Type::Int,
                Arc::new(|args| Ok(args[0].as_object().expect("task object").get("Result"))),
            ),
        ]);
        let class = task.clone();
        let make = Method::new_static(
            "make_task",
            vec![Type::Int, Type::Int],
            task_ty,
            Arc::new(move |args| {
                let obj = Object::new(class.clone());
                obj.set("Result", args[0].clone());
                obj.set("Pending", args[1].clone());
                Ok(Value::Object(obj))
            }),
        );
        Tasks { task, make }
    })
}

pub fn task_type() -> Type {
    Type::Class(tasks().task.clone())
}

/// A task yielding `result` after `polls` incomplete polls.
pub fn task_after(result: i64, polls: i64) -> Expr {
    call_static(&tasks().make, vec![int(result), int(polls)]).unwrap()
}

pub fn await_int(result: i64) -> Expr {
    await_expr(task_after(result, 1)).unwrap()
}

pub fn boom(message: &str, ty: Type) -> Expr {
    let exception = call_static(&exprlower::well_known::well_known().make_exception, vec![string(message)]).unwrap();
    throw(exception, ty).unwrap()
}

pub fn lower_with(lambda: &LambdaExpr, options: LoweringOptions) -> LambdaExpr {
    AsyncLowering::new(options).lower(lambda).unwrap().into_lambda().unwrap()
}

/// Lower with default options and run; returns the value and the number of
/// suspensions observed.
pub fn lower_and_run(lambda: &LambdaExpr) -> (Value, usize) {
    let lowered = lower_with(lambda, LoweringOptions::default());
    let mut interp = Interpreter::new();
    let value = interp.run(&lowered, &[]).unwrap();
    (value, interp.suspensions())
}

pub fn lower_and_try(lambda: &LambdaExpr) -> Result<Value, EvalError> {
    let lowered = lower_with(lambda, LoweringOptions::default());
    Interpreter::new().run(&lowered, &[])
}

/// Run the async lambda as written (primitive nodes plus `Await` only).
pub fn run_original(lambda: &LambdaExpr) -> Value {
    Interpreter::new().run(lambda, &[]).unwrap()
}

/// A static method that appends `tag` to a shared log when called and returns `value`.
pub fn logging_method(log: Arc<std::sync::Mutex<Vec<String>>>, tag: &str, ret: Type, value: Value) -> Method {
    let tag = tag.to_string();
    Method::new_static(
        format!("log_{tag}"),
        vec![],
        ret,
        Arc::new(move |_| {
            log.lock().expect("log lock").push(tag.clone());
            Ok(value.clone())
        }),
    )
}
