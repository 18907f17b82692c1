//! Shared fixtures for the lowering unit tests: an awaitable `Task` class whose
//! instances report incomplete for a fixed number of polls.

use std::sync::{Arc, OnceLock};

use crate::eval::{Object, Value};
use crate::tree::build::*;
use crate::tree::{ClassInfo, Expr, Method, Type};

pub(crate) struct Tasks {
    pub task: Arc<ClassInfo>,
    /// `make_task(result, polls) -> Task`
    pub make: Method,
}

pub(crate) fn tasks() -> &'static Tasks {
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
                    let Some(obj) = args[0].as_object() else { return Ok(Value::Bool(true)) };
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
                Arc::new(|args| Ok(args[0].as_object().map(|o| o.get("Result")).unwrap_or(Value::Int(0)))),
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

/// A task producing `result` after one incomplete poll.
pub(crate) fn task_of(result: i64) -> Expr {
    call_static(&tasks().make, vec![int(result), int(1)]).unwrap()
}

pub(crate) fn await_int(result: i64) -> Expr {
    await_expr(task_of(result)).unwrap()
}

pub(crate) fn run_closed(body: &Expr) -> Value {
    crate::eval::Interpreter::new().eval(body).unwrap()
}
