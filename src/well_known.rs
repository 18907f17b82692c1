//! Runtime helpers the lowering passes emit calls to.
//!
//! Built once per process; every pass shares the same method identities.

use std::sync::{Arc, OnceLock};

use crate::eval::{Exception, Value};
use crate::tree::{ClassInfo, Method, Type};

/// Name of the root exception class. `throw` only accepts classes deriving from it.
pub const EXCEPTION_CLASS: &str = "Exception";

pub struct WellKnown {
    pub exception: Arc<ClassInfo>,
    pub null_reference: Arc<ClassInfo>,
    pub invalid_cast: Arc<ClassInfo>,
    pub index_out_of_range: Arc<ClassInfo>,
    pub divide_by_zero: Arc<ClassInfo>,
    /// `monitor_enter(object)`
    pub monitor_enter: Method,
    /// `monitor_exit(object)`
    pub monitor_exit: Method,
    /// Rethrows an already-thrown exception without resetting its stack trace.
    pub capture_and_throw: Method,
    /// `make_exception(message) -> Exception`
    pub make_exception: Method,
}

pub fn well_known() -> &'static WellKnown {
    static TABLE: OnceLock<WellKnown> = OnceLock::new();
    TABLE.get_or_init(WellKnown::init)
}

impl WellKnown {
    fn init() -> Self {
        let exception = ClassInfo::new(EXCEPTION_CLASS, None, vec![("Message".into(), Type::String)]);
        let derived = |name: &str| ClassInfo::new(name, Some(Type::Class(exception.clone())), vec![]);
        let null_reference = derived("NullReferenceException");
        let invalid_cast = derived("InvalidCastException");
        let index_out_of_range = derived("IndexOutOfRangeException");
        let divide_by_zero = derived("DivideByZeroException");

        let monitor_enter = Method::new_static("monitor_enter", vec![Type::Object], Type::Void, Arc::new(|_| Ok(Value::Unit)));
        let monitor_exit = Method::new_static("monitor_exit", vec![Type::Object], Type::Void, Arc::new(|_| Ok(Value::Unit)));

        let capture_and_throw = Method::new_static(
            "capture_and_throw",
            vec![Type::Class(exception.clone())],
            Type::Void,
            Arc::new(|args| Err(args.first().cloned().unwrap_or(Value::Null))),
        );

        let exception_for_factory = exception.clone();
        let make_exception = Method::new_static(
            "make_exception",
            vec![Type::String],
            Type::Class(exception.clone()),
            Arc::new(move |args| {
                let message = match args.first() {
                    Some(Value::Str(s)) => s.to_string(),
                    _ => String::new(),
                };
                Ok(Value::Exception(Exception::new(exception_for_factory.clone(), message)))
            }),
        );

        Self {
            exception,
            null_reference,
            invalid_cast,
            index_out_of_range,
            divide_by_zero,
            monitor_enter,
            monitor_exit,
            capture_and_throw,
            make_exception,
        }
    }

    pub fn exception_type(&self) -> Type {
        Type::Class(self.exception.clone())
    }
}
