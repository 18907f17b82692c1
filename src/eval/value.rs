use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::tree::{ClassInfo, LambdaExpr, Type};

use super::Env;

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// A heap object: class plus named field slots.
pub struct Object {
    pub class: Arc<ClassInfo>,
    fields: Mutex<HashMap<String, Value>>,
}

impl Object {
    /// A fresh instance with every field (inherited ones included) at its default.
    pub fn new(class: Arc<ClassInfo>) -> Arc<Self> {
        let fields = class.all_fields().into_iter().map(|(name, ty)| (name, Value::default_for(&ty))).collect();
        Arc::new(Self { class, fields: Mutex::new(fields) })
    }

    pub fn get(&self, field: &str) -> Value {
        locked(&self.fields).get(field).cloned().unwrap_or(Value::Null)
    }

    pub fn set(&self, field: &str, value: Value) {
        locked(&self.fields).insert(field.to_string(), value);
    }
}

/// A thrown (or throwable) exception. The trace lists frame names, innermost first.
pub struct Exception {
    pub class: Arc<ClassInfo>,
    pub message: String,
    trace: Mutex<Vec<String>>,
}

impl Exception {
    pub fn new(class: Arc<ClassInfo>, message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { class, message: message.into(), trace: Mutex::new(Vec::new()) })
    }

    pub fn trace(&self) -> Vec<String> {
        locked(&self.trace).clone()
    }

    /// Frame the exception was thrown from, if it has been thrown.
    pub fn origin(&self) -> Option<String> {
        locked(&self.trace).first().cloned()
    }

    pub(crate) fn set_trace(&self, trace: Vec<String>) {
        *locked(&self.trace) = trace;
    }

    pub(crate) fn has_trace(&self) -> bool {
        !locked(&self.trace).is_empty()
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("class", &self.class.name)
            .field("message", &self.message)
            .field("trace", &self.trace())
            .finish()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.class.name, self.message)
    }
}

/// A storage location a by-reference value points at.
#[derive(Clone)]
pub enum Location {
    Var(Arc<Mutex<Value>>),
    Field(Arc<Object>, String),
    Element(Arc<Mutex<Vec<Value>>>, usize),
}

impl Location {
    pub fn cell(value: Value) -> Self {
        Location::Var(Arc::new(Mutex::new(value)))
    }

    pub fn get(&self) -> Value {
        match self {
            Location::Var(cell) => locked(cell).clone(),
            Location::Field(obj, name) => obj.get(name),
            Location::Element(items, i) => locked(items).get(*i).cloned().unwrap_or(Value::Null),
        }
    }

    pub fn set(&self, value: Value) {
        match self {
            Location::Var(cell) => *locked(cell) = value,
            Location::Field(obj, name) => obj.set(name, value),
            Location::Element(items, i) => {
                if let Some(slot) = locked(items).get_mut(*i) {
                    *slot = value;
                }
            }
        }
    }
}

pub struct Closure {
    pub lambda: LambdaExpr,
    pub env: Env,
}

#[derive(Clone)]
pub enum Value {
    Unit,
    Null,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Arc<str>),
    Object(Arc<Object>),
    Array(Arc<Mutex<Vec<Value>>>),
    Exception(Arc<Exception>),
    Ref(Location),
    Closure(Arc<Closure>),
}

impl Value {
    pub fn default_for(ty: &Type) -> Value {
        match ty {
            Type::Void => Value::Unit,
            Type::Bool => Value::Bool(false),
            Type::Int => Value::Int(0),
            Type::Double => Value::Double(0.0),
            _ => Value::Null,
        }
    }

    pub fn str(s: &str) -> Value {
        Value::Str(Arc::from(s))
    }

    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Arc::new(Mutex::new(items)))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Arc<Object>> {
        match self {
            Value::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_exception(&self) -> Option<&Arc<Exception>> {
        match self {
            Value::Exception(e) => Some(e),
            _ => None,
        }
    }

    /// Elements of an array value (a snapshot).
    pub fn items(&self) -> Option<Vec<Value>> {
        match self {
            Value::Array(items) => Some(locked(items).clone()),
            _ => None,
        }
    }

    pub(crate) fn array_len(&self) -> Option<usize> {
        match self {
            Value::Array(items) => Some(locked(items).len()),
            _ => None,
        }
    }

    pub(crate) fn array_get(&self, i: i64) -> Option<Value> {
        match self {
            Value::Array(items) => usize::try_from(i).ok().and_then(|i| locked(items).get(i).cloned()),
            _ => None,
        }
    }

    /// Runtime class of a reference value.
    pub fn class(&self) -> Option<&Arc<ClassInfo>> {
        match self {
            Value::Object(o) => Some(&o.class),
            Value::Exception(e) => Some(&e.class),
            _ => None,
        }
    }

    /// Whether a non-null value is an instance of `ty` (used by catch tests and casts).
    pub fn is_instance_of(&self, ty: &Type) -> bool {
        match (self, ty.non_nullable()) {
            (Value::Null, _) => false,
            (_, Type::Object) => true,
            (Value::Bool(_), Type::Bool)
            | (Value::Int(_), Type::Int)
            | (Value::Double(_), Type::Double)
            | (Value::Str(_), Type::String)
            | (Value::Array(_), Type::Array(_))
            | (Value::Ref(_), Type::Ref(_))
            | (Value::Closure(_), Type::Function(..)) => true,
            (v, Type::Class(c)) => v.class().is_some_and(|vc| vc.derives_from(&c.name)),
            _ => false,
        }
    }

    /// Equality used by `==` and switch case matching: numeric and string values
    /// by value, references by identity.
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Unit, Value::Unit) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Int(a), Value::Double(b)) | (Value::Double(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.equals(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unit => write!(f, "()"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Double(d) => write!(f, "{d:?}"),
            Value::Str(s) => write!(f, "{:?}", s.as_ref()),
            Value::Object(o) => write!(f, "<{}>", o.class.name),
            Value::Array(items) => {
                write!(f, "[")?;
                for (i, item) in locked(items).iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Exception(e) => write!(f, "{e}"),
            Value::Ref(loc) => write!(f, "ref {}", loc.get()),
            Value::Closure(c) => write!(f, "<closure {}>", c.lambda.display_name()),
        }
    }
}
