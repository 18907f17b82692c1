//! Tree-walking reference evaluator.
//!
//! Executes primitive trees (plus `Await`, which runs the awaiter protocol by
//! polling). Every other extension node is rejected: it must be reduced first.
//! Used as the execution backend for lowered output in tests and benchmarks.

pub mod value;

pub use value::{Closure, Exception, Location, Object, Value};

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;

use crate::tree::{
    BinaryOp, CatchBlock, ClassInfo, Expr, ExprKind, LabelTarget, LambdaExpr, Literal, Method, SwitchCase, Type,
    UnaryOp, Variable,
};
use crate::well_known::well_known;

pub const DEFAULT_MAX_SUSPENSIONS: usize = 10_000;

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("uncaught exception: {0}")]
    Uncaught(Arc<Exception>),

    #[error("invalid tree: {0}")]
    Invalid(String),

    #[error("await stalled after {suspensions} suspensions")]
    Stalled { suspensions: usize },
}

impl EvalError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }
}

/// Lexical scope: one frame of variable slots plus its parent.
pub struct Scope {
    vars: HashMap<Variable, Location>,
    parent: Option<Env>,
}

pub type Env = Arc<Scope>;

impl Scope {
    pub fn root() -> Env {
        Arc::new(Scope { vars: HashMap::new(), parent: None })
    }

    fn child(parent: &Env, vars: HashMap<Variable, Location>) -> Env {
        Arc::new(Scope { vars, parent: Some(parent.clone()) })
    }

    fn lookup(&self, var: &Variable) -> Option<Location> {
        let mut scope = self;
        loop {
            if let Some(loc) = scope.vars.get(var) {
                return Some(loc.clone());
            }
            scope = scope.parent.as_deref()?;
        }
    }
}

/// Non-local exits unwinding through the evaluator.
enum Signal {
    Jump { target: LabelTarget, value: Value },
    Throw(Arc<Exception>),
    Fatal(EvalError),
}

impl From<EvalError> for Signal {
    fn from(e: EvalError) -> Self {
        Signal::Fatal(e)
    }
}

type Flow<T = Value> = Result<T, Signal>;

fn fatal<T>(msg: impl Into<String>) -> Flow<T> {
    Err(Signal::Fatal(EvalError::invalid(msg)))
}

fn literal(value: &Literal) -> Value {
    match value {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(n) => Value::Int(*n),
        Literal::Double(d) => Value::Double(*d),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

/// Index of the child through which a jump to `target` enters this statement list:
/// the label itself, or a nested block that (transitively) declares it.
fn entry_index(exprs: &[Expr], target: &LabelTarget) -> Option<usize> {
    exprs.iter().position(|e| match e.kind() {
        ExprKind::Label { target: t, .. } => t == target,
        ExprKind::Block { exprs, .. } => entry_index(exprs, target).is_some(),
        _ => false,
    })
}

pub struct Interpreter {
    max_suspensions: usize,
    suspensions: usize,
    frames: Vec<String>,
    handling: Vec<Arc<Exception>>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_max_suspensions(DEFAULT_MAX_SUSPENSIONS)
    }

    pub fn with_max_suspensions(max_suspensions: usize) -> Self {
        Self { max_suspensions, suspensions: 0, frames: Vec::new(), handling: Vec::new() }
    }

    /// Number of times an awaited operation was found incomplete so far.
    pub fn suspensions(&self) -> usize {
        self.suspensions
    }

    /// Invoke a lambda with the given arguments.
    pub fn run(&mut self, lambda: &LambdaExpr, args: &[Value]) -> Result<Value, EvalError> {
        let closure = Closure { lambda: lambda.clone(), env: Scope::root() };
        let result = self.call_closure(&closure, args.to_vec());
        result.map_err(escape)
    }

    /// Evaluate a closed expression.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        self.frames.push("<root>".into());
        let result = self.eval_expr(expr, &Scope::root());
        self.frames.pop();
        result.map_err(escape)
    }

    fn trace(&self) -> Vec<String> {
        self.frames.iter().rev().cloned().collect()
    }

    fn throw_new(&self, class: &Arc<ClassInfo>, message: impl Into<String>) -> Signal {
        let exc = Exception::new(class.clone(), message);
        exc.set_trace(self.trace());
        Signal::Throw(exc)
    }

    fn null_reference(&self, what: &str) -> Signal {
        self.throw_new(&well_known().null_reference, format!("{what} on a null reference"))
    }

    fn call_closure(&mut self, closure: &Closure, args: Vec<Value>) -> Flow {
        let lambda = &closure.lambda;
        if lambda.params.len() != args.len() {
            return fatal(format!(
                "lambda '{}' expects {} argument(s), got {}",
                lambda.display_name(),
                lambda.params.len(),
                args.len()
            ));
        }
        let mut vars = HashMap::new();
        for (param, arg) in lambda.params.iter().zip(args) {
            let loc = match (param.is_by_ref(), arg) {
                (true, Value::Ref(loc)) => loc,
                (true, other) => return fatal(format!("by-ref parameter '{}' bound to {other}", param.name())),
                (false, value) => Location::cell(value),
            };
            vars.insert(param.clone(), loc);
        }
        let env = Scope::child(&closure.env, vars);
        self.frames.push(lambda.display_name().to_string());
        let result = self.eval_expr(&lambda.body, &env);
        self.frames.pop();
        match result {
            Err(Signal::Jump { target, value }) if lambda.return_label.as_ref() == Some(&target) => Ok(value),
            other => other,
        }
    }

    fn call_method(&mut self, method: &Method, args: Vec<Value>) -> Flow {
        match method.invoke(&args) {
            Ok(value) => Ok(value),
            Err(Value::Exception(exc)) => {
                if !exc.has_trace() {
                    let mut trace = vec![method.name().to_string()];
                    trace.extend(self.trace());
                    exc.set_trace(trace);
                }
                Err(Signal::Throw(exc))
            }
            Err(other) => fatal(format!("method '{}' raised non-exception value {other}", method.name())),
        }
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Env) -> Flow {
        match expr.kind() {
            ExprKind::Constant { value, .. } => Ok(literal(value)),
            ExprKind::Default(ty) => Ok(Value::default_for(ty)),
            ExprKind::Parameter(var) => match env.lookup(var) {
                Some(loc) => Ok(loc.get()),
                None => fatal(format!("unbound variable '{}'", var.name())),
            },
            ExprKind::Unary { op, operand, method, .. } => {
                let v = self.eval_expr(operand, env)?;
                match method {
                    Some(m) => self.call_method(m, vec![v]),
                    None => self.unary(*op, v),
                }
            }
            ExprKind::Binary { op, left, right, method, conversion, .. } => {
                if let (BinaryOp::AndAlso | BinaryOp::OrElse, Some(user)) = (op, method) {
                    let l = self.eval_expr(left, env)?;
                    let Some(truth) = &user.truth else {
                        return fatal(format!("{} operator without a truth test", op.symbol()));
                    };
                    if self.call_method(truth, vec![l.clone()])?.as_bool() == Some(true) {
                        return Ok(l);
                    }
                    let r = self.eval_expr(right, env)?;
                    return self.call_method(&user.method, vec![l, r]);
                }
                match op {
                    BinaryOp::AndAlso => {
                        let l = self.eval_expr(left, env)?;
                        match l {
                            Value::Bool(false) => Ok(l),
                            Value::Bool(true) => self.eval_expr(right, env),
                            _ => {
                                let r = self.eval_expr(right, env)?;
                                Ok(if r == Value::Bool(false) { r } else { Value::Null })
                            }
                        }
                    }
                    BinaryOp::OrElse => {
                        let l = self.eval_expr(left, env)?;
                        match l {
                            Value::Bool(true) => Ok(l),
                            Value::Bool(false) => self.eval_expr(right, env),
                            _ => {
                                let r = self.eval_expr(right, env)?;
                                Ok(if r == Value::Bool(true) { r } else { Value::Null })
                            }
                        }
                    }
                    BinaryOp::Coalesce => {
                        let l = self.eval_expr(left, env)?;
                        if l.is_null() {
                            return self.eval_expr(right, env);
                        }
                        match conversion {
                            Some(conv) => self.invoke_value(conv, vec![l], env),
                            None => Ok(l),
                        }
                    }
                    _ => {
                        let l = self.eval_expr(left, env)?;
                        let r = self.eval_expr(right, env)?;
                        match method {
                            Some(user) => self.call_method(&user.method, vec![l, r]),
                            None => self.binary(*op, l, r),
                        }
                    }
                }
            }
            ExprKind::Assign { target, value } => {
                let loc = self.location(target, env)?;
                let v = self.eval_expr(value, env)?;
                loc.set(v.clone());
                Ok(v)
            }
            ExprKind::Block { .. } => self.eval_block(expr, env, None),
            ExprKind::Conditional { test, if_true, if_false, ty } => {
                let branch = match self.eval_expr(test, env)? {
                    Value::Bool(true) => if_true,
                    Value::Bool(false) => if_false,
                    other => return fatal(format!("conditional test evaluated to {other}")),
                };
                let v = self.eval_expr(branch, env)?;
                Ok(if ty.is_void() { Value::Unit } else { v })
            }
            ExprKind::Loop { body, break_label, continue_label } => loop {
                match self.eval_expr(body, env) {
                    Ok(_) => {}
                    Err(Signal::Jump { target, value }) if break_label.as_ref() == Some(&target) => return Ok(value),
                    Err(Signal::Jump { target, .. }) if continue_label.as_ref() == Some(&target) => {}
                    Err(other) => return Err(other),
                }
            },
            ExprKind::Label { default, .. } => match default {
                Some(d) => self.eval_expr(d, env),
                None => Ok(Value::Unit),
            },
            ExprKind::Goto { target, value, .. } => {
                let value = match value {
                    Some(v) => self.eval_expr(v, env)?,
                    None => Value::Unit,
                };
                Err(Signal::Jump { target: target.clone(), value })
            }
            ExprKind::Try { ty, body, handlers, finally, fault } => {
                let v = self.eval_try(body, handlers, finally.as_ref(), fault.as_ref(), env)?;
                Ok(if ty.is_void() { Value::Unit } else { v })
            }
            ExprKind::Switch { ty, value, cases, default } => {
                let v = self.eval_switch(value, cases, default.as_ref(), env)?;
                Ok(if ty.is_void() { Value::Unit } else { v })
            }
            ExprKind::Throw { value, .. } => match self.eval_expr(value, env)? {
                Value::Exception(exc) => {
                    exc.set_trace(self.trace());
                    Err(Signal::Throw(exc))
                }
                Value::Null => Err(self.null_reference("throw")),
                other => fatal(format!("cannot throw {other}")),
            },
            ExprKind::Rethrow { .. } => match self.handling.last() {
                Some(exc) => Err(Signal::Throw(exc.clone())),
                None => fatal("rethrow outside of a catch handler"),
            },
            ExprKind::Member { object, field } => match self.eval_expr(object, env)? {
                Value::Object(obj) => Ok(obj.get(&field.name)),
                Value::Exception(exc) if field.name == "Message" => Ok(Value::str(&exc.message)),
                Value::Null => Err(self.null_reference("field access")),
                other => fatal(format!("no field '{}' on {other}", field.name)),
            },
            ExprKind::Index { array, index } => {
                let a = self.eval_expr(array, env)?;
                let i = self.eval_expr(index, env)?;
                if a.is_null() {
                    return Err(self.null_reference("indexing"));
                }
                let Some(i) = i.as_int() else {
                    return fatal(format!("array index {i} is not an int"));
                };
                match a.array_get(i) {
                    Some(v) => Ok(v),
                    None => Err(self.throw_new(&well_known().index_out_of_range, format!("index {i} is out of range"))),
                }
            }
            ExprKind::Call { object, method, args } => {
                let mut values = Vec::with_capacity(args.len() + 1);
                if let Some(obj) = object {
                    let receiver = self.eval_expr(obj, env)?;
                    if receiver.is_null() {
                        return Err(self.null_reference(&format!("call to '{}'", method.name())));
                    }
                    values.push(receiver);
                }
                for arg in args {
                    values.push(self.eval_expr(arg, env)?);
                }
                self.call_method(method, values)
            }
            ExprKind::New { ty } => match ty.class() {
                Some(class) if class.derives_from(crate::well_known::EXCEPTION_CLASS) => {
                    Ok(Value::Exception(Exception::new(class.clone(), "")))
                }
                Some(class) => Ok(Value::Object(Object::new(class.clone()))),
                None => fatal(format!("cannot instantiate {ty}")),
            },
            ExprKind::NewArray { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(item, env)?);
                }
                Ok(Value::array(values))
            }
            ExprKind::Convert { operand, ty } => {
                let v = self.eval_expr(operand, env)?;
                self.convert(v, ty)
            }
            ExprKind::Lambda(lambda) => {
                Ok(Value::Closure(Arc::new(Closure { lambda: lambda.clone(), env: env.clone() })))
            }
            ExprKind::Invoke { target, args } => {
                let mut values = Vec::with_capacity(args.len());
                let f = self.eval_expr(target, env)?;
                for arg in args {
                    values.push(self.eval_expr(arg, env)?);
                }
                self.invoke(f, values)
            }
            ExprKind::MakeRef { location } => Ok(Value::Ref(self.location(location, env)?)),
            ExprKind::RefValue { .. } => Ok(self.location(expr, env)?.get()),
            ExprKind::RefInvoke { reference, action } => {
                let r = self.eval_expr(reference, env)?;
                self.invoke_value(action, vec![r], env)
            }
            ExprKind::Await { operand, shape } => {
                let task = self.eval_expr(operand, env)?;
                if task.is_null() {
                    return Err(self.null_reference("await"));
                }
                let awaiter = self.call_method(&shape.get_awaiter, vec![task])?;
                loop {
                    let done = self.call_method(&shape.is_completed, vec![awaiter.clone()])?;
                    if done.as_bool() == Some(true) {
                        break;
                    }
                    self.suspensions += 1;
                    if self.suspensions > self.max_suspensions {
                        return Err(Signal::Fatal(EvalError::Stalled { suspensions: self.suspensions }));
                    }
                }
                self.call_method(&shape.get_result, vec![awaiter])
            }
            _ => fatal(format!("extension node must be reduced before evaluation: {expr}")),
        }
    }

    fn invoke_value(&mut self, target: &Expr, args: Vec<Value>, env: &Env) -> Flow {
        let f = self.eval_expr(target, env)?;
        self.invoke(f, args)
    }

    fn invoke(&mut self, f: Value, args: Vec<Value>) -> Flow {
        match f {
            Value::Closure(closure) => self.call_closure(&closure, args),
            Value::Null => Err(self.null_reference("invoke")),
            other => fatal(format!("cannot invoke {other}")),
        }
    }

    /// Resolve an assignable expression to its storage location, evaluating the
    /// object/index operands on the way.
    fn location(&mut self, expr: &Expr, env: &Env) -> Flow<Location> {
        match expr.kind() {
            ExprKind::Parameter(var) => match env.lookup(var) {
                Some(loc) => Ok(loc),
                None => fatal(format!("unbound variable '{}'", var.name())),
            },
            ExprKind::Member { object, field } => match self.eval_expr(object, env)? {
                Value::Object(obj) => Ok(Location::Field(obj, field.name.clone())),
                Value::Null => Err(self.null_reference("field access")),
                other => fatal(format!("no field '{}' on {other}", field.name)),
            },
            ExprKind::Index { array, index } => {
                let a = self.eval_expr(array, env)?;
                let i = self.eval_expr(index, env)?;
                match (a, i.as_int()) {
                    (Value::Null, _) => Err(self.null_reference("indexing")),
                    (a @ Value::Array(_), Some(i)) => {
                        let len = a.array_len().unwrap_or(0);
                        match (usize::try_from(i), a) {
                            (Ok(i), Value::Array(items)) if i < len => Ok(Location::Element(items, i)),
                            _ => Err(self.throw_new(&well_known().index_out_of_range, format!("index {i} is out of range"))),
                        }
                    }
                    (a, _) => fatal(format!("cannot index {a} with {i}")),
                }
            }
            ExprKind::RefValue { reference } => match self.eval_expr(reference, env)? {
                Value::Ref(loc) => Ok(loc),
                Value::Null => Err(self.null_reference("ref access")),
                other => fatal(format!("{other} is not a reference")),
            },
            _ => fatal(format!("not an assignable location: {expr}")),
        }
    }

    fn eval_block(&mut self, expr: &Expr, env: &Env, entry: Option<(LabelTarget, Value)>) -> Flow {
        let ExprKind::Block { ty, variables, exprs } = expr.kind() else {
            return fatal("block entry on a non-block node");
        };
        let scope = if variables.is_empty() {
            env.clone()
        } else {
            let vars = variables.iter().map(|v| (v.clone(), Location::cell(Value::default_for(v.ty())))).collect();
            Scope::child(env, vars)
        };

        let mut pc = 0;
        let mut pending = None;
        if let Some((target, value)) = entry {
            match entry_index(exprs, &target) {
                Some(i) => {
                    pc = i;
                    pending = Some((target, value));
                }
                None => return fatal(format!("label '{}' is not declared in this block", target.name())),
            }
        }

        let mut last = Value::Unit;
        while pc < exprs.len() {
            let child = &exprs[pc];
            let result = match pending.take() {
                Some((target, value)) => self.enter(child, &scope, target, value),
                None => self.eval_expr(child, &scope),
            };
            match result {
                Ok(v) => {
                    last = v;
                    pc += 1;
                }
                Err(Signal::Jump { target, value }) => match entry_index(exprs, &target) {
                    Some(i) => {
                        pc = i;
                        pending = Some((target, value));
                    }
                    None => return Err(Signal::Jump { target, value }),
                },
                Err(other) => return Err(other),
            }
        }
        Ok(if ty.is_void() { Value::Unit } else { last })
    }

    fn enter(&mut self, child: &Expr, scope: &Env, target: LabelTarget, value: Value) -> Flow {
        match child.kind() {
            ExprKind::Label { target: t, .. } if *t == target => Ok(value),
            ExprKind::Block { .. } => self.eval_block(child, scope, Some((target, value))),
            _ => fatal(format!("cannot enter {child} at label '{}'", target.name())),
        }
    }

    fn eval_try(
        &mut self,
        body: &Expr,
        handlers: &[CatchBlock],
        finally: Option<&Expr>,
        fault: Option<&Expr>,
        env: &Env,
    ) -> Flow {
        let mut result = self.eval_expr(body, env);
        if let Err(Signal::Throw(exc)) = &result {
            if !handlers.is_empty() {
                let exc = exc.clone();
                result = self.handle(exc, handlers, env);
            }
        }
        if let (Some(fault), Err(Signal::Throw(_))) = (fault, &result) {
            self.eval_expr(fault, env)?;
        }
        if let Some(finally) = finally {
            self.eval_expr(finally, env)?;
        }
        result
    }

    fn handle(&mut self, exc: Arc<Exception>, handlers: &[CatchBlock], env: &Env) -> Flow {
        let thrown = Value::Exception(exc.clone());
        for handler in handlers {
            if !thrown.is_instance_of(&handler.test) {
                continue;
            }
            let scope = match &handler.variable {
                Some(var) => Scope::child(env, HashMap::from([(var.clone(), Location::cell(thrown.clone()))])),
                None => env.clone(),
            };
            if let Some(filter) = &handler.filter {
                match self.eval_expr(filter, &scope) {
                    Ok(Value::Bool(true)) => {}
                    Ok(_) | Err(Signal::Throw(_)) => continue,
                    Err(other) => return Err(other),
                }
            }
            self.handling.push(exc.clone());
            let result = self.eval_expr(&handler.body, &scope);
            self.handling.pop();
            return result;
        }
        Err(Signal::Throw(exc))
    }

    fn eval_switch(&mut self, value: &Expr, cases: &[SwitchCase], default: Option<&Expr>, env: &Env) -> Flow {
        let v = self.eval_expr(value, env)?;
        for case in cases {
            for test in &case.test_values {
                let t = self.eval_expr(test, env)?;
                if v.equals(&t) {
                    return self.eval_expr(&case.body, env);
                }
            }
        }
        match default {
            Some(d) => self.eval_expr(d, env),
            None => Ok(Value::Unit),
        }
    }

    fn unary(&mut self, op: UnaryOp, v: Value) -> Flow {
        Ok(match (op, v) {
            (UnaryOp::IsTrue, v) => Value::Bool(v == Value::Bool(true)),
            (UnaryOp::IsFalse, v) => Value::Bool(v == Value::Bool(false)),
            (UnaryOp::ArrayLength, Value::Null) => return Err(self.null_reference("length")),
            (UnaryOp::ArrayLength, v) => match v.array_len() {
                Some(n) => Value::Int(n as i64),
                None => return fatal(format!("length of non-array {v}")),
            },
            (_, Value::Null) => Value::Null,
            (UnaryOp::Negate, Value::Int(n)) => Value::Int(n.wrapping_neg()),
            (UnaryOp::Negate, Value::Double(d)) => Value::Double(-d),
            (UnaryOp::Not, Value::Bool(b)) => Value::Bool(!b),
            (UnaryOp::Not, Value::Int(n)) => Value::Int(!n),
            (op, v) => return fatal(format!("{op:?} is not defined on {v}")),
        })
    }

    fn binary(&mut self, op: BinaryOp, l: Value, r: Value) -> Flow {
        use BinaryOp::*;
        match op {
            Equal => return Ok(Value::Bool(l.equals(&r))),
            NotEqual => return Ok(Value::Bool(!l.equals(&r))),
            _ => {}
        }
        if l.is_null() || r.is_null() {
            return Ok(match (op, &l, &r) {
                (And, Value::Bool(false), _) | (And, _, Value::Bool(false)) => Value::Bool(false),
                (Or, Value::Bool(true), _) | (Or, _, Value::Bool(true)) => Value::Bool(true),
                _ if op.is_comparison() => Value::Bool(false),
                _ => Value::Null,
            });
        }
        Ok(match (l, r) {
            (Value::Int(a), Value::Int(b)) => match op {
                Add => Value::Int(a.wrapping_add(b)),
                Subtract => Value::Int(a.wrapping_sub(b)),
                Multiply => Value::Int(a.wrapping_mul(b)),
                Divide | Modulo if b == 0 => {
                    return Err(self.throw_new(&well_known().divide_by_zero, "attempted to divide by zero"));
                }
                Divide => Value::Int(a.wrapping_div(b)),
                Modulo => Value::Int(a.wrapping_rem(b)),
                And => Value::Int(a & b),
                Or => Value::Int(a | b),
                ExclusiveOr => Value::Int(a ^ b),
                LessThan => Value::Bool(a < b),
                LessThanOrEqual => Value::Bool(a <= b),
                GreaterThan => Value::Bool(a > b),
                GreaterThanOrEqual => Value::Bool(a >= b),
                _ => return fatal(format!("'{}' is not defined on int", op.symbol())),
            },
            (Value::Double(a), Value::Double(b)) => match op {
                Add => Value::Double(a + b),
                Subtract => Value::Double(a - b),
                Multiply => Value::Double(a * b),
                Divide => Value::Double(a / b),
                Modulo => Value::Double(a % b),
                LessThan => Value::Bool(a < b),
                LessThanOrEqual => Value::Bool(a <= b),
                GreaterThan => Value::Bool(a > b),
                GreaterThanOrEqual => Value::Bool(a >= b),
                _ => return fatal(format!("'{}' is not defined on double", op.symbol())),
            },
            (Value::Bool(a), Value::Bool(b)) => match op {
                And => Value::Bool(a & b),
                Or => Value::Bool(a | b),
                ExclusiveOr => Value::Bool(a ^ b),
                _ => return fatal(format!("'{}' is not defined on bool", op.symbol())),
            },
            (Value::Str(a), Value::Str(b)) if op == Add => Value::str(&format!("{a}{b}")),
            (l, r) => return fatal(format!("'{}' is not defined on {l} and {r}", op.symbol())),
        })
    }

    fn convert(&mut self, v: Value, to: &Type) -> Flow {
        if v.is_null() {
            return if to.admits_null() {
                Ok(Value::Null)
            } else {
                Err(self.throw_new(&well_known().invalid_cast, format!("null cannot be converted to {to}")))
            };
        }
        match (to.non_nullable(), &v) {
            (Type::Int, Value::Double(d)) => Ok(Value::Int(*d as i64)),
            (Type::Double, Value::Int(n)) => Ok(Value::Double(*n as f64)),
            (Type::Void, _) => Ok(Value::Unit),
            _ if v.is_instance_of(to) => Ok(v),
            _ => Err(self.throw_new(&well_known().invalid_cast, format!("{v} cannot be converted to {to}"))),
        }
    }
}

fn escape(signal: Signal) -> EvalError {
    match signal {
        Signal::Jump { target, .. } => EvalError::invalid(format!("jump to '{}' escaped its lambda", target.name())),
        Signal::Throw(exc) => EvalError::Uncaught(exc),
        Signal::Fatal(err) => err,
    }
}
