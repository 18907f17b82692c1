//! Compact single-line rendering of expression trees, used in logs, error
//! messages and test assertions.

use std::fmt;

use crate::tree::expr::*;

fn list(f: &mut fmt::Formatter<'_>, items: &[Expr], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn label_suffix(f: &mut fmt::Formatter<'_>, brk: &Option<LabelTarget>, cont: &Option<LabelTarget>) -> fmt::Result {
    if brk.is_none() && cont.is_none() {
        return Ok(());
    }
    write!(f, "[")?;
    if let Some(b) = brk {
        write!(f, "break {}", b.name())?;
    }
    if let Some(c) = cont {
        if brk.is_some() {
            write!(f, ", ")?;
        }
        write!(f, "continue {}", c.name())?;
    }
    write!(f, "]")
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Null => write!(f, "null"),
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Double(d) => write!(f, "{d:?}"),
            Literal::Str(s) => write!(f, "{:?}", s.as_ref()),
        }
    }
}

impl fmt::Display for LambdaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_async {
            write!(f, "async ")?;
        }
        write!(f, "(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if p.is_by_ref() {
                write!(f, "ref ")?;
            }
            write!(f, "{}", p.name())?;
        }
        write!(f, ") => {}", self.body)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            ExprKind::Constant { value, .. } => write!(f, "{value}"),
            ExprKind::Default(ty) if ty.is_void() => write!(f, "()"),
            ExprKind::Default(ty) => write!(f, "default({ty})"),
            ExprKind::Parameter(v) => write!(f, "{}", v.name()),
            ExprKind::Unary { op, operand, method: Some(m), .. } => write!(f, "{}[{op:?}]({operand})", m.name()),
            ExprKind::Unary { op, operand, .. } => match op {
                UnaryOp::Negate => write!(f, "-{operand}"),
                UnaryOp::Not => write!(f, "!{operand}"),
                UnaryOp::IsTrue => write!(f, "istrue({operand})"),
                UnaryOp::IsFalse => write!(f, "isfalse({operand})"),
                UnaryOp::ArrayLength => write!(f, "{operand}.Length"),
            },
            ExprKind::Binary { op, left, right, method, .. } => match method {
                Some(m) => write!(f, "{}({left} {} {right})", m.method.name(), op.symbol()),
                None => write!(f, "({left} {} {right})", op.symbol()),
            },
            ExprKind::Assign { target, value } => write!(f, "{target} = {value}"),
            ExprKind::Block { variables, exprs, .. } => {
                write!(f, "{{ ")?;
                if !variables.is_empty() {
                    write!(f, "var ")?;
                    for (i, v) in variables.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", v.name())?;
                    }
                    write!(f, "; ")?;
                }
                list(f, exprs, "; ")?;
                write!(f, " }}")
            }
            ExprKind::Conditional { test, if_true, if_false, .. } => {
                write!(f, "if ({test}) {if_true} else {if_false}")
            }
            ExprKind::Loop { body, break_label, continue_label } => {
                write!(f, "loop")?;
                label_suffix(f, break_label, continue_label)?;
                write!(f, " {body}")
            }
            ExprKind::Label { target, default: Some(d) } => write!(f, "{}: {d}", target.name()),
            ExprKind::Label { target, default: None } => write!(f, "{}:", target.name()),
            ExprKind::Goto { kind, target, value, .. } => {
                let word = match kind {
                    GotoKind::Goto => "goto",
                    GotoKind::Break => "break",
                    GotoKind::Continue => "continue",
                    GotoKind::Return => "return",
                };
                write!(f, "{word} {}", target.name())?;
                if let Some(v) = value {
                    write!(f, " {v}")?;
                }
                Ok(())
            }
            ExprKind::Try { body, handlers, finally, fault, .. } => {
                write!(f, "try {body}")?;
                for h in handlers {
                    write!(f, " catch ({}", h.test)?;
                    if let Some(v) = &h.variable {
                        write!(f, " {}", v.name())?;
                    }
                    write!(f, ")")?;
                    if let Some(filter) = &h.filter {
                        write!(f, " when ({filter})")?;
                    }
                    write!(f, " {}", h.body)?;
                }
                if let Some(fin) = finally {
                    write!(f, " finally {fin}")?;
                }
                if let Some(fault) = fault {
                    write!(f, " fault {fault}")?;
                }
                Ok(())
            }
            ExprKind::Switch { value, cases, default, .. } => {
                write!(f, "switch ({value}) {{ ")?;
                for c in cases {
                    write!(f, "case ")?;
                    list(f, &c.test_values, ", ")?;
                    write!(f, ": {}; ", c.body)?;
                }
                if let Some(d) = default {
                    write!(f, "default: {d}; ")?;
                }
                write!(f, "}}")
            }
            ExprKind::Throw { value, .. } => write!(f, "throw {value}"),
            ExprKind::Rethrow { .. } => write!(f, "rethrow"),
            ExprKind::Member { object, field } => write!(f, "{object}.{}", field.name),
            ExprKind::Index { array, index } => write!(f, "{array}[{index}]"),
            ExprKind::Call { object, method, args } => {
                if let Some(o) = object {
                    write!(f, "{o}.")?;
                }
                write!(f, "{}(", method.name())?;
                list(f, args, ", ")?;
                write!(f, ")")
            }
            ExprKind::New { ty } => write!(f, "new {ty}()"),
            ExprKind::NewArray { element, items } => {
                write!(f, "new {element}[] {{ ")?;
                list(f, items, ", ")?;
                write!(f, " }}")
            }
            ExprKind::Convert { operand, ty } => write!(f, "({ty}){operand}"),
            ExprKind::Lambda(lambda) => write!(f, "{lambda}"),
            ExprKind::Invoke { target, args } => {
                write!(f, "{target}(")?;
                list(f, args, ", ")?;
                write!(f, ")")
            }
            ExprKind::MakeRef { location } => write!(f, "ref {location}"),
            ExprKind::RefValue { reference } => write!(f, "{reference}.Value"),
            ExprKind::RefInvoke { reference, action } => write!(f, "{reference}.Invoke({action})"),
            ExprKind::Await { operand, .. } => write!(f, "await {operand}"),
            ExprKind::CompoundAssign { op, target, value, .. } => write!(f, "{target} {}= {value}", op.symbol()),
            ExprKind::IncrementAssign { op, target } => match op {
                IncrementOp::PreIncrement => write!(f, "++{target}"),
                IncrementOp::PreDecrement => write!(f, "--{target}"),
                IncrementOp::PostIncrement => write!(f, "{target}++"),
                IncrementOp::PostDecrement => write!(f, "{target}--"),
            },
            ExprKind::While { test, body, break_label, continue_label } => {
                write!(f, "while")?;
                label_suffix(f, break_label, continue_label)?;
                write!(f, " ({test}) {body}")
            }
            ExprKind::For { initializers, test, steppers, body, break_label, continue_label, .. } => {
                write!(f, "for")?;
                label_suffix(f, break_label, continue_label)?;
                write!(f, " (")?;
                list(f, initializers, ", ")?;
                write!(f, "; ")?;
                if let Some(t) = test {
                    write!(f, "{t}")?;
                }
                write!(f, "; ")?;
                list(f, steppers, ", ")?;
                write!(f, ") {body}")
            }
            ExprKind::ForEach { variable, collection, body, break_label, continue_label } => {
                write!(f, "foreach")?;
                label_suffix(f, break_label, continue_label)?;
                write!(f, " ({} in {collection}) {body}", variable.name())
            }
            ExprKind::Using { variable, resource, body, .. } => match variable {
                Some(v) => write!(f, "using ({} = {resource}) {body}", v.name()),
                None => write!(f, "using ({resource}) {body}"),
            },
            ExprKind::Lock { object, body } => write!(f, "lock ({object}) {body}"),
        }
    }
}
