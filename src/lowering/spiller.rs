//! Stack spilling.
//!
//! After this stage every `await` sits where a suspension can resume: as a
//! statement of a block, or as the whole right-hand side of an assignment to a
//! variable that is itself a statement, with an await-free operand. Operands
//! evaluated before an await are stored in temporaries first, so their values
//! survive the suspension and evaluation order is preserved. Control-flow nodes
//! in value position are assigned to a temporary; the percolator later pushes
//! that assignment into their leaves.

use crate::diagnostics::{LowerError, Result};
use crate::tree::build::{empty, param};
use crate::tree::{CatchBlock, Expr, ExprKind, SwitchCase, Type, Variable};
use crate::visit::composers::contains_await;

/// Statements to run first, then an await-free expression for the value.
struct Spilled {
    stmts: Vec<Expr>,
    value: Expr,
}

impl Spilled {
    fn pure(value: Expr) -> Self {
        Self { stmts: Vec::new(), value }
    }
}

#[derive(Default)]
pub struct Spiller {
    /// Temporaries introduced for the statement currently being spilled.
    temps: Vec<Variable>,
    introduced: usize,
}

impl Spiller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn introduced(&self) -> usize {
        self.introduced
    }

    fn temp(&mut self, ty: Type) -> Variable {
        self.introduced += 1;
        let v = Variable::new(format!("spill{}", self.introduced), ty);
        self.temps.push(v.clone());
        v
    }

    /// Spill a statement and declare its temporaries in a block around it.
    pub fn spill_statement(&mut self, expr: &Expr) -> Result<Expr> {
        let saved = std::mem::take(&mut self.temps);
        let result = self.statement(expr);
        let temps = std::mem::replace(&mut self.temps, saved);
        let out = result?;
        if temps.is_empty() {
            return Ok(out);
        }
        Ok(Expr::new(ExprKind::Block { ty: out.ty(), variables: temps, exprs: vec![out] }))
    }

    fn statement(&mut self, expr: &Expr) -> Result<Expr> {
        if !contains_await(expr) {
            return Ok(expr.clone());
        }
        match expr.kind() {
            ExprKind::Block { ty, variables, exprs } => {
                let mut variables = variables.clone();
                let mut out = Vec::with_capacity(exprs.len());
                for e in exprs {
                    if !matches!(e.kind(), ExprKind::Label { .. }) {
                        out.push(self.spill_statement(e)?);
                        continue;
                    }
                    // A label stays a direct child of its block so jumps from
                    // siblings still reach it.
                    let saved = std::mem::take(&mut self.temps);
                    let result = self.statement(e);
                    variables.extend(std::mem::replace(&mut self.temps, saved));
                    let spilled = result?;
                    match spilled.kind() {
                        ExprKind::Block { variables: inner, exprs: stmts, .. } if inner.is_empty() => {
                            out.extend(stmts.iter().cloned())
                        }
                        _ => out.push(spilled),
                    }
                }
                Ok(Expr::new(ExprKind::Block { ty: ty.clone(), variables, exprs: out }))
            }
            ExprKind::Conditional { test, if_true, if_false, ty } => {
                let test = self.value(test)?;
                let if_true = self.statement(if_true)?;
                let if_false = self.statement(if_false)?;
                let node = Expr::new(ExprKind::Conditional { test: test.value, if_true, if_false, ty: ty.clone() });
                Ok(sequence(test.stmts, node))
            }
            ExprKind::Loop { body, break_label, continue_label } => Ok(Expr::new(ExprKind::Loop {
                body: self.statement(body)?,
                break_label: break_label.clone(),
                continue_label: continue_label.clone(),
            })),
            ExprKind::Try { ty, body, handlers, finally, fault } => {
                let body = self.statement(body)?;
                let handlers = handlers
                    .iter()
                    .map(|h| {
                        Ok(CatchBlock {
                            test: h.test.clone(),
                            variable: h.variable.clone(),
                            filter: h.filter.clone(),
                            body: self.statement(&h.body)?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let finally = finally.as_ref().map(|f| self.statement(f)).transpose()?;
                let fault = fault.as_ref().map(|f| self.statement(f)).transpose()?;
                Ok(Expr::new(ExprKind::Try { ty: ty.clone(), body, handlers, finally, fault }))
            }
            ExprKind::Switch { ty, value, cases, default } => {
                let value = self.value(value)?;
                let cases = cases
                    .iter()
                    .map(|c| {
                        Ok(SwitchCase { test_values: c.test_values.clone(), body: self.statement(&c.body)? })
                    })
                    .collect::<Result<Vec<_>>>()?;
                let default = default.as_ref().map(|d| self.statement(d)).transpose()?;
                let node = Expr::new(ExprKind::Switch { ty: ty.clone(), value: value.value, cases, default });
                Ok(sequence(value.stmts, node))
            }
            ExprKind::Goto { kind, target, value: Some(v), ty } => {
                let v = self.value(v)?;
                let node = Expr::new(ExprKind::Goto { kind: *kind, target: target.clone(), value: Some(v.value), ty: ty.clone() });
                Ok(sequence(v.stmts, node))
            }
            ExprKind::Label { target, default: Some(d) } => {
                let d = self.value(d)?;
                let node = Expr::new(ExprKind::Label { target: target.clone(), default: Some(d.value) });
                Ok(sequence(d.stmts, node))
            }
            ExprKind::Assign { target, value } if target.as_parameter().is_some() => match value.kind() {
                ExprKind::Await { operand, shape } => {
                    let operand = self.value(operand)?;
                    let awaited = Expr::new(ExprKind::Await { operand: operand.value, shape: shape.clone() });
                    let node = Expr::new(ExprKind::Assign { target: target.clone(), value: awaited });
                    Ok(sequence(operand.stmts, node))
                }
                _ if is_control_flow(value) => {
                    let value = self.statement(value)?;
                    Ok(Expr::new(ExprKind::Assign { target: target.clone(), value }))
                }
                _ => self.general_statement(expr),
            },
            ExprKind::Await { operand, shape } => {
                let operand = self.value(operand)?;
                let awaited = Expr::new(ExprKind::Await { operand: operand.value, shape: shape.clone() });
                Ok(sequence(operand.stmts, awaited))
            }
            _ => self.general_statement(expr),
        }
    }

    fn general_statement(&mut self, expr: &Expr) -> Result<Expr> {
        let spilled = self.value(expr)?;
        Ok(sequence(spilled.stmts, spilled.value))
    }

    /// Spill an expression whose value is consumed by its parent.
    fn value(&mut self, expr: &Expr) -> Result<Spilled> {
        if !contains_await(expr) {
            return Ok(Spilled::pure(expr.clone()));
        }
        let ty = expr.ty();
        match expr.kind() {
            ExprKind::Await { operand, shape } => {
                let operand = self.value(operand)?;
                let mut stmts = operand.stmts;
                let awaited = Expr::new(ExprKind::Await { operand: operand.value, shape: shape.clone() });
                if ty.is_void() {
                    stmts.push(awaited);
                    return Ok(Spilled { stmts, value: empty() });
                }
                let t = self.temp(ty);
                stmts.push(Expr::new(ExprKind::Assign { target: param(&t), value: awaited }));
                Ok(Spilled { stmts, value: param(&t) })
            }
            ExprKind::Goto { .. } => {
                let stmt = self.statement(expr)?;
                Ok(Spilled { stmts: vec![stmt], value: Expr::new(ExprKind::Default(ty)) })
            }
            _ if is_control_flow(expr) => {
                let stmt = self.statement(expr)?;
                if ty.is_void() {
                    return Ok(Spilled { stmts: vec![stmt], value: empty() });
                }
                let t = self.temp(ty);
                Ok(Spilled {
                    stmts: vec![Expr::new(ExprKind::Assign { target: param(&t), value: stmt })],
                    value: param(&t),
                })
            }
            ExprKind::Binary { op, .. } if op.is_short_circuit() => Err(LowerError::internal(format!(
                "'{}' with an awaiting operand reached the spiller unreduced",
                op.symbol()
            ))),
            ExprKind::Assign { target, value } => {
                // The location's operands are evaluated before the value; the
                // location itself is not a value to copy.
                let mut operands = target.children();
                operands.push(value);
                let spilled = self.operands(&operands)?;
                let mut values = spilled.values;
                let new_value = values.pop().unwrap_or_else(empty);
                let new_target = target.with_children(values);
                Ok(Spilled {
                    stmts: spilled.stmts,
                    value: Expr::new(ExprKind::Assign { target: new_target, value: new_value }),
                })
            }
            ExprKind::MakeRef { location } => {
                let spilled = self.operands(&location.children())?;
                let location = location.with_children(spilled.values);
                Ok(Spilled { stmts: spilled.stmts, value: Expr::new(ExprKind::MakeRef { location }) })
            }
            _ => {
                let spilled = self.operands(&expr.children())?;
                Ok(Spilled { stmts: spilled.stmts, value: expr.with_children(spilled.values) })
            }
        }
    }

    /// Spill an ordered operand list. Operands before the last awaiting one are
    /// captured in temporaries; operands after it are left in place.
    fn operands(&mut self, operands: &[&Expr]) -> Result<SpilledOperands> {
        let Some(last) = operands.iter().rposition(|o| contains_await(o)) else {
            return Ok(SpilledOperands { stmts: Vec::new(), values: operands.iter().map(|o| (*o).clone()).collect() });
        };
        let mut stmts = Vec::new();
        let mut values = Vec::with_capacity(operands.len());
        for (i, operand) in operands.iter().enumerate() {
            if i > last {
                values.push((*operand).clone());
                continue;
            }
            let spilled = self.value(operand)?;
            stmts.extend(spilled.stmts);
            if i == last || !needs_capture(&spilled.value) {
                values.push(spilled.value);
            } else {
                let t = self.temp(spilled.value.ty());
                stmts.push(Expr::new(ExprKind::Assign { target: param(&t), value: spilled.value }));
                values.push(param(&t));
            }
        }
        Ok(SpilledOperands { stmts, values })
    }
}

struct SpilledOperands {
    stmts: Vec<Expr>,
    values: Vec<Expr>,
}

fn is_control_flow(expr: &Expr) -> bool {
    matches!(
        expr.kind(),
        ExprKind::Block { .. }
            | ExprKind::Conditional { .. }
            | ExprKind::Loop { .. }
            | ExprKind::Try { .. }
            | ExprKind::Switch { .. }
            | ExprKind::Label { .. }
    )
}

/// Whether a value computed before a suspension must be copied to survive it.
/// Ref locals never change once bound.
fn needs_capture(value: &Expr) -> bool {
    match value.kind() {
        ExprKind::Constant { .. } | ExprKind::Default(_) | ExprKind::Lambda(_) => false,
        ExprKind::Parameter(v) => !matches!(v.ty(), Type::Ref(_)),
        _ => !value.ty().is_void(),
    }
}

fn sequence(mut stmts: Vec<Expr>, last: Expr) -> Expr {
    if stmts.is_empty() {
        return last;
    }
    let ty = last.ty();
    stmts.push(last);
    Expr::new(ExprKind::Block { ty, variables: Vec::new(), exprs: stmts })
}

/// Move every await of `body` into a resumable position.
pub fn spill(body: &Expr) -> Result<Expr> {
    let mut spiller = Spiller::new();
    let out = spiller.spill_statement(body)?;
    tracing::debug!(target: "exprlower::spiller", temporaries = spiller.introduced(), "spilled await operands");
    Ok(out)
}
