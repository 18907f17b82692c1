//! Reduction of extension nodes to primitive nodes.
//!
//! Compound and increment assignments, the structured loops, `using` and `lock`
//! are always expanded. Short-circuit operators (`&&`, `||`, `??`) are kept as
//! primitives unless one of their operands awaits; those become explicit
//! conditionals so the spiller never has to reorder a conditionally evaluated
//! operand. `Await` itself survives for the later stages.

use crate::diagnostics::{LowerError, Result};
use crate::tree::build::*;
use crate::tree::{
    BinaryOp, Expr, ExprKind, LabelTarget, LambdaExpr, Literal, Method, Type, UnaryOp, UserOperator, Variable,
};
use crate::visit::{Rewriter, walk_rewrite};
use crate::well_known::well_known;

#[derive(Default)]
pub struct Reducer {
    /// Whether the subtree being rewritten contains an await.
    await_found: bool,
    reduced: usize,
}

impl Reducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of nodes expanded so far.
    pub fn reduced(&self) -> usize {
        self.reduced
    }

    /// Rewrite `expr`, reporting whether it contains an await of its own.
    fn operand(&mut self, expr: &Expr) -> Result<(Expr, bool)> {
        let outer = std::mem::replace(&mut self.await_found, false);
        let out = self.rewrite_expr(expr);
        let found = self.await_found;
        self.await_found = outer || found;
        Ok((out?, found))
    }

    fn reduce_node(&mut self, expr: &Expr) -> Result<Expr> {
        match expr.kind() {
            ExprKind::Await { operand, shape } => {
                let new_operand = self.rewrite_expr(operand)?;
                self.await_found = true;
                if new_operand.ptr_eq(operand) {
                    return Ok(expr.clone());
                }
                Ok(Expr::new(ExprKind::Await { operand: new_operand, shape: shape.clone() }))
            }
            // A nested lambda is its own async context.
            ExprKind::Lambda(lambda) => {
                let saved = self.await_found;
                let body = self.rewrite_expr(&lambda.body)?;
                self.await_found = saved;
                if body.ptr_eq(&lambda.body) {
                    return Ok(expr.clone());
                }
                Ok(lambda_expr(LambdaExpr { body, ..lambda.clone() }))
            }
            ExprKind::Binary { op, left, right, conversion, .. } if op.is_short_circuit() => {
                let (l, left_awaits) = self.operand(left)?;
                let (r, right_awaits) = self.operand(right)?;
                let mut kids = vec![l, r];
                if let Some(conv) = conversion {
                    kids.push(self.rewrite_expr(conv)?);
                }
                let rebuilt = expr.with_children(kids);
                if left_awaits || right_awaits {
                    self.reduced += 1;
                    self.short_circuit(&rebuilt)
                } else {
                    Ok(rebuilt)
                }
            }
            _ if expr.is_extension() => {
                let node = walk_rewrite(self, expr)?;
                self.reduced += 1;
                self.expand(&node)
            }
            _ => walk_rewrite(self, expr),
        }
    }

    fn expand(&mut self, node: &Expr) -> Result<Expr> {
        match node.kind() {
            ExprKind::CompoundAssign { op, target, value, method } => {
                let (vars, mut stmts, location) = stabilize(target)?;
                let combined = operator(*op, location.clone(), value.clone(), method.as_ref())?;
                stmts.push(assign(location, combined)?);
                Ok(sequence(vars, stmts))
            }
            ExprKind::IncrementAssign { op, target } => {
                let (mut vars, mut stmts, location) = stabilize(target)?;
                let ty = location.ty();
                let one = constant(unit_literal(&ty), ty.clone())?;
                if op.is_prefix() {
                    let updated = binary(op.binary_op(), location.clone(), one)?;
                    stmts.push(assign(location, updated)?);
                } else {
                    let old = Variable::new("old", ty);
                    stmts.push(assign(param(&old), location.clone())?);
                    stmts.push(assign(location, binary(op.binary_op(), param(&old), one)?)?);
                    stmts.push(param(&old));
                    vars.push(old);
                }
                Ok(sequence(vars, stmts))
            }
            ExprKind::While { test, body, break_label, continue_label } => {
                let brk = break_label.clone().unwrap_or_else(|| LabelTarget::void("while_break"));
                let guarded = if_then_else(test.clone(), body.clone(), break_to(&brk)?)?;
                Ok(loop_expr(guarded, Some(brk), continue_label.clone())?)
            }
            ExprKind::For { variables, initializers, test, steppers, body, break_label, continue_label } => {
                let brk = break_label.clone().unwrap_or_else(|| LabelTarget::void("for_break"));
                // `continue` lands before the steppers.
                let mut iteration = vec![body.clone()];
                if let Some(cont) = continue_label {
                    iteration.push(label(cont, None)?);
                }
                iteration.extend(steppers.iter().cloned());
                let iteration = typed_block(Type::Void, vec![], iteration)?;
                let guarded = match test {
                    Some(test) => if_then_else(test.clone(), iteration, break_to(&brk)?)?,
                    None => iteration,
                };
                let mut stmts = initializers.clone();
                stmts.push(loop_expr(guarded, Some(brk), None)?);
                Ok(typed_block(Type::Void, variables.clone(), stmts)?)
            }
            ExprKind::ForEach { variable, collection, body, break_label, continue_label } => {
                let brk = break_label.clone().unwrap_or_else(|| LabelTarget::void("foreach_break"));
                let items = Variable::new("items", collection.ty());
                let i = Variable::new("i", Type::Int);

                let fetch = assign(param(variable), index(param(&items), param(&i))?)?;
                let mut iteration = vec![typed_block(Type::Void, vec![variable.clone()], vec![fetch, body.clone()])?];
                if let Some(cont) = continue_label {
                    iteration.push(label(cont, None)?);
                }
                iteration.push(assign(param(&i), add(param(&i), int(1))?)?);

                let test = less_than(param(&i), unary(UnaryOp::ArrayLength, param(&items))?)?;
                let guarded = if_then_else(test, typed_block(Type::Void, vec![], iteration)?, break_to(&brk)?)?;
                Ok(typed_block(
                    Type::Void,
                    vec![items.clone(), i.clone()],
                    vec![
                        assign(param(&items), collection.clone())?,
                        assign(param(&i), int(0))?,
                        loop_expr(guarded, Some(brk), None)?,
                    ],
                )?)
            }
            ExprKind::Using { variable, resource, body, dispose } => {
                let r = variable.clone().unwrap_or_else(|| Variable::new("resource", resource.ty()));
                let dispose_call = call(Some(param(&r)), dispose, vec![])?;
                let cleanup = if r.ty().admits_null() {
                    if_then(not_equal(param(&r), null(r.ty().clone())?)?, dispose_call)?
                } else {
                    dispose_call
                };
                let guarded = try_finally(body.clone(), cleanup)?;
                Ok(typed_block(body.ty(), vec![r.clone()], vec![assign(param(&r), resource.clone())?, guarded])?)
            }
            ExprKind::Lock { object, body } => {
                let wk = well_known();
                let o = Variable::new("lock_object", object.ty());
                let enter = call_static(&wk.monitor_enter, vec![param(&o)])?;
                let exit = call_static(&wk.monitor_exit, vec![param(&o)])?;
                Ok(typed_block(
                    body.ty(),
                    vec![o.clone()],
                    vec![assign(param(&o), object.clone())?, enter, try_finally(body.clone(), exit)?],
                )?)
            }
            _ => Err(LowerError::internal(format!("no expansion for {node}"))),
        }
    }

    /// `&&`, `||` and `??` with an awaiting operand, as conditionals over a
    /// temporary holding the left operand.
    fn short_circuit(&mut self, node: &Expr) -> Result<Expr> {
        let ExprKind::Binary { op, left, right, ty, method, conversion } = node.kind() else {
            return Err(LowerError::internal("short-circuit expansion on a non-binary node"));
        };
        let t = Variable::new("left", left.ty());
        let init = assign(param(&t), left.clone())?;

        let select = match (op, method) {
            (BinaryOp::AndAlso | BinaryOp::OrElse, Some(user)) => {
                let truth = user
                    .truth
                    .as_ref()
                    .ok_or_else(|| LowerError::internal(format!("{} operator without a truth test", op.symbol())))?;
                let decided = call_static(truth, vec![param(&t)])?;
                let combined = call_static(&user.method, vec![param(&t), right.clone()])?;
                condition_typed(decided, param(&t), combined, ty.clone())?
            }
            (BinaryOp::AndAlso, None) if *ty == Type::Bool => {
                condition(param(&t), right.clone(), boolean(false))?
            }
            (BinaryOp::OrElse, None) if *ty == Type::Bool => condition(param(&t), boolean(true), right.clone())?,
            (BinaryOp::AndAlso | BinaryOp::OrElse, None) => {
                // Lifted three-valued logic: a null left operand still evaluates the right one.
                let (stop, keep) = match op {
                    BinaryOp::AndAlso => (UnaryOp::IsFalse, UnaryOp::IsTrue),
                    _ => (UnaryOp::IsTrue, UnaryOp::IsFalse),
                };
                let u = Variable::new("right", right.ty());
                let null_left = condition_typed(
                    unary(stop, param(&u))?,
                    param(&u),
                    null(ty.clone())?,
                    ty.clone(),
                )?;
                let rest = typed_block(
                    ty.clone(),
                    vec![u.clone()],
                    vec![
                        assign(param(&u), right.clone())?,
                        condition_typed(unary(keep, param(&t))?, param(&u), null_left, ty.clone())?,
                    ],
                )?;
                condition_typed(unary(stop, param(&t))?, param(&t), rest, ty.clone())?
            }
            (BinaryOp::Coalesce, _) => {
                let present = match conversion {
                    Some(conv) => {
                        let param_ty = match conv.ty() {
                            Type::Function(params, _) => params.first().cloned().unwrap_or(Type::Object),
                            other => other,
                        };
                        invoke(conv.clone(), vec![coerce(param(&t), &param_ty)?])?
                    }
                    None => coerce(param(&t), ty)?,
                };
                let test = not_equal(param(&t), null(t.ty().clone())?)?;
                condition_typed(test, present, right.clone(), ty.clone())?
            }
            _ => return Err(LowerError::internal(format!("'{}' is not a short-circuit operator", op.symbol()))),
        };
        Ok(Expr::new(ExprKind::Block { ty: ty.clone(), variables: vec![t], exprs: vec![init, select] }))
    }
}

impl Rewriter for Reducer {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr> {
        let outer = std::mem::replace(&mut self.await_found, false);
        let result = self.reduce_node(expr);
        self.await_found |= outer;
        result
    }
}

/// Operands whose value cannot change between two reads. Ref locals are bound
/// once, so re-reading one is as good as a temporary.
fn is_stable(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::Constant { .. } | ExprKind::Default(_) => true,
        ExprKind::Parameter(v) => matches!(v.ty(), Type::Ref(_)),
        _ => false,
    }
}

fn pin(expr: &Expr, name: &str, vars: &mut Vec<Variable>, stmts: &mut Vec<Expr>) -> Result<Expr> {
    if is_stable(expr) {
        return Ok(expr.clone());
    }
    let temp = Variable::new(name, expr.ty());
    stmts.push(assign(param(&temp), expr.clone())?);
    vars.push(temp.clone());
    Ok(param(&temp))
}

/// Evaluate the operands of an assignable location once. Returns the temporaries,
/// their initializers, and the location re-expressed over them.
fn stabilize(target: &Expr) -> Result<(Vec<Variable>, Vec<Expr>, Expr)> {
    let mut vars = Vec::new();
    let mut stmts = Vec::new();
    let location = match target.kind() {
        ExprKind::Parameter(_) => target.clone(),
        ExprKind::Member { object, field } => {
            let object = pin(object, "target", &mut vars, &mut stmts)?;
            Expr::new(ExprKind::Member { object, field: field.clone() })
        }
        ExprKind::Index { array, index } => {
            let array = pin(array, "array", &mut vars, &mut stmts)?;
            let index = pin(index, "index", &mut vars, &mut stmts)?;
            Expr::new(ExprKind::Index { array, index })
        }
        ExprKind::RefValue { reference } => {
            let reference = pin(reference, "reference", &mut vars, &mut stmts)?;
            Expr::new(ExprKind::RefValue { reference })
        }
        _ => return Err(LowerError::internal(format!("not an assignable location: {target}"))),
    };
    Ok((vars, stmts, location))
}

fn operator(op: BinaryOp, left: Expr, right: Expr, method: Option<&Method>) -> Result<Expr> {
    Ok(match method {
        Some(m) => binary_with_method(op, left, right, UserOperator { method: m.clone(), truth: None })?,
        None => binary(op, left, right)?,
    })
}

fn unit_literal(ty: &Type) -> Literal {
    match ty.non_nullable() {
        Type::Double => Literal::Double(1.0),
        _ => Literal::Int(1),
    }
}

fn coerce(expr: Expr, ty: &Type) -> Result<Expr> {
    if expr.ty() == *ty {
        return Ok(expr);
    }
    Ok(convert(expr, ty.clone())?)
}

fn sequence(vars: Vec<Variable>, mut stmts: Vec<Expr>) -> Expr {
    if vars.is_empty() && stmts.len() == 1 {
        if let Some(only) = stmts.pop() {
            return only;
        }
    }
    block(vars, stmts)
}

/// Expand every extension node except `Await`.
pub fn reduce(body: &Expr) -> Result<Expr> {
    let mut reducer = Reducer::new();
    let out = reducer.rewrite_expr(body)?;
    tracing::debug!(target: "exprlower::reducer", reduced = reducer.reduced(), "reduced extension nodes");
    Ok(out)
}
