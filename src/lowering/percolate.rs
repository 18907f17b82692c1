//! Assignment percolation.
//!
//! `v = { A; B; tail }` becomes `{ A; B; v = tail }`, and likewise through
//! conditionals, try bodies and handlers, and switch cases, so that no
//! assignment wraps a control-flow skeleton that jump targets live in.

use crate::diagnostics::Result;
use crate::tree::build::{assign, param};
use crate::tree::{CatchBlock, Expr, ExprKind, SwitchCase, Type, Variable};
use crate::visit::composers::{contains_await, contains_label};
use crate::visit::{Rewriter, walk_rewrite};

fn should_percolate(value: &Expr) -> bool {
    matches!(
        value.kind(),
        ExprKind::Block { .. } | ExprKind::Conditional { .. } | ExprKind::Try { .. } | ExprKind::Switch { .. }
    )
}

#[derive(Default)]
pub struct Percolator {
    percolated: usize,
}

impl Percolator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn percolated(&self) -> usize {
        self.percolated
    }
}

impl Rewriter for Percolator {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr> {
        match expr.kind() {
            ExprKind::Lambda(_) => Ok(expr.clone()),
            ExprKind::Assign { target, value } => {
                let target = self.rewrite_expr(target)?;
                let value = self.rewrite_expr(value)?;
                match target.as_parameter() {
                    Some(var) if should_percolate(&value) && (contains_await(&value) || contains_label(&value)) => {
                        self.percolated += 1;
                        percolate(var, &value, &value.ty())
                    }
                    _ => Ok(expr.with_children(vec![target, value])),
                }
            }
            _ => walk_rewrite(self, expr),
        }
    }
}

/// Push `var = value` into every tail position of `value`.
pub fn percolate_result(var: &Variable, value: &Expr) -> Result<Expr> {
    let mut percolator = Percolator::new();
    let value = percolator.rewrite_expr(value)?;
    let out = percolate(var, &value, &value.ty())?;
    tracing::debug!(
        target: "exprlower::percolate",
        nested = percolator.percolated(),
        result = var.name(),
        "percolated result assignment"
    );
    Ok(out)
}

/// `source` is the static type of the outermost right-hand side; mismatched
/// leaves are converted to it.
fn percolate(var: &Variable, value: &Expr, source: &Type) -> Result<Expr> {
    let ty = var.ty().clone();
    Ok(match value.kind() {
        ExprKind::Block { variables, exprs, .. } => {
            let mut exprs = exprs.clone();
            if let Some(last) = exprs.pop() {
                exprs.push(percolate(var, &last, source)?);
            }
            Expr::new(ExprKind::Block { ty, variables: variables.clone(), exprs })
        }
        ExprKind::Conditional { test, if_true, if_false, .. } => Expr::new(ExprKind::Conditional {
            test: test.clone(),
            if_true: percolate(var, if_true, source)?,
            if_false: percolate(var, if_false, source)?,
            ty,
        }),
        ExprKind::Try { body, handlers, finally, fault, .. } => {
            let handlers = handlers
                .iter()
                .map(|h| {
                    Ok(CatchBlock {
                        test: h.test.clone(),
                        variable: h.variable.clone(),
                        filter: h.filter.clone(),
                        body: percolate(var, &h.body, source)?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Expr::new(ExprKind::Try {
                ty,
                body: percolate(var, body, source)?,
                handlers,
                finally: finally.clone(),
                fault: fault.clone(),
            })
        }
        ExprKind::Switch { value: scrutinee, cases, default, .. } => {
            let cases = cases
                .iter()
                .map(|c| {
                    Ok(SwitchCase { test_values: c.test_values.clone(), body: percolate(var, &c.body, source)? })
                })
                .collect::<Result<Vec<_>>>()?;
            let default = default.as_ref().map(|d| percolate(var, d, source)).transpose()?;
            Expr::new(ExprKind::Switch { ty, value: scrutinee.clone(), cases, default })
        }
        // Leaves that never produce a value.
        ExprKind::Goto { .. } | ExprKind::Throw { .. } | ExprKind::Rethrow { .. } => value.clone(),
        _ => {
            let leaf = if &value.ty() == source {
                value.clone()
            } else {
                Expr::new(ExprKind::Convert { operand: value.clone(), ty: source.clone() })
            };
            assign(param(var), leaf)?
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Value;
    use crate::lowering::test_support::run_closed;
    use crate::tree::build::*;
    use crate::tree::{ClassInfo, LabelTarget};
    use crate::visit::composers::count_exprs;

    fn assigns_to(expr: &Expr, var: &Variable) -> usize {
        count_exprs(expr, |k| matches!(k, ExprKind::Assign { target, .. } if target.as_parameter() == Some(var)))
    }

    #[test]
    fn block_tail_gets_the_assignment_with_a_widening_conversion() {
        let base = Type::Class(ClassInfo::new("Base", None, vec![]));
        let derived = Type::Class(ClassInfo::new("Derived", Some(base.clone()), vec![]));
        let x = Variable::new("x", Type::Object);
        let a = Variable::new("a", Type::Int);
        let result = Variable::new("result", base.clone());

        let tail = convert(param(&x), derived).unwrap();
        let rhs = typed_block(
            base.clone(),
            vec![],
            vec![assign(param(&a), int(1)).unwrap(), assign(param(&a), int(2)).unwrap(), tail.clone()],
        )
        .unwrap();
        let out = percolate_result(&result, &rhs).unwrap();

        let ExprKind::Block { exprs, .. } = out.kind() else { panic!("expected a block, got {out}") };
        assert_eq!(exprs.len(), 3);
        let ExprKind::Assign { target, value } = exprs[2].kind() else { panic!("tail is {}", exprs[2]) };
        assert_eq!(target.as_parameter(), Some(&result));
        match value.kind() {
            ExprKind::Convert { operand, ty } => {
                assert!(operand.ptr_eq(&tail));
                assert_eq!(ty, &base);
            }
            other => panic!("expected a conversion, got {other:?}"),
        }
        assert_eq!(assigns_to(&out, &result), 1);
    }

    #[test]
    fn every_branch_assigns() {
        let result = Variable::new("result", Type::Int);
        let flag = Variable::new("flag", Type::Bool);
        let rhs = block(
            vec![flag.clone()],
            vec![
                assign(param(&flag), boolean(false)).unwrap(),
                condition(param(&flag), int(1), switch(int(2), vec![switch_case(vec![int(2)], int(20))], Some(int(0))).unwrap())
                    .unwrap(),
            ],
        );
        let out = percolate_result(&result, &rhs).unwrap();
        assert_eq!(assigns_to(&out, &result), 3);

        let run = block(vec![result.clone()], vec![out, param(&result)]);
        assert_eq!(run_closed(&run), Value::Int(20));
    }

    #[test]
    fn jumps_are_not_assigned() {
        let result = Variable::new("result", Type::Int);
        let l = LabelTarget::void("l");
        let rhs = block(vec![], vec![goto(&l).unwrap(), label(&l, None).unwrap(), int(3)]);
        let out = percolate_result(&result, &rhs).unwrap();
        assert_eq!(assigns_to(&out, &result), 1);
        let run = block(vec![result.clone()], vec![out, param(&result)]);
        assert_eq!(run_closed(&run), Value::Int(3));
    }

    #[test]
    fn nested_assignments_over_labels_percolate() {
        let result = Variable::new("result", Type::Int);
        let inner = Variable::new("inner", Type::Int);
        let l = LabelTarget::void("l");
        let nested = assign(param(&inner), block(vec![], vec![label(&l, None).unwrap(), int(4)])).unwrap();
        let rhs = block(vec![inner.clone()], vec![nested, param(&inner)]);
        let out = percolate_result(&result, &rhs).unwrap();
        let top_level = count_exprs(&out, |k| {
            matches!(k, ExprKind::Assign { value, .. } if matches!(value.kind(), ExprKind::Block { .. }))
        });
        assert_eq!(top_level, 0, "{out}");
    }
}
