//! Typed-label rewriting.
//!
//! A label that carries a value cannot sit at the tail of a percolated
//! assignment. For every block whose direct children include such a label and
//! that jumps to it, the label becomes a void label plus a block-scoped result
//! variable:
//!
//! ```text
//! L: default          =>   v = default; L':; v
//! goto L(value)       =>   { v = value; goto L' }
//! ```

use crate::diagnostics::Result;
use crate::tree::build::{assign, param};
use crate::tree::{Expr, ExprKind, LabelTarget, Variable};
use crate::visit::composers::count_exprs;
use crate::visit::scope_tracker::ScopeTracker;
use crate::visit::{Rewriter, walk_rewrite};

pub struct TypedLabelRewriter {
    /// Original target to its void replacement and result variable.
    scopes: ScopeTracker<LabelTarget, (LabelTarget, Variable)>,
    rewritten: usize,
}

impl Default for TypedLabelRewriter {
    fn default() -> Self {
        Self::new()
    }
}

impl TypedLabelRewriter {
    pub fn new() -> Self {
        Self { scopes: ScopeTracker::with_initial_scope(), rewritten: 0 }
    }

    pub fn rewritten(&self) -> usize {
        self.rewritten
    }

    fn rewrite_block(&mut self, expr: &Expr) -> Result<Expr> {
        let ExprKind::Block { ty, variables, exprs } = expr.kind() else {
            return walk_rewrite(self, expr);
        };
        let typed: Vec<LabelTarget> = exprs
            .iter()
            .filter_map(|e| match e.kind() {
                ExprKind::Label { target, .. } if !target.ty().is_void() => Some(target.clone()),
                _ => None,
            })
            .filter(|target| {
                count_exprs(expr, |k| matches!(k, ExprKind::Goto { target: t, .. } if t == target)) > 0
            })
            .collect();
        if typed.is_empty() {
            return walk_rewrite(self, expr);
        }

        self.scopes.push_scope();
        let mut variables = variables.clone();
        for target in &typed {
            let replacement = LabelTarget::void(target.name());
            let result = Variable::new(format!("{}_result", target.name()), target.ty().clone());
            variables.push(result.clone());
            self.scopes.insert(target.clone(), (replacement, result));
        }

        let mut out = Vec::with_capacity(exprs.len() + 2 * typed.len());
        for child in exprs {
            match child.kind() {
                ExprKind::Label { target, default } if typed.contains(target) => {
                    let Some((replacement, result)) = self.scopes.lookup(target).cloned() else {
                        continue;
                    };
                    let fallthrough = match default {
                        Some(d) => self.rewrite_expr(d)?,
                        None => Expr::new(ExprKind::Default(target.ty().clone())),
                    };
                    out.push(assign(param(&result), fallthrough)?);
                    out.push(Expr::new(ExprKind::Label { target: replacement, default: None }));
                    out.push(param(&result));
                    self.rewritten += 1;
                }
                _ => out.push(self.rewrite_expr(child)?),
            }
        }
        self.scopes.pop_scope();
        Ok(Expr::new(ExprKind::Block { ty: ty.clone(), variables, exprs: out }))
    }
}

impl Rewriter for TypedLabelRewriter {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr> {
        match expr.kind() {
            ExprKind::Lambda(_) => Ok(expr.clone()),
            ExprKind::Block { .. } => self.rewrite_block(expr),
            ExprKind::Goto { kind, target, value, ty } => {
                let Some((replacement, result)) = self.scopes.lookup(target).cloned() else {
                    return walk_rewrite(self, expr);
                };
                let jump = Expr::new(ExprKind::Goto { kind: *kind, target: replacement, value: None, ty: ty.clone() });
                let exprs = match value {
                    Some(v) => vec![assign(param(&result), self.rewrite_expr(v)?)?, jump],
                    None => vec![jump],
                };
                Ok(Expr::new(ExprKind::Block { ty: ty.clone(), variables: Vec::new(), exprs }))
            }
            _ => walk_rewrite(self, expr),
        }
    }
}

/// Replace value-carrying labels with void labels plus result variables.
pub fn rewrite_typed_labels(body: &Expr) -> Result<Expr> {
    let mut rewriter = TypedLabelRewriter::new();
    let out = rewriter.rewrite_expr(body)?;
    debug_assert_eq!(rewriter.scopes.depth(), 1, "unbalanced label scopes");
    tracing::debug!(target: "exprlower::typed_label", rewritten = rewriter.rewritten(), "rewrote typed labels");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::Value;
    use crate::lowering::test_support::run_closed;
    use crate::tree::Type;
    use crate::tree::build::*;

    fn typed_labels(expr: &Expr) -> usize {
        count_exprs(expr, |k| matches!(k, ExprKind::Label { target, .. } if !target.ty().is_void()))
    }

    fn jump_then_label(take_jump: bool) -> Expr {
        let l = LabelTarget::new("l", Type::Int);
        block(
            vec![],
            vec![
                if_then(boolean(take_jump), goto_value(&l, int(5)).unwrap()).unwrap(),
                label(&l, Some(int(1))).unwrap(),
            ],
        )
    }

    #[test]
    fn jump_carries_its_value_through_the_variable() {
        let out = rewrite_typed_labels(&jump_then_label(true)).unwrap();
        assert_eq!(typed_labels(&out), 0, "{out}");
        assert_eq!(run_closed(&out), Value::Int(5));
    }

    #[test]
    fn fallthrough_yields_the_default() {
        let out = rewrite_typed_labels(&jump_then_label(false)).unwrap();
        assert_eq!(run_closed(&out), Value::Int(1));
    }

    #[test]
    fn unreferenced_typed_labels_are_kept() {
        let l = LabelTarget::new("l", Type::Int);
        let tree = block(vec![], vec![label(&l, Some(int(1))).unwrap()]);
        assert!(rewrite_typed_labels(&tree).unwrap().ptr_eq(&tree));
    }

    #[test]
    fn jumps_from_nested_blocks_are_redirected() {
        let l = LabelTarget::new("l", Type::Int);
        let x = Variable::new("x", Type::Int);
        let inner = block(
            vec![x.clone()],
            vec![assign(param(&x), int(7)).unwrap(), goto_value(&l, param(&x)).unwrap(), empty()],
        );
        let tree = block(vec![], vec![inner, label(&l, Some(int(0))).unwrap()]);
        let out = rewrite_typed_labels(&tree).unwrap();
        assert_eq!(typed_labels(&out), 0);
        assert_eq!(run_closed(&out), Value::Int(7));
    }
}
