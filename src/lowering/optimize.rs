//! Block flattening.
//!
//! A nested block with no variables of its own, whose type equals the type of
//! its tail, is spliced into its parent. Scoping and typing are unchanged, so
//! the pass is pure cleanup.

use crate::tree::{Expr, ExprKind};
use crate::visit::map_children;

#[derive(Default)]
pub struct BlockFlattener {
    merged: usize,
}

impl BlockFlattener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn merged(&self) -> usize {
        self.merged
    }

    /// Bottom-up: children are flattened before their parent looks at them,
    /// so one pass reaches the fixed point.
    pub fn flatten(&mut self, expr: &Expr) -> Expr {
        if matches!(expr.kind(), ExprKind::Lambda(_)) {
            return expr.clone();
        }
        let expr = map_children(expr, |child| self.flatten(child));
        let ExprKind::Block { ty, variables, exprs } = expr.kind() else {
            return expr;
        };
        if !exprs.iter().any(is_mergeable) {
            return expr;
        }
        let mut flat = Vec::with_capacity(exprs.len());
        for child in exprs {
            match child.kind() {
                ExprKind::Block { exprs: inner, .. } if is_mergeable(child) => {
                    self.merged += 1;
                    flat.extend(inner.iter().cloned());
                }
                _ => flat.push(child.clone()),
            }
        }
        Expr::new(ExprKind::Block { ty: ty.clone(), variables: variables.clone(), exprs: flat })
    }
}

fn is_mergeable(expr: &Expr) -> bool {
    match expr.kind() {
        ExprKind::Block { ty, variables, exprs } => {
            variables.is_empty() && exprs.last().is_some_and(|last| &last.ty() == ty)
        }
        _ => false,
    }
}

/// Flatten redundant nested blocks.
pub fn optimize(body: &Expr) -> Expr {
    let mut flattener = BlockFlattener::new();
    let out = flattener.flatten(body);
    tracing::debug!(target: "exprlower::optimize", merged = flattener.merged(), "flattened blocks");
    out
}
