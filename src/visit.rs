//! Expression tree visitor infrastructure
//!
//! This module provides two traversal traits and corresponding walk functions:
//!
//! - `Visitor`: read-only traversal (for analysis/collection passes)
//! - `Rewriter`: persistent rewriting. Every call returns a tree; unchanged
//!   subtrees come back as the same `Arc` (see [`Expr::with_children`])
//!
//! ## Usage
//!
//! Implement the trait for your pass, overriding only the method you need.
//! Call the corresponding `walk_*` function inside your override to get default recursion.
//!
//! ```rust
//! use exprlower::tree::{Expr, ExprKind, Variable};
//! use exprlower::visit::{walk_expr, Visitor};
//! use std::collections::HashSet;
//!
//! struct ParamCollector {
//!     seen: HashSet<Variable>,
//! }
//!
//! impl Visitor for ParamCollector {
//!     fn visit_expr(&mut self, expr: &Expr) {
//!         if let ExprKind::Parameter(v) = expr.kind() {
//!             self.seen.insert(v.clone());
//!         }
//!         walk_expr(self, expr); // Continue recursion
//!     }
//! }
//! ```
//!
//! ## When to Use
//!
//! Use `Visitor`/`Rewriter` for passes where most node kinds are pure recursion.
//! Use a manual `match` for passes where most kinds need custom logic (like the
//! stack spiller or the evaluator).

pub mod composers;
pub mod scope_tracker;

use crate::diagnostics::LowerError;
use crate::tree::{CatchBlock, Expr, ExprKind};

// ============================================================================
// Visitor Trait (Read-Only)
// ============================================================================

/// Read-only tree visitor. The default implementation recurses into all children
/// in evaluation order. Omit the walk call in an override to prune traversal.
pub trait Visitor: Sized {
    fn visit_expr(&mut self, expr: &Expr) {
        walk_expr(self, expr);
    }
}

pub fn walk_expr<V: Visitor>(v: &mut V, expr: &Expr) {
    for child in expr.children() {
        v.visit_expr(child);
    }
}

// ============================================================================
// Rewriter Trait (Persistent)
// ============================================================================

/// Persistent tree rewriter. `rewrite_expr` returns the replacement for a node;
/// the default rebuilds the node from rewritten children, handing back the
/// original reference when nothing changed.
pub trait Rewriter: Sized {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr, LowerError> {
        walk_rewrite(self, expr)
    }
}

pub fn walk_rewrite<R: Rewriter>(r: &mut R, expr: &Expr) -> Result<Expr, LowerError> {
    let kids = expr
        .children()
        .into_iter()
        .map(|child| r.rewrite_expr(child))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(expr.with_children(kids))
}

/// Rewrite a catch handler's filter and body, keeping its test and variable.
pub fn walk_rewrite_catch<R: Rewriter>(r: &mut R, handler: &CatchBlock) -> Result<CatchBlock, LowerError> {
    Ok(CatchBlock {
        test: handler.test.clone(),
        variable: handler.variable.clone(),
        filter: handler.filter.as_ref().map(|f| r.rewrite_expr(f)).transpose()?,
        body: r.rewrite_expr(&handler.body)?,
    })
}

/// Infallible structural map over the direct children of a node.
pub fn map_children(expr: &Expr, mut f: impl FnMut(&Expr) -> Expr) -> Expr {
    let kids = expr.children().into_iter().map(&mut f).collect();
    expr.with_children(kids)
}

// ==============================================================================
// Tests
// ==============================================================================
