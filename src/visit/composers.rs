//! Composition utilities for common visitor patterns.
//!
//! Helpers that reduce boilerplate when a pass only needs to find, count or
//! collect nodes.
//!
//! ```
//! use exprlower::tree::{build, ExprKind};
//! use exprlower::visit::composers::*;
//!
//! let tree = build::add(build::int(1), build::int(2)).unwrap();
//! assert_eq!(count_exprs(&tree, |e| matches!(e, ExprKind::Constant { .. })), 2);
//! assert!(!contains_await(&tree));
//! ```

use std::collections::HashSet;

use crate::tree::{Expr, ExprKind, LabelTarget, Variable};
use crate::visit::{walk_expr, Visitor};

// ============================================================================
// Detection / Predicate Helpers
// ============================================================================

/// Check if a tree contains any node matching a predicate. Short-circuits on the
/// first match.
pub fn contains_expr<F>(expr: &Expr, predicate: F) -> bool
where
    F: Fn(&ExprKind) -> bool,
{
    find_expr(expr, predicate).is_some()
}

/// Find the first node (pre-order, evaluation order) matching a predicate.
pub fn find_expr<F>(expr: &Expr, predicate: F) -> Option<Expr>
where
    F: Fn(&ExprKind) -> bool,
{
    struct Finder<F> {
        predicate: F,
        found: Option<Expr>,
    }

    impl<F> Visitor for Finder<F>
    where
        F: Fn(&ExprKind) -> bool,
    {
        fn visit_expr(&mut self, expr: &Expr) {
            if self.found.is_some() {
                return;
            }
            if (self.predicate)(expr.kind()) {
                self.found = Some(expr.clone());
                return;
            }
            walk_expr(self, expr);
        }
    }

    let mut finder = Finder { predicate, found: None };
    finder.visit_expr(expr);
    finder.found
}

// ============================================================================
// Counting Helpers
// ============================================================================

pub fn count_exprs<F>(expr: &Expr, predicate: F) -> usize
where
    F: Fn(&ExprKind) -> bool,
{
    struct Counter<F> {
        predicate: F,
        count: usize,
    }

    impl<F> Visitor for Counter<F>
    where
        F: Fn(&ExprKind) -> bool,
    {
        fn visit_expr(&mut self, expr: &Expr) {
            if (self.predicate)(expr.kind()) {
                self.count += 1;
            }
            walk_expr(self, expr);
        }
    }

    let mut counter = Counter { predicate, count: 0 };
    counter.visit_expr(expr);
    counter.count
}

// ============================================================================
// Collection Helpers
// ============================================================================

/// Collect values extracted from every node where the extractor returns `Some`.
pub fn collect_exprs<T, F>(expr: &Expr, extractor: F) -> Vec<T>
where
    F: Fn(&ExprKind) -> Option<T>,
{
    struct Collector<T, F> {
        extractor: F,
        items: Vec<T>,
    }

    impl<T, F> Visitor for Collector<T, F>
    where
        F: Fn(&ExprKind) -> Option<T>,
    {
        fn visit_expr(&mut self, expr: &Expr) {
            if let Some(item) = (self.extractor)(expr.kind()) {
                self.items.push(item);
            }
            walk_expr(self, expr);
        }
    }

    let mut collector = Collector { extractor, items: Vec::new() };
    collector.visit_expr(expr);
    collector.items
}

/// Every variable referenced by a `Parameter` node.
pub fn referenced_variables(expr: &Expr) -> HashSet<Variable> {
    collect_exprs(expr, |e| match e {
        ExprKind::Parameter(v) => Some(v.clone()),
        _ => None,
    })
    .into_iter()
    .collect()
}

/// Every label target declared by a `Label` node.
pub fn declared_labels(expr: &Expr) -> HashSet<LabelTarget> {
    collect_exprs(expr, |e| match e {
        ExprKind::Label { target, .. } => Some(target.clone()),
        _ => None,
    })
    .into_iter()
    .collect()
}

// ============================================================================
// Await tracking
// ============================================================================

/// Whether the tree syntactically contains an `Await`. Nested lambdas are their
/// own async context and are not searched.
pub fn contains_await(expr: &Expr) -> bool {
    struct AwaitFinder {
        found: bool,
    }

    impl Visitor for AwaitFinder {
        fn visit_expr(&mut self, expr: &Expr) {
            if self.found {
                return;
            }
            match expr.kind() {
                ExprKind::Await { .. } => self.found = true,
                ExprKind::Lambda(_) => {}
                _ => walk_expr(self, expr),
            }
        }
    }

    let mut finder = AwaitFinder { found: false };
    finder.visit_expr(expr);
    finder.found
}

/// Whether the tree declares a `Label` outside nested lambdas.
pub fn contains_label(expr: &Expr) -> bool {
    struct LabelFinder {
        found: bool,
    }

    impl Visitor for LabelFinder {
        fn visit_expr(&mut self, expr: &Expr) {
            if self.found {
                return;
            }
            match expr.kind() {
                ExprKind::Label { .. } => self.found = true,
                ExprKind::Lambda(_) => {}
                _ => walk_expr(self, expr),
            }
        }
    }

    let mut finder = LabelFinder { found: false };
    finder.visit_expr(expr);
    finder.found
}

// ==============================================================================
// Tests
// ==============================================================================
