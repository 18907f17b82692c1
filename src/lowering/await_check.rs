//! Rejects `await` in positions that cannot suspend.

use crate::diagnostics::{ForbiddenReason, LowerError, Result};
use crate::tree::{Expr, ExprKind};
use crate::visit::{Visitor, walk_expr};

/// Walks the tree with a stack of enclosing forbidden contexts. A nested async
/// lambda starts a fresh context; a synchronous lambda forbids awaits inside it.
struct AwaitChecker {
    forbidden: Vec<(ForbiddenReason, String)>,
    error: Option<LowerError>,
    awaits: usize,
}

impl AwaitChecker {
    fn within(&mut self, reason: ForbiddenReason, construct: String, expr: &Expr) {
        self.forbidden.push((reason, construct));
        self.visit_expr(expr);
        self.forbidden.pop();
    }
}

impl Visitor for AwaitChecker {
    fn visit_expr(&mut self, expr: &Expr) {
        if self.error.is_some() {
            return;
        }
        match expr.kind() {
            ExprKind::Await { .. } => {
                if let Some((reason, construct)) = self.forbidden.last() {
                    self.error = Some(LowerError::await_forbidden(*reason, construct.clone()));
                    return;
                }
                self.awaits += 1;
                walk_expr(self, expr);
            }
            ExprKind::Lock { object, body } => {
                self.visit_expr(object);
                self.within(ForbiddenReason::Lock, "lock".into(), body);
            }
            ExprKind::Try { body, handlers, finally, fault, .. } => {
                self.visit_expr(body);
                for handler in handlers {
                    if let Some(filter) = &handler.filter {
                        self.within(ForbiddenReason::Filter, format!("catch ({}) when", handler.test), filter);
                    }
                    self.visit_expr(&handler.body);
                }
                for part in finally.iter().chain(fault.iter()) {
                    self.visit_expr(part);
                }
            }
            ExprKind::Switch { value, cases, default, .. } => {
                self.visit_expr(value);
                for case in cases {
                    for test in &case.test_values {
                        self.within(ForbiddenReason::SwitchCaseTest, "case".into(), test);
                    }
                    self.visit_expr(&case.body);
                }
                if let Some(default) = default {
                    self.visit_expr(default);
                }
            }
            ExprKind::Lambda(lambda) if lambda.is_async => {
                let saved = std::mem::take(&mut self.forbidden);
                self.visit_expr(&lambda.body);
                self.forbidden = saved;
            }
            ExprKind::Lambda(lambda) => {
                self.within(ForbiddenReason::Lambda, lambda.display_name().to_string(), &lambda.body);
            }
            _ => walk_expr(self, expr),
        }
    }
}

/// Fails on the first await found in a lock body, exception filter, switch case
/// test value, or non-async lambda.
pub fn check_awaits(body: &Expr) -> Result<()> {
    let mut checker = AwaitChecker { forbidden: Vec::new(), error: None, awaits: 0 };
    checker.visit_expr(body);
    match checker.error {
        Some(err) => Err(err),
        None => {
            tracing::debug!(target: "exprlower::await_check", awaits = checker.awaits, "await positions accepted");
            Ok(())
        }
    }
}
