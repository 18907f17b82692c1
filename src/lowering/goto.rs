//! Goto rewriting.
//!
//! A jump to a label the body does not declare leaves the body. Each such jump
//! becomes: record the target's 1-based index in the pending-branch variable,
//! store the carried value (if any), jump to the body's exit label. After the
//! exit label a dispatch table re-issues the original jump.

use std::collections::{HashMap, HashSet};

use crate::diagnostics::{LowerError, Result};
use crate::tree::build::*;
use crate::tree::{Expr, ExprKind, GotoKind, LabelTarget, Type, Variable};
use crate::visit::{Rewriter, Visitor, walk_expr, walk_rewrite};

/// One external jump target.
#[derive(Debug, Clone)]
pub struct LeaveLabelData {
    /// 1-based; 0 in the pending-branch variable means "fell through".
    pub index: usize,
    pub target: LabelTarget,
    /// Holds the jump's value while the exit path runs. `None` for void targets.
    pub carried: Option<Variable>,
}

/// The external jump targets of a body, in order of first appearance.
#[derive(Debug, Clone, Default)]
pub struct LeaveLabels {
    entries: Vec<LeaveLabelData>,
    by_target: HashMap<LabelTarget, usize>,
}

impl LeaveLabels {
    pub fn get(&self, target: &LabelTarget) -> Option<&LeaveLabelData> {
        self.by_target.get(target).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LeaveLabelData> {
        self.entries.iter()
    }

    /// Variables holding carried values; they must be declared around the body.
    pub fn carried_variables(&self) -> Vec<Variable> {
        self.entries.iter().filter_map(|d| d.carried.clone()).collect()
    }

    fn entry(&mut self, target: &LabelTarget) -> &LeaveLabelData {
        let slot = match self.by_target.get(target) {
            Some(&i) => i,
            None => {
                let carried = (!target.ty().is_void())
                    .then(|| Variable::new(format!("{}_value", target.name()), target.ty().clone()));
                self.entries.push(LeaveLabelData { index: self.entries.len() + 1, target: target.clone(), carried });
                self.by_target.insert(target.clone(), self.entries.len() - 1);
                self.entries.len() - 1
            }
        };
        &self.entries[slot]
    }

    /// `switch (pending) { case i: goto target_i(carried_i); ... }`, or an empty
    /// expression when nothing leaves the body.
    pub fn dispatch_table(&self, pending: &Variable) -> Result<Expr> {
        if self.entries.is_empty() {
            return Ok(empty());
        }
        let cases = self
            .entries
            .iter()
            .map(|d| {
                let index = i64::try_from(d.index).map_err(|_| LowerError::internal("too many leave labels"))?;
                let jump = make_goto(GotoKind::Goto, &d.target, d.carried.as_ref().map(param), Type::Void)?;
                Ok(switch_case(vec![int(index)], jump))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(switch(param(pending), cases, None)?)
    }
}

/// Labels declared inside the body, including loop break/continue targets.
/// Nested lambdas have their own label space.
struct InternalLabels {
    labels: HashSet<LabelTarget>,
}

impl Visitor for InternalLabels {
    fn visit_expr(&mut self, expr: &Expr) {
        match expr.kind() {
            ExprKind::Lambda(_) => return,
            ExprKind::Label { target, .. } => {
                self.labels.insert(target.clone());
            }
            ExprKind::Loop { break_label, continue_label, .. }
            | ExprKind::While { break_label, continue_label, .. }
            | ExprKind::For { break_label, continue_label, .. }
            | ExprKind::ForEach { break_label, continue_label, .. } => {
                self.labels.extend(break_label.iter().chain(continue_label.iter()).cloned());
            }
            _ => {}
        }
        walk_expr(self, expr);
    }
}

pub struct GotoRewrite {
    pub body: Expr,
    pub exit_label: LabelTarget,
    pub pending_branch: Variable,
    pub leave_labels: LeaveLabels,
}

struct GotoRewriter {
    internal: HashSet<LabelTarget>,
    exit_label: LabelTarget,
    pending_branch: Variable,
    leave_labels: LeaveLabels,
}

impl Rewriter for GotoRewriter {
    fn rewrite_expr(&mut self, expr: &Expr) -> Result<Expr> {
        match expr.kind() {
            ExprKind::Lambda(_) => Ok(expr.clone()),
            ExprKind::Goto { target, value, ty, .. } if !self.internal.contains(target) => {
                let value = value.as_ref().map(|v| self.rewrite_expr(v)).transpose()?;
                let data = self.leave_labels.entry(target).clone();
                let index = i64::try_from(data.index).map_err(|_| LowerError::internal("too many leave labels"))?;
                let mut exprs = vec![assign(param(&self.pending_branch), int(index))?];
                match (data.carried, value) {
                    (Some(carried), Some(value)) => exprs.push(assign(param(&carried), value)?),
                    (None, None) => {}
                    _ => return Err(LowerError::internal(format!("jump to '{}' has the wrong arity", target.name()))),
                }
                exprs.push(Expr::new(ExprKind::Goto {
                    kind: GotoKind::Goto,
                    target: self.exit_label.clone(),
                    value: None,
                    ty: ty.clone(),
                }));
                Ok(Expr::new(ExprKind::Block { ty: ty.clone(), variables: Vec::new(), exprs }))
            }
            _ => walk_rewrite(self, expr),
        }
    }
}

/// Redirect every jump that leaves `body` through a fresh exit label.
pub fn rewrite_gotos(body: &Expr) -> Result<GotoRewrite> {
    let mut collector = InternalLabels { labels: HashSet::new() };
    collector.visit_expr(body);

    let mut rewriter = GotoRewriter {
        internal: collector.labels,
        exit_label: LabelTarget::void("exit"),
        pending_branch: Variable::new("pending_branch", Type::Int),
        leave_labels: LeaveLabels::default(),
    };
    let body = rewriter.rewrite_expr(body)?;
    tracing::debug!(
        target: "exprlower::goto",
        internal_labels = rewriter.internal.len(),
        leave_labels = rewriter.leave_labels.len(),
        "redirected external jumps"
    );
    Ok(GotoRewrite {
        body,
        exit_label: rewriter.exit_label,
        pending_branch: rewriter.pending_branch,
        leave_labels: rewriter.leave_labels,
    })
}
