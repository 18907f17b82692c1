//! The async-lowering pipeline.
//!
//! Stages run in a fixed order, each a pure tree-to-tree rewrite:
//!
//! 1. [`alias`]: unique identity per declaration
//! 2. [`await_check`]: reject awaits in forbidden positions
//! 3. [`reducer`]: expand extension nodes (except `Await`)
//! 4. [`spiller`]: move awaits to resumable positions
//! 5. [`goto`]: route jumps that leave the body through one exit label
//! 6. [`catch`]: move awaiting handler bodies out of their try
//! 7. [`ref_local`]: replace by-reference locals with access paths
//! 8. [`typed_label`]: void labels plus result variables
//! 9. [`percolate`]: push the result assignment into tail positions
//! 10. [`optimize`]: flatten redundant blocks

pub mod alias;
pub mod await_check;
pub mod catch;
pub mod goto;
pub mod optimize;
pub mod percolate;
pub mod reducer;
pub mod ref_local;
pub mod spiller;
pub mod substitute;
pub mod typed_label;

#[cfg(test)]
mod test_support;

pub use goto::{LeaveLabelData, LeaveLabels};

use crate::diagnostics::{LowerError, Result};
use crate::options::LoweringOptions;
use crate::tree::build::{assign, int, param};
use crate::tree::{Expr, ExprKind, LabelTarget, LambdaExpr, Type, Variable};

/// The lowered body of one async lambda, plus what a state-machine builder
/// needs to wire it up.
#[derive(Debug, Clone)]
pub struct LoweredBody {
    pub body: Expr,
    /// Receives the body's value; `None` for void bodies.
    pub result: Option<Variable>,
    pub exit_label: LabelTarget,
    pub pending_branch: Variable,
    pub leave_labels: LeaveLabels,
    pub params: Vec<Variable>,
    pub name: Option<String>,
    pub ret: Type,
    pub return_label: Option<LabelTarget>,
}

impl LoweredBody {
    /// Assemble a synchronous lambda that runs the lowered body:
    ///
    /// ```text
    /// { var pending, result, carried...;
    ///   pending = 0; body; exit:; switch (pending) { ... }; result }
    /// ```
    pub fn into_lambda(self) -> Result<LambdaExpr> {
        let mut variables = vec![self.pending_branch.clone()];
        variables.extend(self.result.iter().cloned());
        variables.extend(self.leave_labels.carried_variables());

        let tail = match &self.result {
            Some(r) => param(r),
            None => Expr::new(ExprKind::Default(self.ret.clone())),
        };
        let exprs = vec![
            assign(param(&self.pending_branch), int(0))?,
            self.body,
            Expr::new(ExprKind::Label { target: self.exit_label.clone(), default: None }),
            self.leave_labels.dispatch_table(&self.pending_branch)?,
            tail,
        ];
        let body = Expr::new(ExprKind::Block { ty: self.ret.clone(), variables, exprs });
        Ok(LambdaExpr {
            name: self.name,
            params: self.params,
            body,
            return_label: self.return_label,
            ret: self.ret,
            is_async: false,
        })
    }
}

/// Entry point: runs every stage over an async lambda's body.
#[derive(Debug, Clone, Default)]
pub struct AsyncLowering {
    options: LoweringOptions,
}

impl AsyncLowering {
    pub fn new(options: LoweringOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &LoweringOptions {
        &self.options
    }

    pub fn lower(&self, lambda: &LambdaExpr) -> Result<LoweredBody> {
        if !lambda.is_async {
            return Err(LowerError::internal(format!("'{}' is not an async lambda", lambda.display_name())));
        }
        tracing::debug!(target: "exprlower::pipeline", lambda = lambda.display_name(), "lowering async lambda");

        let lambda = alias::eliminate_in_lambda(lambda, self.options.scope_mode);
        self.trace("alias", &lambda.body);

        await_check::check_awaits(&lambda.body)?;

        let body = reducer::reduce(&lambda.body)?;
        self.trace("reducer", &body);

        let body = spiller::spill(&body)?;
        self.trace("spiller", &body);

        let goto::GotoRewrite { body, exit_label, pending_branch, leave_labels } = goto::rewrite_gotos(&body)?;
        self.trace("goto", &body);

        let body = catch::rewrite_catches(&body)?;
        self.trace("catch", &body);

        let body = ref_local::rewrite_ref_locals(&body)?;
        self.trace("ref_local", &body);

        let body = typed_label::rewrite_typed_labels(&body)?;
        self.trace("typed_label", &body);

        let result = (!lambda.ret.is_void() && !body.ty().is_void()).then(|| Variable::new("result", lambda.ret.clone()));
        let body = match &result {
            Some(r) => percolate::percolate_result(r, &body)?,
            None => body,
        };
        self.trace("percolate", &body);

        let body = if self.options.optimize {
            let body = optimize::optimize(&body);
            self.trace("optimize", &body);
            body
        } else {
            body
        };

        tracing::debug!(
            target: "exprlower::pipeline",
            lambda = lambda.display_name(),
            leave_labels = leave_labels.len(),
            has_result = result.is_some(),
            "lowered"
        );
        Ok(LoweredBody {
            body,
            result,
            exit_label,
            pending_branch,
            leave_labels,
            params: lambda.params.clone(),
            name: lambda.name.clone(),
            ret: lambda.ret.clone(),
            return_label: lambda.return_label.clone(),
        })
    }

    fn trace(&self, stage: &str, body: &Expr) {
        if self.options.trace_stages {
            tracing::trace!(target: "exprlower::pipeline", stage, tree = %body, "stage output");
        }
    }
}
