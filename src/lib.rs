pub mod tree;
pub mod visit;
pub mod diagnostics;
pub mod well_known;
pub mod options;
pub mod lowering;
pub mod eval;

pub use diagnostics::{ForbiddenReason, LowerError};
pub use lowering::{AsyncLowering, LeaveLabelData, LeaveLabels, LoweredBody};
pub use options::{LoweringOptions, ScopeMode};

use tree::LambdaExpr;

/// Lower an async lambda with default options.
pub fn lower(lambda: &LambdaExpr) -> Result<LoweredBody, LowerError> {
    AsyncLowering::default().lower(lambda)
}

/// Lower an async lambda and assemble the synchronous lambda that runs the result.
/// Useful for executing lowered output with [`eval::Interpreter`].
pub fn lower_to_lambda(lambda: &LambdaExpr, options: &LoweringOptions) -> Result<LambdaExpr, LowerError> {
    AsyncLowering::new(options.clone()).lower(lambda)?.into_lambda()
}
