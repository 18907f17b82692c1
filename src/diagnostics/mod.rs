use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::tree::TreeError;

/// The construct that forbids a suspension point inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForbiddenReason {
    /// Exception filter (`catch ... when (filter)`).
    Filter,
    /// Synchronization block body.
    Lock,
    /// A switch case's test values.
    SwitchCaseTest,
    /// Body of a nested non-async lambda.
    Lambda,
}

impl fmt::Display for ForbiddenReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ForbiddenReason::Filter => "an exception filter",
            ForbiddenReason::Lock => "the body of a lock statement",
            ForbiddenReason::SwitchCaseTest => "a switch case test value",
            ForbiddenReason::Lambda => "a non-async lambda",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Error)]
pub enum LowerError {
    #[error("await is not allowed in {reason} ({construct})")]
    AwaitForbidden { reason: ForbiddenReason, construct: String },

    /// An invariant guaranteed by an earlier stage (or by the caller) does not hold.
    #[error("internal lowering error: {msg}")]
    Internal { msg: String },

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error("Config error: {msg}")]
    Config { msg: String, path: PathBuf },
}

impl LowerError {
    pub fn await_forbidden(reason: ForbiddenReason, construct: impl Into<String>) -> Self {
        Self::AwaitForbidden { reason, construct: construct.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { msg: msg.into() }
    }

    pub fn config(msg: impl Into<String>, path: PathBuf) -> Self {
        Self::Config { msg: msg.into(), path }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

pub type Result<T, E = LowerError> = std::result::Result<T, E>;
