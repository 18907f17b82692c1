//! Typed, immutable expression trees.
//!
//! Nodes are shared through `Arc`; every rewrite produces a new tree (or hands back
//! the same reference when nothing changed). Construction goes through the checked
//! factories in [`build`], which report malformed nodes as [`TreeError`].

pub mod build;
pub mod display;
pub mod expr;
pub mod types;

pub use expr::*;
pub use types::{ClassInfo, Type};

use thiserror::Error;

/// Structural validation errors raised while constructing nodes.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeError {
    #[error("type mismatch in {node}: expected {expected}, found {found}")]
    TypeMismatch { node: &'static str, expected: String, found: String },

    #[error("{node} does not accept operand of type {ty}")]
    InvalidOperand { node: &'static str, ty: String },

    #[error("expression of type {ty} is not assignable")]
    NotAssignable { ty: String },

    #[error("type {ty} has no field '{field}'")]
    UnknownField { ty: String, field: String },

    #[error("method '{method}' expects {expected} argument(s), got {found}")]
    ArgumentCount { method: String, expected: usize, found: usize },

    #[error("type {ty} is not awaitable")]
    NotAwaitable { ty: String },

    #[error("{0}")]
    Invalid(String),
}
