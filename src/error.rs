use thiserror::Error;

use crate::backend::SatResult;

/// Errors raised while building or verifying a [`Piecewise`][crate::piecewise::Piecewise].
#[derive(Debug, Error)]
pub enum PiecewiseError {
    /// Breakpoint construction needs exactly one value per interval.
    #[error("expected {} values for {breakpoints} breakpoints, got {values}", .breakpoints + 1)]
    ShapeMismatch { breakpoints: usize, values: usize },

    /// Literal breakpoints must be strictly ascending.
    #[error("breakpoint #{index} is not greater than the one before it")]
    UnorderedBreakpoints { index: usize },

    /// The conditions could not be proven mutually exclusive and exhaustive.
    #[error("unable to check that options are mutually exclusive and exhaustive: got {result} for {pairs}")]
    VerificationFailed { result: SatResult, pairs: String },

    /// `min`/`max` over an empty argument list.
    #[error("{op} called with zero arguments")]
    EmptyArguments { op: &'static str },
}

/// Errors raised while building expressions.
#[derive(Debug, Error, PartialEq)]
pub enum ExprError {
    #[error("cannot represent non-finite number {0} as a literal")]
    NonFinite(f64),
}

pub type Result<T> = std::result::Result<T, PiecewiseError>;
