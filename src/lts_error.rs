//! LtsWeightsError: Unified error type for lts-weights public APIs
//!
//! Every error is fatal for the current weight-computation cycle. Callers get
//! the error immediately and never a partially filled weight array.

use std::borrow::Cow;
use thiserror::Error;

use crate::weights::lts_weights::Stage;

/// Unified error type for weight computation.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LtsWeightsError {
    /// Non-positive or non-finite velocity, element length or time step.
    #[error("invalid physical parameter for cell {cell:?}: {reason}")]
    InvalidPhysicalParameter {
        /// Local cell index, if the problem is tied to a single cell.
        cell: Option<usize>,
        reason: Cow<'static, str>,
    },
    /// Rejected configuration value (rate < 2, unknown offset type, ...).
    #[error("configuration error: {0}")]
    ConfigurationError(Cow<'static, str>),
    /// A stage method was called before the stage it depends on.
    #[error("stage `{required:?}` must be computed first (current stage: `{current:?}`)")]
    PrecedingStageNotComputed { required: Stage, current: Stage },
    /// A neighbour rank did not deliver the data the ghost protocol expects.
    #[error("incomplete ghost exchange with rank {neighbor}: {reason}")]
    IncompleteExchange {
        neighbor: usize,
        reason: Cow<'static, str>,
    },
    /// A weight that would reach the partitioner is zero, negative or overflowed.
    #[error("partitioner input invalid: {0}")]
    PartitionerInputInvalid(Cow<'static, str>),
    /// Another rank failed a collective stage; its own error is reported there.
    #[error("another rank failed during `{stage}`")]
    PeerFailed { stage: &'static str },
    /// The distributed graph triple is malformed.
    #[error("invalid distributed graph: {0}")]
    InvalidGraph(Cow<'static, str>),
    /// Two per-cell inputs disagree on the number of cells.
    #[error("length mismatch for `{what}`: expected {expected}, found {found}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

impl LtsWeightsError {
    pub(crate) fn physical(cell: Option<usize>, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidPhysicalParameter {
            cell,
            reason: reason.into(),
        }
    }

    pub(crate) fn config(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::ConfigurationError(reason.into())
    }

    pub(crate) fn incomplete(neighbor: usize, reason: impl Into<Cow<'static, str>>) -> Self {
        Self::IncompleteExchange {
            neighbor,
            reason: reason.into(),
        }
    }
}
