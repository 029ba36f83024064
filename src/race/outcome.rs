//! Results of a race: the combined outcome and the failure kinds.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::race::operation::OperationError;

/// How the dependent operation ended in a successful race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DependentFate {
    /// Ran to completion and its result was kept.
    Completed,
    /// Acknowledged a cancellation request; no result.
    Cancelled,
    /// The decision said stop, but the dependent had already completed.
    CancellationRaceLost,
}

impl std::fmt::Display for DependentFate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependentFate::Completed => write!(f, "completed"),
            DependentFate::Cancelled => write!(f, "cancelled"),
            DependentFate::CancellationRaceLost => write!(f, "cancellation_race_lost"),
        }
    }
}

/// Combined result of a race.
///
/// `dependent` is `None` exactly when `cancelled` is true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RaceOutcome<A, B> {
    /// Value produced by the decider.
    pub decider: A,

    /// Value produced by the dependent, if it was allowed to finish.
    pub dependent: Option<B>,

    /// Whether the dependent was cancelled before it completed.
    pub cancelled: bool,

    /// How the dependent ended.
    pub fate: DependentFate,
}

impl<A, B> RaceOutcome<A, B> {
    pub(crate) fn completed(decider: A, dependent: B) -> Self {
        Self {
            decider,
            dependent: Some(dependent),
            cancelled: false,
            fate: DependentFate::Completed,
        }
    }

    pub(crate) fn cancelled(decider: A) -> Self {
        Self {
            decider,
            dependent: None,
            cancelled: true,
            fate: DependentFate::Cancelled,
        }
    }

    pub(crate) fn race_lost(decider: A, dependent: B) -> Self {
        Self {
            decider,
            dependent: Some(dependent),
            cancelled: false,
            fate: DependentFate::CancellationRaceLost,
        }
    }

    /// True when both operations produced a value.
    pub fn is_complete(&self) -> bool {
        self.dependent.is_some()
    }

    /// Split into the two results.
    pub fn into_parts(self) -> (A, Option<B>) {
        (self.decider, self.dependent)
    }
}

/// Failure of a race. No partial outcome is returned alongside these.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("decider `{name}` failed: {source}")]
    DeciderFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("dependent `{name}` failed: {source}")]
    DependentFailed {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("`{name}` did not acknowledge cancellation within {timeout:?}")]
    CancellationTimeout { name: String, timeout: Duration },

    #[error(transparent)]
    Operation(#[from] OperationError),
}

impl CoordinatorError {
    /// Short, stable label for logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CoordinatorError::DeciderFailed { .. } => "decider_failed",
            CoordinatorError::DependentFailed { .. } => "dependent_failed",
            CoordinatorError::CancellationTimeout { .. } => "cancellation_timeout",
            CoordinatorError::Operation(_) => "operation",
        }
    }
}
