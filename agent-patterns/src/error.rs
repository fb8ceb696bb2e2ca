//! Run-level errors

use crate::collaborators::{CollaboratorError, Stage};
use crate::config::ConfigError;
use crate::state::OptimizationState;
use crate::verdict::SchemaViolation;
use thiserror::Error;

/// Why an optimization run failed
///
/// Every variant raised after the run started carries the state as it was
/// after the last successful step, so callers can inspect partial progress.
#[derive(Debug, Error)]
pub enum LoopError {
    /// The run never started
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The evaluator returned a malformed verdict
    #[error("evaluator output rejected at iteration {iteration}: {violation}")]
    SchemaViolation {
        /// Revisions applied when the failure occurred
        iteration: u32,
        /// What was wrong with the output
        violation: SchemaViolation,
        /// State after the last successful step
        state: Box<OptimizationState>,
    },

    /// A collaborator call failed
    #[error("{stage} failed at iteration {iteration}: {source}")]
    Collaborator {
        /// Which collaborator failed
        stage: Stage,
        /// Revisions applied when the failure occurred
        iteration: u32,
        /// Underlying failure
        source: CollaboratorError,
        /// State after the last successful step
        state: Box<OptimizationState>,
    },

    /// A pending collaborator call finished without reporting back
    #[error("run stalled at iteration {iteration}: a collaborator call produced no result")]
    Stalled {
        /// Revisions applied when the run stalled
        iteration: u32,
        /// State after the last successful step
        state: Box<OptimizationState>,
    },
}

impl LoopError {
    /// Partial state for failures raised mid-run
    #[must_use]
    pub fn partial_state(&self) -> Option<&OptimizationState> {
        match self {
            Self::Config(_) => None,
            Self::SchemaViolation { state, .. }
            | Self::Collaborator { state, .. }
            | Self::Stalled { state, .. } => Some(state.as_ref()),
        }
    }

    /// Take ownership of the partial state
    #[must_use]
    pub fn into_partial_state(self) -> Option<OptimizationState> {
        match self {
            Self::Config(_) => None,
            Self::SchemaViolation { state, .. }
            | Self::Collaborator { state, .. }
            | Self::Stalled { state, .. } => Some(*state),
        }
    }

    /// Iteration at which a mid-run failure occurred
    #[must_use]
    pub const fn iteration(&self) -> Option<u32> {
        match self {
            Self::Config(_) => None,
            Self::SchemaViolation { iteration, .. }
            | Self::Collaborator { iteration, .. }
            | Self::Stalled { iteration, .. } => Some(*iteration),
        }
    }

    /// Build the error for a failed collaborator call
    ///
    /// Schema violations from the evaluator get their own variant; every other
    /// failure is reported as a collaborator error.
    pub(crate) fn from_failure(stage: Stage, error: CollaboratorError, state: OptimizationState) -> Self {
        let iteration = state.iteration_count();
        match (stage, error) {
            (Stage::Evaluate, CollaboratorError::SchemaViolation(violation)) => Self::SchemaViolation {
                iteration,
                violation,
                state: Box::new(state),
            },
            (stage, source) => Self::Collaborator {
                stage,
                iteration,
                source,
                state: Box::new(state),
            },
        }
    }
}
