//! Contracts for the model-backed roles in a run
//!
//! The loop only knows these traits. Production implementations live in
//! [`crate::claude`]; tests use the stubs in `hydro-agents-testing`.

use crate::goals::OptimizationGoals;
use crate::state::Candidate;
use crate::verdict::{EvaluationVerdict, SchemaViolation};
use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single collaborator call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    /// Output did not match the expected shape
    #[error(transparent)]
    SchemaViolation(#[from] SchemaViolation),
    /// The backing service failed (network, auth, API error)
    #[error("upstream failure: {0}")]
    Upstream(String),
    /// The call did not finish in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Which collaborator a failure came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Evaluator call
    Evaluate,
    /// Optimizer call
    Optimize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Evaluate => write!(f, "evaluator"),
            Self::Optimize => write!(f, "optimizer"),
        }
    }
}

/// Scores a candidate against the goals
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Evaluate `candidate`
    ///
    /// # Errors
    ///
    /// `CollaboratorError::SchemaViolation` when the verdict is malformed;
    /// `Upstream` or `Timeout` when the call itself fails
    async fn evaluate(
        &self,
        candidate: &Candidate,
        goals: &OptimizationGoals,
    ) -> Result<EvaluationVerdict, CollaboratorError>;
}

/// Produces a revised candidate from the latest verdict
#[async_trait]
pub trait Optimizer: Send + Sync {
    /// Revise `candidate` according to `verdict`
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` when no revision could be produced
    async fn optimize(
        &self,
        candidate: &Candidate,
        goals: &OptimizationGoals,
        verdict: &EvaluationVerdict,
    ) -> Result<Candidate, CollaboratorError>;
}

/// Produces a baseline candidate from the goals alone
#[async_trait]
pub trait Drafter: Send + Sync {
    /// Draft an initial configuration
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` when no draft could be produced
    async fn draft(&self, goals: &OptimizationGoals) -> Result<Candidate, CollaboratorError>;
}
