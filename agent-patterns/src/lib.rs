//! Evaluator-Optimizer loop for water treatment process optimization
//!
//! An evaluator scores a candidate process configuration against fixed
//! goals; an optimizer revises it from the verdict; the loop repeats until
//! the evaluator reports `optimized` or the revision budget is spent.
//!
//! ## Architecture
//!
//! - **Reducer**: [`evaluator::OptimizationReducer`] owns every transition;
//!   [`evaluator::decide`] is the pure termination rule
//! - **Effects**: collaborator calls produced by an
//!   [`evaluator::OptimizationEnvironment`], executed one at a time by the
//!   sequential runner with cooperative cancellation
//! - **Collaborators**: [`Evaluator`], [`Optimizer`], [`Drafter`] and
//!   [`Reporter`] traits, with Claude-backed implementations in [`claude`]
//! - **State**: [`OptimizationState`] is a value updated functionally; history
//!   is append-only
//!
//! ## Example
//!
//! ```ignore
//! use hydro_agents_patterns::{run_optimization, CollaboratorEnvironment, OptimizationGoals};
//!
//! let goals = OptimizationGoals::new()
//!     .with_parameter("source_water_turbidity", "12-18 NTU")
//!     .with_target("finished_water_turbidity", "<0.1 NTU 95% of time");
//! let env = CollaboratorEnvironment::new(evaluator, optimizer);
//!
//! let outcome = run_optimization(initial_candidate, goals, 3, env).await?;
//! println!("{}", render_summary(&outcome));
//! ```

pub mod claude;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod goals;
pub mod report;
pub mod state;
pub mod tracing_support;
pub mod verdict;

// Re-export commonly used types
pub use collaborators::{CollaboratorError, Drafter, Evaluator, Optimizer, Stage};
pub use config::{ConfigError, OptimizerConfig};
pub use error::LoopError;
pub use evaluator::{
    decide, run_optimization, run_optimization_with_cancel, CollaboratorEnvironment, Decision,
    OptimizationAction, OptimizationEnvironment, OptimizationReducer, RunOutcome, Termination,
};
pub use goals::OptimizationGoals;
pub use report::{render_summary, Reporter};
pub use state::{Candidate, HistoryEntry, OptimizationState};
pub use verdict::{Assessments, EvaluationVerdict, OptimizationStatus, SchemaViolation, Score};

pub use hydro_agents_runtime::CancellationToken;
