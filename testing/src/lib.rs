//! # Hydro Agents Testing
//!
//! Testing utilities for the optimization loop.
//!
//! This crate provides:
//! - Deterministic collaborators (`ScriptedEvaluator`, `AppendingOptimizer`,
//!   `FailingOptimizer`, `SlowEvaluator`, `FixedDrafter`)
//! - `RecordingEnvironment` for reducer-level tests
//! - Verdict builders
//! - proptest strategies for evaluator scripts
//! - `ReducerTest` Given-When-Then harness and effect assertions
//!
//! ## Example
//!
//! ```ignore
//! use hydro_agents_testing::{AppendingOptimizer, ScriptedEvaluator};
//! use hydro_agents_patterns::{run_optimization, CollaboratorEnvironment, OptimizationStatus::*};
//!
//! #[tokio::test]
//! async fn stops_when_optimized() {
//!     let evaluator = Arc::new(ScriptedEvaluator::from_statuses([NeedsImprovement, Optimized]));
//!     let optimizer = Arc::new(AppendingOptimizer::new());
//!     let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer.clone());
//!
//!     let outcome = run_optimization("c", goals(), 3, env).await.unwrap();
//!     assert_eq!(outcome.state.candidate().as_str(), "c'");
//! }
//! ```

pub mod mocks;

/// Verdict builders
pub mod verdicts {
    use hydro_agents_patterns::{Assessments, EvaluationVerdict, OptimizationStatus, Score};

    /// Build a verdict with placeholder assessments
    ///
    /// # Panics
    ///
    /// Panics if `score` is outside `1..=10`.
    #[must_use]
    #[allow(clippy::expect_used)] // Test helper
    pub fn verdict(score: u8, status: OptimizationStatus) -> EvaluationVerdict {
        EvaluationVerdict::new(
            Score::new(i64::from(score)).expect("test verdict score must be in 1..=10"),
            status,
            Assessments {
                water_quality: format!("water quality notes ({score})"),
                efficiency: format!("efficiency notes ({score})"),
            },
            format!("recommendations after score {score}"),
        )
    }

    /// `optimized` verdict
    ///
    /// # Panics
    ///
    /// Panics if `score` is outside `1..=10`.
    #[must_use]
    pub fn optimized(score: u8) -> EvaluationVerdict {
        verdict(score, OptimizationStatus::Optimized)
    }

    /// `needs_improvement` verdict
    ///
    /// # Panics
    ///
    /// Panics if `score` is outside `1..=10`.
    #[must_use]
    pub fn needs_improvement(score: u8) -> EvaluationVerdict {
        verdict(score, OptimizationStatus::NeedsImprovement)
    }
}

/// Property-based testing utilities
///
/// Strategies for evaluator behavior, used to check loop bounds over
/// arbitrary budgets and verdict sequences.
pub mod properties {
    use hydro_agents_patterns::OptimizationStatus;
    use proptest::prelude::*;

    /// Either status, `needs_improvement` three times as likely
    pub fn status() -> impl Strategy<Value = OptimizationStatus> {
        prop_oneof![
            3 => Just(OptimizationStatus::NeedsImprovement),
            1 => Just(OptimizationStatus::Optimized),
        ]
    }

    /// Script long enough to answer every evaluation of a run with budget
    /// `max_iterations`
    pub fn status_script(max_iterations: u32) -> impl Strategy<Value = Vec<OptimizationStatus>> {
        let len = usize::try_from(max_iterations).unwrap_or(usize::MAX).saturating_add(1);
        prop::collection::vec(status(), len)
    }

    /// A budget in `1..=max` paired with a script that covers it
    pub fn budget_and_script(max: u32) -> impl Strategy<Value = (u32, Vec<OptimizationStatus>)> {
        (1..=max).prop_flat_map(|budget| (Just(budget), status_script(budget)))
    }
}

// Re-export commonly used items
pub use mocks::{
    AppendingOptimizer, FailingOptimizer, FixedDrafter, RecordingEnvironment, RequestedCall,
    ScriptedEvaluator, SlowEvaluator,
};
pub use reducer_test::{assertions, resolve_effect, ReducerTest};
