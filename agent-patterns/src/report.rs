//! End-of-run reporting

use crate::collaborators::CollaboratorError;
use crate::evaluator::{RunOutcome, Termination};
use crate::goals::OptimizationGoals;
use async_trait::async_trait;
use std::fmt::Write as _;

/// Writes a narrative report for a finished run
#[async_trait]
pub trait Reporter: Send + Sync {
    /// Summarize `outcome` for plant management
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorError` when no report could be produced
    async fn report(&self, outcome: &RunOutcome, goals: &OptimizationGoals) -> Result<String, CollaboratorError>;
}

/// Plain-text run summary: how it stopped, the final verdict, and history
#[must_use]
pub fn render_summary(outcome: &RunOutcome) -> String {
    let state = &outcome.state;
    let mut out = String::new();

    let stopped = match outcome.termination {
        Termination::GoalMet => "goals met",
        Termination::BudgetExhausted => "revision budget exhausted",
        Termination::Cancelled => "cancelled",
    };
    let _ = writeln!(
        out,
        "Stopped: {stopped} after {} of {} revisions",
        state.iteration_count(),
        state.max_iterations()
    );

    match state.latest_evaluation() {
        Some(verdict) => {
            let _ = writeln!(out, "Final score: {} ({})", verdict.score(), verdict.status());
        }
        None => {
            let _ = writeln!(out, "Final score: not evaluated");
        }
    }

    if state.history().is_empty() {
        let _ = writeln!(out, "\nOPTIMIZATION HISTORY: none");
    } else {
        let _ = writeln!(out, "\nOPTIMIZATION HISTORY:");
        for entry in state.history() {
            let _ = writeln!(
                out,
                "  Iteration {}: score {}, status {}",
                entry.iteration,
                entry.evaluation.score(),
                entry.evaluation.status()
            );
        }
    }

    out
}
