//! Treatment process optimizer
//!
//! Drafts (or reads) a process configuration for a plant, then alternates
//! evaluation and revision with Claude until the evaluator reports the
//! configuration as optimized or the revision budget runs out.
//!
//! ```text
//! ANTHROPIC_API_KEY=... treatment-optimizer --max-iterations 3
//! treatment-optimizer --goals plant.toml --candidate current.txt --no-report
//! ```

mod example;

use anyhow::{Context, Result};
use clap::Parser;
use hydro_agents_anthropic::AnthropicClient;
use hydro_agents_patterns::claude::{ClaudeBackend, ClaudeDrafter, ClaudeEvaluator, ClaudeOptimizer, ClaudeReporter};
use hydro_agents_patterns::tracing_support::init_tracing;
use hydro_agents_patterns::{
    render_summary, run_optimization_with_cancel, CancellationToken, Candidate, CollaboratorEnvironment, Drafter,
    LoopError, OptimizationGoals, OptimizerConfig, Reporter, RunOutcome, Termination,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "treatment-optimizer", version, about = "Iteratively optimize a water treatment process configuration")]
struct Args {
    /// Plant parameters and optimization targets (TOML); defaults to the built-in example plant
    #[arg(long)]
    goals: Option<PathBuf>,

    /// Starting configuration (plain text); drafted from the goals when omitted
    #[arg(long)]
    candidate: Option<PathBuf>,

    /// Revision budget; overrides the configured value
    #[arg(long)]
    max_iterations: Option<u32>,

    /// Optimizer configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip the narrative report at the end
    #[arg(long)]
    no_report: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = OptimizerConfig::load_layered(args.config.as_deref()).context("loading configuration")?;
    init_tracing(&config.observability).map_err(|e| anyhow::anyhow!(e))?;

    let goals = match &args.goals {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            OptimizationGoals::from_toml_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => example::example_plant(),
    };
    let max_iterations = args.max_iterations.unwrap_or(config.optimization.max_iterations);

    let client = AnthropicClient::from_env()?.with_timeout(config.llm.timeout())?;
    let backend = ClaudeBackend::new(client, config.llm.clone());

    let initial = match &args.candidate {
        Some(path) => {
            let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            Candidate::new(text)
        }
        None => {
            println!("Drafting an initial process configuration...");
            ClaudeDrafter::new(backend.clone())
                .draft(&goals)
                .await
                .context("drafting the initial configuration")?
        }
    };

    let env = CollaboratorEnvironment::new(
        Arc::new(ClaudeEvaluator::new(backend.clone())),
        Arc::new(ClaudeOptimizer::new(backend.clone())),
    )
    .with_call_timeout(config.optimization.collaborator_timeout());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted; stopping after the current step");
            on_interrupt.cancel();
        }
    });

    println!("Optimizing with a budget of {max_iterations} revisions...\n");
    let outcome = match run_optimization_with_cancel(initial, goals.clone(), max_iterations, env, &cancel).await {
        Ok(outcome) => outcome,
        Err(error) => {
            print_partial_history(&error);
            return Err(error.into());
        }
    };

    println!("{}", render_summary(&outcome));
    println!("FINAL CONFIGURATION:\n{}\n", outcome.state.candidate());

    if wants_report(args.no_report, &outcome) {
        match ClaudeReporter::new(backend).report(&outcome, &goals).await {
            Ok(report) => println!("REPORT:\n{report}"),
            Err(error) => tracing::warn!(%error, "Report generation failed"),
        }
    }

    Ok(())
}

/// A cancelled run ends without further model calls
fn wants_report(no_report: bool, outcome: &RunOutcome) -> bool {
    !no_report && outcome.termination != Termination::Cancelled && outcome.state.latest_evaluation().is_some()
}

fn print_partial_history(error: &LoopError) {
    let Some(state) = error.partial_state() else {
        return;
    };
    eprintln!("Run failed after {} revisions", state.iteration_count());
    for entry in state.history() {
        eprintln!(
            "  Iteration {}: score {}, status {}",
            entry.iteration,
            entry.evaluation.score(),
            entry.evaluation.status()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hydro_agents_patterns::{Assessments, EvaluationVerdict, OptimizationState, OptimizationStatus, Score};

    #[allow(clippy::unwrap_used)] // Test code
    fn evaluated_outcome(termination: Termination) -> RunOutcome {
        let verdict = EvaluationVerdict::new(
            Score::new(5).unwrap(),
            OptimizationStatus::NeedsImprovement,
            Assessments {
                water_quality: "Turbidity within limits".to_string(),
                efficiency: "Alum dose high".to_string(),
            },
            "Lower alum dose",
        );
        RunOutcome {
            state: OptimizationState::initialize("baseline", 3).unwrap().record_evaluation(verdict),
            termination,
        }
    }

    #[test]
    fn test_report_follows_finished_runs() {
        assert!(wants_report(false, &evaluated_outcome(Termination::GoalMet)));
        assert!(wants_report(false, &evaluated_outcome(Termination::BudgetExhausted)));
        assert!(!wants_report(true, &evaluated_outcome(Termination::GoalMet)));
    }

    #[test]
    fn test_cancelled_run_skips_report() {
        assert!(!wants_report(false, &evaluated_outcome(Termination::Cancelled)));
    }

    #[test]
    #[allow(clippy::unwrap_used)] // Test code
    fn test_unevaluated_run_skips_report() {
        let outcome = RunOutcome {
            state: OptimizationState::initialize("baseline", 3).unwrap(),
            termination: Termination::Cancelled,
        };
        assert!(!wants_report(false, &outcome));
    }
}
