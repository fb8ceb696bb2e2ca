//! End-to-end tests for the optimization loop with deterministic collaborators

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::enum_glob_use)] // Test code can use unwrap/expect/panic

use hydro_agents_patterns::{
    run_optimization, run_optimization_with_cancel, Candidate, CancellationToken, CollaboratorEnvironment,
    CollaboratorError, Drafter, LoopError, OptimizationGoals, OptimizationStatus::*, SchemaViolation, Stage,
    Termination,
};
use hydro_agents_testing::{
    verdicts, AppendingOptimizer, FailingOptimizer, FixedDrafter, ScriptedEvaluator, SlowEvaluator,
};
use std::sync::Arc;
use std::time::Duration;

fn goals() -> OptimizationGoals {
    OptimizationGoals::new()
        .with_parameter("source_water_turbidity", "12-18 NTU, seasonal variation")
        .with_target("finished_water_turbidity", "<0.1 NTU 95% of time")
        .with_target("chemical_consumption", "Reduce coagulant usage by 15%")
}

fn candidates(names: &[&str]) -> Vec<Candidate> {
    names.iter().copied().map(Candidate::from).collect()
}

#[tokio::test]
async fn test_goal_met_on_third_evaluation() {
    let evaluator = Arc::new(ScriptedEvaluator::from_statuses([NeedsImprovement, NeedsImprovement, Optimized]));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer.clone());

    let outcome = run_optimization("c", goals(), 3, env).await.unwrap();

    assert_eq!(outcome.termination, Termination::GoalMet);
    assert_eq!(outcome.state.iteration_count(), 2);
    assert_eq!(outcome.state.candidate().as_str(), "c''");
    assert_eq!(outcome.state.history().len(), 2);
    assert_eq!(outcome.state.history()[0].iteration, 1);
    assert_eq!(outcome.state.history()[0].candidate.as_str(), "c'");
    assert_eq!(outcome.state.history()[1].iteration, 2);
    assert_eq!(outcome.state.history()[1].candidate.as_str(), "c''");
    assert_eq!(
        outcome.state.latest_evaluation().map(|v| v.status()),
        Some(Optimized)
    );

    assert_eq!(evaluator.seen_candidates(), candidates(&["c", "c'", "c''"]));
    assert_eq!(optimizer.calls(), 2);
}

#[tokio::test]
async fn test_drafted_candidate_seeds_the_run() {
    let drafter: Arc<dyn Drafter> = Arc::new(FixedDrafter::new("baseline"));
    let evaluator = Arc::new(ScriptedEvaluator::from_statuses([NeedsImprovement, Optimized]));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer);

    let draft = drafter.draft(&goals()).await.unwrap();
    let outcome = run_optimization(draft, goals(), 3, env).await.unwrap();

    assert_eq!(outcome.termination, Termination::GoalMet);
    assert_eq!(evaluator.seen_candidates(), candidates(&["baseline", "baseline'"]));
    assert_eq!(outcome.state.candidate().as_str(), "baseline'");
}

#[tokio::test]
async fn test_budget_of_one_allows_one_revision() {
    let evaluator = Arc::new(ScriptedEvaluator::never_satisfied(5));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer.clone());

    let outcome = run_optimization("c", goals(), 1, env).await.unwrap();

    assert_eq!(outcome.termination, Termination::BudgetExhausted);
    assert_eq!(outcome.state.iteration_count(), 1);
    assert_eq!(outcome.state.history().len(), 1);
    assert_eq!(evaluator.calls(), 2);
    assert_eq!(optimizer.calls(), 1);
}

#[tokio::test]
async fn test_optimized_status_stops_regardless_of_score() {
    let evaluator = Arc::new(ScriptedEvaluator::new([Ok(verdicts::optimized(2))]));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer.clone());

    let outcome = run_optimization("c", goals(), 5, env).await.unwrap();

    assert_eq!(outcome.termination, Termination::GoalMet);
    assert_eq!(outcome.state.iteration_count(), 0);
    assert!(outcome.state.history().is_empty());
    assert_eq!(outcome.state.latest_evaluation().map(|v| v.score().get()), Some(2));
    assert_eq!(evaluator.calls(), 1);
    assert_eq!(optimizer.calls(), 0);
}

#[tokio::test]
async fn test_high_score_without_optimized_status_continues() {
    let evaluator = Arc::new(ScriptedEvaluator::new([
        Ok(verdicts::needs_improvement(10)),
        Ok(verdicts::optimized(6)),
    ]));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer.clone());

    let outcome = run_optimization("c", goals(), 5, env).await.unwrap();

    assert_eq!(outcome.termination, Termination::GoalMet);
    assert_eq!(outcome.state.iteration_count(), 1);
    assert_eq!(evaluator.calls(), 2);
}

#[tokio::test]
async fn test_cap_stops_even_when_still_needing_improvement() {
    let evaluator = Arc::new(ScriptedEvaluator::never_satisfied(10));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer.clone());

    let outcome = run_optimization("c", goals(), 2, env).await.unwrap();

    assert_eq!(outcome.termination, Termination::BudgetExhausted);
    assert_eq!(outcome.state.latest_evaluation().map(|v| v.status()), Some(NeedsImprovement));
    assert_eq!(outcome.state.candidate().as_str(), "c''");
    assert_eq!(optimizer.calls(), 2);
    assert_eq!(evaluator.calls(), 3);
}

#[tokio::test]
async fn test_cap_wins_over_optimized_on_final_evaluation() {
    let evaluator = Arc::new(ScriptedEvaluator::from_statuses([NeedsImprovement, Optimized]));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator, optimizer);

    let outcome = run_optimization("c", goals(), 1, env).await.unwrap();

    assert_eq!(outcome.termination, Termination::BudgetExhausted);
    assert_eq!(outcome.state.latest_evaluation().map(|v| v.status()), Some(Optimized));
}

#[tokio::test]
async fn test_history_pairs_each_revision_with_preceding_verdict() {
    let first = verdicts::needs_improvement(3);
    let second = verdicts::needs_improvement(6);
    let third = verdicts::optimized(9);
    let evaluator = Arc::new(ScriptedEvaluator::new([
        Ok(first.clone()),
        Ok(second.clone()),
        Ok(third.clone()),
    ]));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator, optimizer.clone());

    let outcome = run_optimization("c", goals(), 4, env).await.unwrap();

    let history = outcome.state.history();
    assert_eq!(history.len(), optimizer.calls());
    assert_eq!(history[0].evaluation, first);
    assert_eq!(history[1].evaluation, second);
    assert_eq!(outcome.state.latest_evaluation(), Some(&third));
    assert_eq!(optimizer.received_verdicts(), vec![first, second]);
}

#[tokio::test]
async fn test_restart_with_same_inputs_is_identical() {
    let run = || async {
        let evaluator = Arc::new(ScriptedEvaluator::from_statuses([NeedsImprovement, NeedsImprovement, Optimized]));
        let optimizer = Arc::new(AppendingOptimizer::new());
        run_optimization("c", goals(), 3, CollaboratorEnvironment::new(evaluator, optimizer))
            .await
            .unwrap()
    };

    let first = run().await;
    let second = run().await;

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_schema_violation_carries_partial_state() {
    let evaluator = Arc::new(ScriptedEvaluator::new([
        Ok(verdicts::needs_improvement(4)),
        Err(SchemaViolation("performance_score 11 outside 1..=10".to_string()).into()),
    ]));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator, optimizer);

    let err = run_optimization("c", goals(), 3, env).await.unwrap_err();

    match &err {
        LoopError::SchemaViolation { iteration, violation, state } => {
            assert_eq!(*iteration, 1);
            assert!(violation.0.contains("performance_score"));
            assert_eq!(state.candidate().as_str(), "c'");
            assert_eq!(state.latest_evaluation().map(|v| v.score().get()), Some(4));
            assert!(state.history().is_empty());
        }
        other => panic!("expected schema violation, got {other:?}"),
    }
    assert_eq!(err.iteration(), Some(1));
}

#[tokio::test]
async fn test_optimizer_failure_is_not_retried() {
    let evaluator = Arc::new(ScriptedEvaluator::never_satisfied(3));
    let optimizer = Arc::new(FailingOptimizer::new(CollaboratorError::Upstream("overloaded".to_string())));
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer.clone());

    let err = run_optimization("c", goals(), 3, env).await.unwrap_err();

    assert!(matches!(
        &err,
        LoopError::Collaborator { stage: Stage::Optimize, iteration: 0, source: CollaboratorError::Upstream(_), .. }
    ));
    let state = err.into_partial_state().unwrap();
    assert_eq!(state.candidate().as_str(), "c");
    assert!(state.latest_evaluation().is_some());
    assert_eq!(optimizer.calls(), 1);
    assert_eq!(evaluator.calls(), 1);
}

#[tokio::test]
async fn test_evaluator_upstream_failure() {
    let evaluator = Arc::new(ScriptedEvaluator::new([Err(CollaboratorError::Upstream("503".to_string()))]));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator, optimizer.clone());

    let err = run_optimization("c", goals(), 3, env).await.unwrap_err();

    assert!(matches!(err, LoopError::Collaborator { stage: Stage::Evaluate, iteration: 0, .. }));
    assert!(err.partial_state().unwrap().latest_evaluation().is_none());
    assert_eq!(optimizer.calls(), 0);
}

#[tokio::test]
async fn test_collaborator_timeout() {
    let evaluator = Arc::new(SlowEvaluator::new(
        ScriptedEvaluator::never_satisfied(1),
        Duration::from_secs(30),
    ));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator, optimizer).with_call_timeout(Duration::from_millis(50));

    let err = run_optimization("c", goals(), 3, env).await.unwrap_err();

    assert!(matches!(
        err,
        LoopError::Collaborator {
            stage: Stage::Evaluate,
            source: CollaboratorError::Timeout(limit),
            ..
        } if limit == Duration::from_millis(50)
    ));
}

#[tokio::test]
async fn test_cancellation_drops_in_flight_evaluation() {
    let evaluator = Arc::new(
        SlowEvaluator::new(ScriptedEvaluator::never_satisfied(5), Duration::from_secs(30)).delay_from(1),
    );
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer.clone());

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let outcome = run_optimization_with_cancel("c", goals(), 5, env, &cancel).await.unwrap();

    assert_eq!(outcome.termination, Termination::Cancelled);
    assert_eq!(outcome.state.iteration_count(), 1);
    assert_eq!(outcome.state.candidate().as_str(), "c'");
    assert!(outcome.state.history().is_empty());
    assert_eq!(evaluator.calls(), 2);
    // The second evaluation never reached the scripted evaluator.
    assert_eq!(evaluator.inner().calls(), 1);
    assert_eq!(optimizer.calls(), 1);
}

#[tokio::test]
async fn test_cancelled_before_start_calls_nothing() {
    let evaluator = Arc::new(ScriptedEvaluator::never_satisfied(1));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer);

    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = run_optimization_with_cancel("c", goals(), 3, env, &cancel).await.unwrap();

    assert_eq!(outcome.termination, Termination::Cancelled);
    assert!(outcome.state.latest_evaluation().is_none());
    assert_eq!(evaluator.calls(), 0);
}

#[tokio::test]
async fn test_malformed_goals_reject_run_before_any_call() {
    let evaluator = Arc::new(ScriptedEvaluator::never_satisfied(1));
    let optimizer = Arc::new(AppendingOptimizer::new());
    let env = CollaboratorEnvironment::new(evaluator.clone(), optimizer);

    let goals = OptimizationGoals::new().with_parameter("ph", "7.2-7.8");
    let err = run_optimization("c", goals, 3, env).await.unwrap_err();

    assert!(matches!(err, LoopError::Config(_)));
    assert!(err.partial_state().is_none());
    assert_eq!(evaluator.calls(), 0);
}
