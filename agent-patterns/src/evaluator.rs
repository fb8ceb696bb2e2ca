//! Evaluator-Optimizer loop controller
//!
//! Iterative improvement of a treatment configuration:
//! evaluate → decide → revise → evaluate → ... until the evaluator reports
//! the goals are met or the revision budget is spent.
//!
//! ## Pattern
//!
//! 1. Evaluate the initial candidate
//! 2. [`decide`]: stop on budget exhaustion, then on an `optimized` verdict
//! 3. Otherwise ask the optimizer for a revision and evaluate it
//!
//! The budget bounds *revisions*: with `max_iterations = 1` the candidate is
//! evaluated, revised once, and re-evaluated.
//!
//! The controller is an [`OptimizationReducer`]; collaborator calls are the
//! effects produced by an [`OptimizationEnvironment`]. [`run_optimization`]
//! drives it on a sequential [`Runner`].
//!
//! ## Example
//!
//! ```ignore
//! let env = CollaboratorEnvironment::new(evaluator, optimizer)
//!     .with_call_timeout(Duration::from_secs(600));
//! let outcome = run_optimization(draft, goals, 5, env).await?;
//! println!("{:?} after {} revisions", outcome.termination, outcome.state.iteration_count());
//! ```

use crate::collaborators::{CollaboratorError, Evaluator, Optimizer, Stage};
use crate::error::LoopError;
use crate::goals::OptimizationGoals;
use crate::state::{Candidate, OptimizationState};
use crate::tracing_support::TracedReducer;
use crate::verdict::EvaluationVerdict;
use hydro_agents_core::effect::Effect;
use hydro_agents_core::reducer::Reducer;
use hydro_agents_runtime::{CancellationToken, RunStatus, Runner};
use smallvec::{smallvec, SmallVec};
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Why a run stopped without error
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The evaluator reported `optimized`
    GoalMet,
    /// The revision budget was spent
    BudgetExhausted,
    /// The caller cancelled the run
    Cancelled,
}

impl Termination {
    /// Stable label for logs and metrics
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GoalMet => "goal_met",
            Self::BudgetExhausted => "budget_exhausted",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Outcome of [`decide`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Request another revision
    Continue,
    /// Stop the run
    Done(Termination),
}

/// Decide what follows an evaluation
///
/// The budget check comes first, so a run at its cap stops as
/// `BudgetExhausted` even when the last verdict is `optimized`.
#[must_use]
pub fn decide(state: &OptimizationState) -> Decision {
    if state.iteration_count() >= state.max_iterations() {
        return Decision::Done(Termination::BudgetExhausted);
    }

    match state.latest_evaluation() {
        Some(verdict) if verdict.is_optimized() => Decision::Done(Termination::GoalMet),
        _ => Decision::Continue,
    }
}

/// Controller phase
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Not started
    Idle,
    /// Waiting for a verdict
    Evaluating,
    /// Waiting for a revision
    Optimizing,
    /// Stopped without error
    Done(Termination),
    /// Stopped by a collaborator failure
    Failed {
        /// Which collaborator failed
        stage: Stage,
        /// Underlying failure
        error: CollaboratorError,
    },
}

/// Actions for the optimization loop
#[derive(Clone, Debug)]
pub enum OptimizationAction {
    /// Begin the run by evaluating the initial candidate
    Start,
    /// The evaluator returned a verdict
    Evaluated {
        /// Validated verdict
        verdict: EvaluationVerdict,
    },
    /// The optimizer returned a revision
    Revised {
        /// Revised candidate
        candidate: Candidate,
    },
    /// A collaborator call failed
    Failed {
        /// Which collaborator failed
        stage: Stage,
        /// Underlying failure
        error: CollaboratorError,
    },
}

/// Environment that turns collaborator calls into effects
pub trait OptimizationEnvironment: Send + Sync {
    /// Effect that evaluates `candidate` and reports back
    /// `Evaluated` or `Failed { stage: Evaluate, .. }`
    fn evaluate(&self, candidate: Candidate, goals: Arc<OptimizationGoals>) -> Effect<OptimizationAction>;

    /// Effect that revises `candidate` and reports back
    /// `Revised` or `Failed { stage: Optimize, .. }`
    fn optimize(
        &self,
        candidate: Candidate,
        goals: Arc<OptimizationGoals>,
        verdict: EvaluationVerdict,
    ) -> Effect<OptimizationAction>;
}

/// Production environment backed by [`Evaluator`] and [`Optimizer`] objects
#[derive(Clone)]
pub struct CollaboratorEnvironment {
    evaluator: Arc<dyn Evaluator>,
    optimizer: Arc<dyn Optimizer>,
    call_timeout: Option<Duration>,
}

impl CollaboratorEnvironment {
    /// Create an environment with unbounded calls
    #[must_use]
    pub fn new(evaluator: Arc<dyn Evaluator>, optimizer: Arc<dyn Optimizer>) -> Self {
        Self {
            evaluator,
            optimizer,
            call_timeout: None,
        }
    }

    /// Builder: Bound every collaborator call by `timeout`
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    /// Per-call timeout, if any
    #[must_use]
    pub const fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout
    }
}

impl std::fmt::Debug for CollaboratorEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollaboratorEnvironment")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

async fn bounded<T>(
    limit: Option<Duration>,
    call: impl Future<Output = Result<T, CollaboratorError>>,
) -> Result<T, CollaboratorError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, call)
            .await
            .unwrap_or(Err(CollaboratorError::Timeout(limit))),
        None => call.await,
    }
}

impl OptimizationEnvironment for CollaboratorEnvironment {
    fn evaluate(&self, candidate: Candidate, goals: Arc<OptimizationGoals>) -> Effect<OptimizationAction> {
        let evaluator = Arc::clone(&self.evaluator);
        let limit = self.call_timeout;

        Effect::Future(Box::pin(
            async move {
                let action = match bounded(limit, evaluator.evaluate(&candidate, &goals)).await {
                    Ok(verdict) => OptimizationAction::Evaluated { verdict },
                    Err(error) => OptimizationAction::Failed {
                        stage: Stage::Evaluate,
                        error,
                    },
                };
                Some(action)
            }
            .instrument(tracing::info_span!("collaborator", stage = %Stage::Evaluate)),
        ))
    }

    fn optimize(
        &self,
        candidate: Candidate,
        goals: Arc<OptimizationGoals>,
        verdict: EvaluationVerdict,
    ) -> Effect<OptimizationAction> {
        let optimizer = Arc::clone(&self.optimizer);
        let limit = self.call_timeout;

        Effect::Future(Box::pin(
            async move {
                let action = match bounded(limit, optimizer.optimize(&candidate, &goals, &verdict)).await {
                    Ok(candidate) => OptimizationAction::Revised { candidate },
                    Err(error) => OptimizationAction::Failed {
                        stage: Stage::Optimize,
                        error,
                    },
                };
                Some(action)
            }
            .instrument(tracing::info_span!("collaborator", stage = %Stage::Optimize)),
        ))
    }
}

/// Reducer state: the run state plus controller bookkeeping
#[derive(Clone, Debug)]
pub struct ControllerState {
    run: OptimizationState,
    goals: Arc<OptimizationGoals>,
    phase: Phase,
}

impl ControllerState {
    /// Wrap a freshly initialized run
    #[must_use]
    pub fn new(run: OptimizationState, goals: OptimizationGoals) -> Self {
        Self {
            run,
            goals: Arc::new(goals),
            phase: Phase::Idle,
        }
    }

    /// Run state
    #[must_use]
    pub const fn run(&self) -> &OptimizationState {
        &self.run
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> &Phase {
        &self.phase
    }

    /// Goals shared with collaborators
    #[must_use]
    pub fn goals(&self) -> &OptimizationGoals {
        &self.goals
    }

    /// Translate the final controller state into the run result
    ///
    /// # Errors
    ///
    /// Returns `LoopError` if a collaborator failed, or if the runner settled
    /// while a call was still outstanding
    pub fn into_outcome(self, status: RunStatus) -> Result<RunOutcome, LoopError> {
        match (self.phase, status) {
            (Phase::Done(termination), _) => Ok(RunOutcome {
                state: self.run,
                termination,
            }),
            (Phase::Failed { stage, error }, _) => Err(LoopError::from_failure(stage, error, self.run)),
            (_, RunStatus::Cancelled) => Ok(RunOutcome {
                state: self.run,
                termination: Termination::Cancelled,
            }),
            (Phase::Idle | Phase::Evaluating | Phase::Optimizing, RunStatus::Settled) => {
                Err(LoopError::Stalled {
                    iteration: self.run.iteration_count(),
                    state: Box::new(self.run),
                })
            }
        }
    }
}

/// Evaluator-optimizer reducer
pub struct OptimizationReducer<E> {
    _phantom: PhantomData<E>,
}

impl<E> OptimizationReducer<E> {
    /// Create new optimization reducer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _phantom: PhantomData,
        }
    }
}

impl<E> Default for OptimizationReducer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: OptimizationEnvironment> Reducer for OptimizationReducer<E> {
    type State = ControllerState;
    type Action = OptimizationAction;
    type Environment = E;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match (&state.phase, action) {
            (Phase::Idle, OptimizationAction::Start) => {
                tracing::info!(max_iterations = state.run.max_iterations(), "Optimization started");
                state.phase = Phase::Evaluating;
                smallvec![env.evaluate(state.run.candidate().clone(), Arc::clone(&state.goals))]
            }

            (Phase::Evaluating, OptimizationAction::Evaluated { verdict }) => {
                metrics::counter!("optimization.evaluations").increment(1);
                state.run = state.run.clone().record_evaluation(verdict.clone());

                tracing::info!(
                    iteration = state.run.iteration_count(),
                    score = verdict.score().get(),
                    status = %verdict.status(),
                    "Candidate evaluated"
                );

                match decide(&state.run) {
                    Decision::Done(termination) => {
                        tracing::info!(
                            termination = termination.as_str(),
                            revisions = state.run.iteration_count(),
                            "Optimization finished"
                        );
                        state.phase = Phase::Done(termination);
                        SmallVec::new()
                    }
                    Decision::Continue => {
                        state.phase = Phase::Optimizing;
                        smallvec![env.optimize(
                            state.run.candidate().clone(),
                            Arc::clone(&state.goals),
                            verdict,
                        )]
                    }
                }
            }

            (Phase::Optimizing, OptimizationAction::Revised { candidate }) => {
                metrics::counter!("optimization.revisions").increment(1);
                state.run = state.run.clone().apply_revision(candidate);
                tracing::debug!(iteration = state.run.iteration_count(), "Revision applied");

                state.phase = Phase::Evaluating;
                smallvec![env.evaluate(state.run.candidate().clone(), Arc::clone(&state.goals))]
            }

            (Phase::Evaluating, OptimizationAction::Failed { stage: stage @ Stage::Evaluate, error })
            | (Phase::Optimizing, OptimizationAction::Failed { stage: stage @ Stage::Optimize, error }) => {
                tracing::warn!(
                    %stage,
                    iteration = state.run.iteration_count(),
                    error = %error,
                    "Collaborator call failed"
                );
                state.phase = Phase::Failed { stage, error };
                SmallVec::new()
            }

            (phase, action) => {
                tracing::warn!(?phase, ?action, "Ignoring action not expected in this phase");
                SmallVec::new()
            }
        }
    }
}

/// Result of a run that stopped without error
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunOutcome {
    /// Final run state
    pub state: OptimizationState,
    /// Why the run stopped
    pub termination: Termination,
}

/// Run the loop to completion
///
/// # Errors
///
/// `LoopError::Config` for malformed goals or a zero budget (no collaborator
/// is called); `SchemaViolation`/`Collaborator` with the partial state when a
/// call fails mid-run
pub async fn run_optimization<E>(
    initial_candidate: impl Into<Candidate>,
    goals: OptimizationGoals,
    max_iterations: u32,
    env: E,
) -> Result<RunOutcome, LoopError>
where
    E: OptimizationEnvironment,
{
    run_optimization_with_cancel(initial_candidate, goals, max_iterations, env, &CancellationToken::new())
        .await
}

/// Run the loop until it stops or `cancel` fires
///
/// A call in flight when `cancel` fires is dropped; the outcome then carries
/// the state after the last completed step and [`Termination::Cancelled`].
///
/// # Errors
///
/// Same as [`run_optimization`]
pub async fn run_optimization_with_cancel<E>(
    initial_candidate: impl Into<Candidate>,
    goals: OptimizationGoals,
    max_iterations: u32,
    env: E,
    cancel: &CancellationToken,
) -> Result<RunOutcome, LoopError>
where
    E: OptimizationEnvironment,
{
    goals.validate()?;
    let run = OptimizationState::initialize(initial_candidate, max_iterations)?;

    let span = tracing::info_span!("optimization.run", max_iterations);
    async move {
        let runner = Runner::new(
            TracedReducer::new(OptimizationReducer::<E>::new(), "treatment-optimizer".to_string()),
            env,
        );
        let mut state = ControllerState::new(run, goals);

        let status = runner.run(&mut state, OptimizationAction::Start, cancel).await;
        let result = state.into_outcome(status);

        match &result {
            Ok(outcome) => {
                metrics::counter!("optimization.runs", "termination" => outcome.termination.as_str())
                    .increment(1);
            }
            Err(error) => {
                metrics::counter!("optimization.runs", "termination" => "failed").increment(1);
                tracing::warn!(%error, "Optimization failed");
            }
        }

        result
    }
    .instrument(span)
    .await
}
