//! Deterministic collaborators and environments for loop tests

use async_trait::async_trait;
use hydro_agents_core::effect::Effect;
use hydro_agents_patterns::{
    Candidate, CollaboratorError, Drafter, EvaluationVerdict, Evaluator, OptimizationAction,
    OptimizationEnvironment, OptimizationGoals, OptimizationStatus, Optimizer,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Evaluator that replays a fixed script of results
///
/// Each call pops the next result. Once the script is exhausted every call
/// fails with `CollaboratorError::Upstream`.
#[derive(Debug, Default)]
pub struct ScriptedEvaluator {
    script: Mutex<VecDeque<Result<EvaluationVerdict, CollaboratorError>>>,
    seen: Mutex<Vec<Candidate>>,
}

impl ScriptedEvaluator {
    /// Replay `results` in order
    #[must_use]
    pub fn new(results: impl IntoIterator<Item = Result<EvaluationVerdict, CollaboratorError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Replay one verdict per status, scored 5 unless optimized (then 9)
    #[must_use]
    pub fn from_statuses(statuses: impl IntoIterator<Item = OptimizationStatus>) -> Self {
        Self::new(statuses.into_iter().map(|status| {
            Ok(match status {
                OptimizationStatus::Optimized => crate::verdicts::optimized(9),
                OptimizationStatus::NeedsImprovement => crate::verdicts::needs_improvement(5),
            })
        }))
    }

    /// Always answer `needs_improvement`
    #[must_use]
    pub fn never_satisfied(calls: usize) -> Self {
        Self::from_statuses(std::iter::repeat_n(OptimizationStatus::NeedsImprovement, calls))
    }

    /// Number of calls made
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.seen).len()
    }

    /// Candidates evaluated, in call order
    #[must_use]
    pub fn seen_candidates(&self) -> Vec<Candidate> {
        lock(&self.seen).clone()
    }
}

#[async_trait]
impl Evaluator for ScriptedEvaluator {
    async fn evaluate(
        &self,
        candidate: &Candidate,
        _goals: &OptimizationGoals,
    ) -> Result<EvaluationVerdict, CollaboratorError> {
        lock(&self.seen).push(candidate.clone());
        lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| Err(CollaboratorError::Upstream("evaluator script exhausted".to_string())))
    }
}

/// Optimizer that appends a fixed suffix to the candidate
///
/// With the default suffix `'`, `c` becomes `c'`, then `c''`.
#[derive(Debug)]
pub struct AppendingOptimizer {
    suffix: String,
    verdicts: Mutex<Vec<EvaluationVerdict>>,
}

impl AppendingOptimizer {
    /// Append `'` on every revision
    #[must_use]
    pub fn new() -> Self {
        Self::with_suffix("'")
    }

    /// Append `suffix` on every revision
    #[must_use]
    pub fn with_suffix(suffix: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            verdicts: Mutex::new(Vec::new()),
        }
    }

    /// Number of calls made
    #[must_use]
    pub fn calls(&self) -> usize {
        lock(&self.verdicts).len()
    }

    /// Verdicts received, in call order
    #[must_use]
    pub fn received_verdicts(&self) -> Vec<EvaluationVerdict> {
        lock(&self.verdicts).clone()
    }
}

impl Default for AppendingOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Optimizer for AppendingOptimizer {
    async fn optimize(
        &self,
        candidate: &Candidate,
        _goals: &OptimizationGoals,
        verdict: &EvaluationVerdict,
    ) -> Result<Candidate, CollaboratorError> {
        lock(&self.verdicts).push(verdict.clone());
        Ok(Candidate::new(format!("{}{}", candidate.as_str(), self.suffix)))
    }
}

/// Optimizer that always fails with the same error
#[derive(Debug)]
pub struct FailingOptimizer {
    error: CollaboratorError,
    calls: AtomicUsize,
}

impl FailingOptimizer {
    /// Fail every call with `error`
    #[must_use]
    pub const fn new(error: CollaboratorError) -> Self {
        Self {
            error,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls made
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Optimizer for FailingOptimizer {
    async fn optimize(
        &self,
        _candidate: &Candidate,
        _goals: &OptimizationGoals,
        _verdict: &EvaluationVerdict,
    ) -> Result<Candidate, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Evaluator that sleeps before delegating
///
/// Calls before `delay_from` run without delay, so a test can let a run make
/// progress and then stall it mid-flight.
#[derive(Debug)]
pub struct SlowEvaluator<E> {
    inner: E,
    delay: Duration,
    delay_from: usize,
    calls: AtomicUsize,
}

impl<E> SlowEvaluator<E> {
    /// Delay every call to `inner` by `delay`
    #[must_use]
    pub const fn new(inner: E, delay: Duration) -> Self {
        Self {
            inner,
            delay,
            delay_from: 0,
            calls: AtomicUsize::new(0),
        }
    }

    /// Builder: Only delay from the `n`th call on (0-based)
    #[must_use]
    pub const fn delay_from(mut self, n: usize) -> Self {
        self.delay_from = n;
        self
    }

    /// Number of calls started
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Wrapped evaluator
    #[must_use]
    pub const fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: Evaluator> Evaluator for SlowEvaluator<E> {
    async fn evaluate(
        &self,
        candidate: &Candidate,
        goals: &OptimizationGoals,
    ) -> Result<EvaluationVerdict, CollaboratorError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call >= self.delay_from {
            tokio::time::sleep(self.delay).await;
        }
        self.inner.evaluate(candidate, goals).await
    }
}

/// Drafter that returns a fixed candidate
#[derive(Debug, Clone)]
pub struct FixedDrafter {
    candidate: Candidate,
}

impl FixedDrafter {
    /// Always draft `candidate`
    #[must_use]
    pub fn new(candidate: impl Into<Candidate>) -> Self {
        Self {
            candidate: candidate.into(),
        }
    }
}

#[async_trait]
impl Drafter for FixedDrafter {
    async fn draft(&self, _goals: &OptimizationGoals) -> Result<Candidate, CollaboratorError> {
        Ok(self.candidate.clone())
    }
}

/// Collaborator call requested by the reducer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestedCall {
    /// Evaluate this candidate
    Evaluate(Candidate),
    /// Revise this candidate from this verdict
    Optimize(Candidate, EvaluationVerdict),
}

/// Environment that records requested calls and never reports back
///
/// Use it with `ReducerTest` to check which call a transition asks for
/// without running a collaborator. Clones share the same record.
#[derive(Clone, Debug, Default)]
pub struct RecordingEnvironment {
    requests: Arc<Mutex<Vec<RequestedCall>>>,
}

impl RecordingEnvironment {
    /// Create an empty recorder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls requested so far
    #[must_use]
    pub fn requests(&self) -> Vec<RequestedCall> {
        lock(&self.requests).clone()
    }
}

impl OptimizationEnvironment for RecordingEnvironment {
    fn evaluate(&self, candidate: Candidate, _goals: Arc<OptimizationGoals>) -> Effect<OptimizationAction> {
        lock(&self.requests).push(RequestedCall::Evaluate(candidate));
        Effect::Future(Box::pin(async { None }))
    }

    fn optimize(
        &self,
        candidate: Candidate,
        _goals: Arc<OptimizationGoals>,
        verdict: EvaluationVerdict,
    ) -> Effect<OptimizationAction> {
        lock(&self.requests).push(RequestedCall::Optimize(candidate, verdict));
        Effect::Future(Box::pin(async { None }))
    }
}
