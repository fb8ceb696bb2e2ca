//! # Hydro Agents Runtime
//!
//! Runtime for reducers whose effects must run strictly one after another.
//!
//! ## Core Components
//!
//! - **Runner**: Feeds actions to a reducer and executes the returned effects
//!   sequentially, reducing every produced action before the next effect starts
//! - **`CancellationToken`**: Cooperative cancellation checked between steps and
//!   raced against every in-flight effect
//! - **Retry**: Exponential backoff helpers for collaborators that talk to flaky
//!   upstream services
//!
//! ## Example
//!
//! ```ignore
//! use hydro_agents_runtime::{CancellationToken, Runner, RunStatus};
//!
//! let runner = Runner::new(my_reducer, environment);
//! let cancel = CancellationToken::new();
//!
//! let status = runner.run(&mut state, Action::Start, &cancel).await;
//! assert_eq!(status, RunStatus::Settled);
//! ```

use hydro_agents_core::{effect::Effect, reducer::Reducer};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::watch;

/// Retry logic with exponential backoff
pub mod retry;

/// Cooperative cancellation signal shared between a run and its caller
///
/// Cloning the token yields a handle to the same signal. Once cancelled, a
/// token stays cancelled.
#[derive(Clone, Debug)]
pub struct CancellationToken {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancellationToken {
    /// Create a new token that is not cancelled
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// Signal cancellation to every clone of this token
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Check whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Wait until cancellation is requested
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|cancelled| *cancelled).await.is_err() {
            // Sender dropped without cancelling: never fires
            std::future::pending::<()>().await;
        }
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// How a [`Runner::run`] call ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// No effects remain; the reducer reached a resting state
    Settled,
    /// Cancellation was observed; pending effects were dropped unexecuted
    Cancelled,
}

/// Sequential effect runner
///
/// Unlike a concurrent store, the runner never has more than one effect in
/// flight. Effects are executed in the order the reducer returned them, and
/// an action produced by an effect is reduced before the next effect starts.
pub struct Runner<R: Reducer> {
    reducer: R,
    environment: R::Environment,
}

impl<R> Runner<R>
where
    R: Reducer,
{
    /// Create a runner for the given reducer and environment
    #[must_use]
    pub const fn new(reducer: R, environment: R::Environment) -> Self {
        Self {
            reducer,
            environment,
        }
    }

    /// Get reference to the reducer
    #[must_use]
    pub const fn reducer(&self) -> &R {
        &self.reducer
    }

    /// Get reference to the environment
    #[must_use]
    pub const fn environment(&self) -> &R::Environment {
        &self.environment
    }

    /// Reduce `action` and run the resulting effect chain to completion
    ///
    /// Returns [`RunStatus::Settled`] once no effects remain, or
    /// [`RunStatus::Cancelled`] as soon as `cancel` fires. An effect that is
    /// in flight when cancellation fires is dropped and its output is never
    /// reduced.
    pub async fn run(
        &self,
        state: &mut R::State,
        action: R::Action,
        cancel: &CancellationToken,
    ) -> RunStatus {
        let mut pending: VecDeque<Effect<R::Action>> = VecDeque::new();
        self.reduce_into(state, action, &mut pending);

        loop {
            if cancel.is_cancelled() {
                return Self::cancelled(pending.len());
            }

            let Some(effect) = pending.pop_front() else {
                tracing::debug!("Runner settled");
                return RunStatus::Settled;
            };

            match effect {
                Effect::None => {
                    metrics::counter!("runner.effects.executed", "type" => "none").increment(1);
                }
                Effect::Future(fut) => {
                    metrics::counter!("runner.effects.executed", "type" => "future").increment(1);
                    tracing::trace!("Executing Effect::Future");

                    let produced = tokio::select! {
                        biased;
                        () = cancel.cancelled() => {
                            return Self::cancelled(pending.len() + 1);
                        }
                        produced = fut => produced,
                    };

                    if let Some(next) = produced {
                        self.reduce_into(state, next, &mut pending);
                    } else {
                        tracing::trace!("Effect::Future completed with no action");
                    }
                }
            }
        }
    }

    fn reduce_into(
        &self,
        state: &mut R::State,
        action: R::Action,
        pending: &mut VecDeque<Effect<R::Action>>,
    ) {
        metrics::counter!("runner.actions.reduced").increment(1);
        let effects = self.reducer.reduce(state, action, &self.environment);
        pending.extend(effects.into_iter().filter(|effect| !effect.is_none()));
    }

    fn cancelled(dropped: usize) -> RunStatus {
        metrics::counter!("runner.cancelled").increment(1);
        tracing::info!(dropped_effects = dropped, "Run cancelled");
        RunStatus::Cancelled
    }
}
