//! Tracing support for the optimization loop
//!
//! ## Usage
//!
//! ```ignore
//! // At application startup
//! tracing_support::init_tracing(&config.observability)?;
//!
//! // Wrap any reducer
//! let traced_reducer = TracedReducer::new(my_reducer, "treatment-optimizer".to_string());
//! ```

use crate::config::ObservabilityConfig;
use hydro_agents_core::{effect::Effect, reducer::Reducer};
use smallvec::SmallVec;
use std::time::Instant;
use tracing::{debug, field, span, Level};

/// Wrapper reducer that opens a span around every reduction
///
/// The span records the action, the number of effects produced, and how long
/// the inner reducer took.
pub struct TracedReducer<R> {
    inner: R,
    service_name: String,
}

impl<R> TracedReducer<R> {
    /// Create a new traced reducer wrapper
    ///
    /// # Arguments
    ///
    /// * `inner` - The reducer to wrap
    /// * `service_name` - Service name recorded on every span
    #[must_use]
    pub const fn new(inner: R, service_name: String) -> Self {
        Self {
            inner,
            service_name,
        }
    }

    /// Get reference to inner reducer
    #[must_use]
    pub const fn inner(&self) -> &R {
        &self.inner
    }

    /// Get service name
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }
}

impl<R> Reducer for TracedReducer<R>
where
    R: Reducer,
    R::Action: std::fmt::Debug,
{
    type State = R::State;
    type Action = R::Action;
    type Environment = R::Environment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let span = span!(
            Level::DEBUG,
            "optimizer.reduce",
            service.name = %self.service_name,
            action = ?action,
            effects.count = field::Empty,
            duration_us = field::Empty,
        );
        let _guard = span.enter();

        let start = Instant::now();
        let effects = self.inner.reduce(state, action, env);
        let duration_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

        span.record("effects.count", effects.len());
        span.record("duration_us", duration_us);

        if effects.is_empty() {
            debug!("Reducer produced no effects");
        } else {
            debug!(effects_count = effects.len(), duration_us, "Reducer execution complete");
        }

        effects
    }
}

/// Install a global fmt subscriber filtered at `config.log_level`
///
/// `RUST_LOG`, when set, takes precedence over the configured level.
///
/// # Errors
///
/// Returns error if the filter directive is invalid or a global subscriber is
/// already installed.
///
/// # Example
///
/// ```ignore
/// use hydro_agents_patterns::{config::ObservabilityConfig, tracing_support};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
///     tracing_support::init_tracing(&ObservabilityConfig::default())?;
///     Ok(())
/// }
/// ```
pub fn init_tracing(config: &ObservabilityConfig) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    use tracing_subscriber::EnvFilter;

    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(config.log_level.to_lowercase())?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()?;

    debug!(level = %config.log_level, "Tracing initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    struct TestReducer {
        effect_count: usize,
    }

    impl Reducer for TestReducer {
        type State = u32;
        type Action = &'static str;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut Self::State,
            _action: Self::Action,
            _env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]> {
            *state += 1;
            let mut effects = smallvec![];
            for _ in 0..self.effect_count {
                effects.push(Effect::Future(Box::pin(async { None })));
            }
            effects
        }
    }

    #[test]
    fn test_traced_reducer_wraps_inner() {
        let traced = TracedReducer::new(TestReducer { effect_count: 2 }, "test-service".to_string());

        assert_eq!(traced.service_name(), "test-service");
        assert_eq!(traced.inner().effect_count, 2);
    }

    #[test]
    fn test_traced_reducer_preserves_effects_and_state() {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_test_writer()
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            let traced = TracedReducer::new(TestReducer { effect_count: 3 }, "test".to_string());
            let mut state = 0;

            let effects = traced.reduce(&mut state, "go", &());
            let none = TracedReducer::new(TestReducer { effect_count: 0 }, "test".to_string())
                .reduce(&mut state, "again", &());

            assert_eq!(effects.len(), 3);
            assert!(none.is_empty());
            assert_eq!(state, 2);
        });
    }

    #[test]
    fn test_init_tracing_rejects_second_install() {
        let config = ObservabilityConfig::default();
        // Another test binary may already own the global subscriber.
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).is_err());
    }
}
