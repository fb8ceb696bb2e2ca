//! Collaborators backed by the Anthropic Messages API
//!
//! Every role shares one [`ClaudeBackend`], which owns the client, the model
//! settings, and the retry policy for transient API failures. Retries happen
//! here, inside a single collaborator call; the loop itself never retries.

use crate::collaborators::{CollaboratorError, Drafter, Evaluator, Optimizer};
use crate::config::LlmConfig;
use crate::evaluator::RunOutcome;
use crate::goals::OptimizationGoals;
use crate::report::Reporter;
use crate::state::Candidate;
use crate::verdict::{EvaluationVerdict, SchemaViolation};
use async_trait::async_trait;
use hydro_agents_anthropic::{AnthropicClient, ClaudeError, Message, MessagesRequest, MessagesResponse, Tool};
use hydro_agents_runtime::retry::{retry_with_predicate, RetryPolicy};
use std::sync::Arc;

/// Shared client, model settings, and retry policy
#[derive(Clone, Debug)]
pub struct ClaudeBackend {
    client: Arc<AnthropicClient>,
    llm: LlmConfig,
    retry: RetryPolicy,
}

impl ClaudeBackend {
    /// Create a backend retrying per `llm.max_retries`
    #[must_use]
    pub fn new(client: AnthropicClient, llm: LlmConfig) -> Self {
        let retry = llm.retry_policy();
        Self {
            client: Arc::new(client),
            llm,
            retry,
        }
    }

    /// Builder: Replace the retry policy
    #[must_use]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Model settings
    #[must_use]
    pub const fn llm(&self) -> &LlmConfig {
        &self.llm
    }

    fn request(&self, prompt: String) -> MessagesRequest {
        MessagesRequest::new(vec![Message::user(prompt)])
            .with_model(self.llm.model.clone())
            .with_max_tokens(self.llm.max_tokens)
            .with_temperature(self.llm.temperature)
    }

    /// Each attempt is bounded by `llm.timeout()`, whatever timeout the
    /// client itself was built with.
    async fn send(&self, request: MessagesRequest) -> Result<MessagesResponse, CollaboratorError> {
        let limit = self.llm.timeout();
        retry_with_predicate(
            &self.retry,
            || {
                let attempt = self.client.messages(request.clone());
                async move {
                    tokio::time::timeout(limit, attempt)
                        .await
                        .unwrap_or(Err(ClaudeError::Timeout))
                }
            },
            ClaudeError::is_transient,
        )
        .await
        .map_err(|error| match error {
            ClaudeError::Timeout => CollaboratorError::Timeout(limit),
            other => CollaboratorError::Upstream(other.to_string()),
        })
    }

    async fn complete_text(&self, prompt: String) -> Result<String, CollaboratorError> {
        let response = self.send(self.request(prompt)).await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(SchemaViolation("model returned no text".to_string()).into());
        }
        Ok(text)
    }
}

/// Drafts the baseline configuration
#[derive(Clone, Debug)]
pub struct ClaudeDrafter {
    backend: ClaudeBackend,
}

impl ClaudeDrafter {
    /// Create a drafter on `backend`
    #[must_use]
    pub const fn new(backend: ClaudeBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Drafter for ClaudeDrafter {
    #[tracing::instrument(skip_all)]
    async fn draft(&self, goals: &OptimizationGoals) -> Result<Candidate, CollaboratorError> {
        let text = self.backend.complete_text(draft_prompt(goals)).await?;
        Ok(Candidate::new(text))
    }
}

/// Scores configurations through a forced `record_process_evaluation` call
#[derive(Clone, Debug)]
pub struct ClaudeEvaluator {
    backend: ClaudeBackend,
}

impl ClaudeEvaluator {
    /// Create an evaluator on `backend`
    #[must_use]
    pub const fn new(backend: ClaudeBackend) -> Self {
        Self { backend }
    }

    fn tool() -> Tool {
        Tool {
            name: EvaluationVerdict::TOOL_NAME.to_string(),
            description: "Record the evaluation of a water treatment process configuration.".to_string(),
            input_schema: EvaluationVerdict::json_schema(),
        }
    }
}

#[async_trait]
impl Evaluator for ClaudeEvaluator {
    #[tracing::instrument(skip_all)]
    async fn evaluate(
        &self,
        candidate: &Candidate,
        goals: &OptimizationGoals,
    ) -> Result<EvaluationVerdict, CollaboratorError> {
        let request = self
            .backend
            .request(evaluate_prompt(candidate, goals))
            .with_forced_tool(Self::tool());
        let response = self.backend.send(request).await?;

        let input = response.tool_input(EvaluationVerdict::TOOL_NAME).ok_or_else(|| {
            SchemaViolation(format!("model did not call {}", EvaluationVerdict::TOOL_NAME))
        })?;
        let verdict = EvaluationVerdict::from_tool_input(input)?;

        tracing::debug!(score = verdict.score().get(), status = %verdict.status(), "Verdict parsed");
        Ok(verdict)
    }
}

/// Revises configurations from evaluator feedback
#[derive(Clone, Debug)]
pub struct ClaudeOptimizer {
    backend: ClaudeBackend,
}

impl ClaudeOptimizer {
    /// Create an optimizer on `backend`
    #[must_use]
    pub const fn new(backend: ClaudeBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Optimizer for ClaudeOptimizer {
    #[tracing::instrument(skip_all)]
    async fn optimize(
        &self,
        candidate: &Candidate,
        goals: &OptimizationGoals,
        verdict: &EvaluationVerdict,
    ) -> Result<Candidate, CollaboratorError> {
        let text = self
            .backend
            .complete_text(optimize_prompt(candidate, goals, verdict))
            .await?;
        Ok(Candidate::new(text))
    }
}

/// Writes the management report for a finished run
#[derive(Clone, Debug)]
pub struct ClaudeReporter {
    backend: ClaudeBackend,
}

impl ClaudeReporter {
    /// Create a reporter on `backend`
    #[must_use]
    pub const fn new(backend: ClaudeBackend) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Reporter for ClaudeReporter {
    #[tracing::instrument(skip_all, fields(termination = outcome.termination.as_str()))]
    async fn report(&self, outcome: &RunOutcome, goals: &OptimizationGoals) -> Result<String, CollaboratorError> {
        self.backend.complete_text(report_prompt(outcome, goals)).await
    }
}

fn goals_block(goals: &OptimizationGoals) -> String {
    format!(
        "TREATMENT PARAMETERS:\n{}\n\nOPTIMIZATION GOALS:\n{}",
        goals.render_parameters(),
        goals.render_targets()
    )
}

fn draft_prompt(goals: &OptimizationGoals) -> String {
    format!(
        "You are a water treatment process engineer preparing a baseline process configuration.\n\n\
         {}\n\n\
         Describe a complete baseline configuration covering:\n\
         1. Treatment sequence and unit processes\n\
         2. Chemical dosages and application points\n\
         3. Operational setpoints and control parameters\n\
         4. Monitoring points and sampling frequency\n\
         5. Estimated energy and chemical usage\n\n\
         The configuration is the starting point for iterative optimization.",
        goals_block(goals)
    )
}

fn evaluate_prompt(candidate: &Candidate, goals: &OptimizationGoals) -> String {
    format!(
        "You are a water treatment process evaluation expert. Evaluate the configuration below \
         against the optimization goals.\n\n\
         {}\n\n\
         CURRENT PROCESS CONFIGURATION:\n{}\n\n\
         Assess expected water quality against the targets, resource efficiency (energy, chemicals, \
         labor), operational stability, and the areas that still need work. Be demanding: mark the \
         process \"optimized\" only if it meets or exceeds every goal with no significant weakness.\n\n\
         Record the result with the {} tool.",
        goals_block(goals),
        candidate,
        EvaluationVerdict::TOOL_NAME
    )
}

fn optimize_prompt(candidate: &Candidate, goals: &OptimizationGoals, verdict: &EvaluationVerdict) -> String {
    format!(
        "You are a water treatment process optimization engineer. Revise the configuration using \
         the evaluation feedback.\n\n\
         {}\n\n\
         CURRENT PROCESS CONFIGURATION:\n{}\n\n\
         EVALUATION RESULTS:\n\
         - Overall performance score: {}\n\
         - Water quality assessment: {}\n\
         - Efficiency assessment: {}\n\
         - Improvement recommendations: {}\n\n\
         Address the recommendations with targeted changes rather than a redesign. Fix the weakest \
         aspects first and keep what already works. Reply with the full revised configuration.",
        goals_block(goals),
        candidate,
        verdict.score(),
        verdict.assessments().water_quality,
        verdict.assessments().efficiency,
        verdict.recommendations()
    )
}

fn report_prompt(outcome: &RunOutcome, goals: &OptimizationGoals) -> String {
    let state = &outcome.state;
    let initial = state
        .history()
        .first()
        .map_or_else(|| state.candidate(), |entry| &entry.candidate);

    let evaluation = state.latest_evaluation().map_or_else(
        || "No evaluation completed.".to_string(),
        |verdict| {
            format!(
                "- Overall performance score: {}\n\
                 - Water quality assessment: {}\n\
                 - Efficiency assessment: {}\n\
                 - Optimization status: {}",
                verdict.score(),
                verdict.assessments().water_quality,
                verdict.assessments().efficiency,
                verdict.status()
            )
        },
    );

    format!(
        "You are a water treatment process engineer writing the final report of an optimization \
         effort for utility management.\n\n\
         {}\n\n\
         INITIAL CONFIGURATION:\n{}\n\n\
         REVISIONS: {} (stopped: {})\n\n\
         FINAL CONFIGURATION:\n{}\n\n\
         FINAL EVALUATION:\n{}\n\n\
         Include an executive summary, the key improvements made, final performance against the \
         goals, implementation recommendations, expected operational benefits, and long-term \
         monitoring suggestions.",
        goals_block(goals),
        initial,
        state.iteration_count(),
        outcome.termination.as_str(),
        state.candidate(),
        evaluation
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Termination;
    use crate::state::OptimizationState;
    use crate::verdict::{Assessments, OptimizationStatus, Score};
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn goals() -> OptimizationGoals {
        OptimizationGoals::new()
            .with_parameter("source_water_turbidity", "12-18 NTU")
            .with_target("finished_water_turbidity", "<0.1 NTU")
    }

    fn backend(server: &MockServer) -> ClaudeBackend {
        let client = AnthropicClient::new("test-key".to_string()).with_api_url(server.uri());
        ClaudeBackend::new(client, LlmConfig::default()).with_retry_policy(
            RetryPolicy::builder()
                .max_retries(2)
                .initial_delay(Duration::from_millis(1))
                .max_delay(Duration::from_millis(5))
                .build(),
        )
    }

    fn response(content: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "id": "msg_1",
            "model": "claude-test",
            "role": "assistant",
            "content": content,
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 1, "output_tokens": 1}
        }))
    }

    #[allow(clippy::unwrap_used)] // Test code
    fn verdict() -> EvaluationVerdict {
        EvaluationVerdict::new(
            Score::new(6).unwrap(),
            OptimizationStatus::NeedsImprovement,
            Assessments {
                water_quality: "Turbidity spikes in spring".to_string(),
                efficiency: "Alum dose high".to_string(),
            },
            "Add polymer aid",
        )
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code
    async fn test_evaluator_parses_forced_tool_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(body_partial_json(json!({
                "tool_choice": {"type": "tool", "name": "record_process_evaluation"}
            })))
            .respond_with(response(json!([{
                "type": "tool_use",
                "id": "toolu_1",
                "name": "record_process_evaluation",
                "input": {
                    "performance_score": 8,
                    "water_quality_assessment": "Meets turbidity goal",
                    "efficiency_assessment": "Coagulant reduced",
                    "optimization_status": "optimized",
                    "improvement_recommendations": "None"
                }
            }])))
            .expect(1)
            .mount(&server)
            .await;

        let evaluator = ClaudeEvaluator::new(backend(&server));
        let verdict = evaluator.evaluate(&Candidate::new("config"), &goals()).await.unwrap();

        assert_eq!(verdict.score().get(), 8);
        assert!(verdict.is_optimized());
    }

    #[tokio::test]
    async fn test_evaluator_without_tool_call_is_schema_violation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(response(json!([{"type": "text", "text": "Looks fine"}])))
            .mount(&server)
            .await;

        let result = ClaudeEvaluator::new(backend(&server))
            .evaluate(&Candidate::new("config"), &goals())
            .await;
        assert!(matches!(result, Err(CollaboratorError::SchemaViolation(_))));
    }

    #[tokio::test]
    async fn test_evaluator_rejects_out_of_range_score() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(response(json!([{
                "type": "tool_use",
                "id": "toolu_1",
                "name": "record_process_evaluation",
                "input": {
                    "performance_score": 11,
                    "water_quality_assessment": "a",
                    "efficiency_assessment": "b",
                    "optimization_status": "optimized",
                    "improvement_recommendations": "c"
                }
            }])))
            .mount(&server)
            .await;

        let result = ClaudeEvaluator::new(backend(&server))
            .evaluate(&Candidate::new("config"), &goals())
            .await;
        assert!(matches!(result, Err(CollaboratorError::SchemaViolation(_))));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)] // Test code
    async fn test_optimizer_retries_transient_failures() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(529))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(response(json!([{"type": "text", "text": "Revised configuration"}])))
            .expect(1)
            .mount(&server)
            .await;

        let revised = ClaudeOptimizer::new(backend(&server))
            .optimize(&Candidate::new("config"), &goals(), &verdict())
            .await
            .unwrap();
        assert_eq!(revised.as_str(), "Revised configuration");
    }

    #[tokio::test]
    async fn test_slow_reply_times_out_at_configured_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                response(json!([{"type": "text", "text": "late draft"}])).set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = AnthropicClient::new("test-key".to_string()).with_api_url(server.uri());
        let llm = LlmConfig {
            timeout_secs: 1,
            ..LlmConfig::default()
        };
        let backend = ClaudeBackend::new(client, llm).with_retry_policy(RetryPolicy::no_retries());

        let started = std::time::Instant::now();
        let result = ClaudeDrafter::new(backend).draft(&goals()).await;

        assert!(matches!(result, Err(CollaboratorError::Timeout(limit)) if limit == Duration::from_secs(1)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_unauthorized_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let result = ClaudeDrafter::new(backend(&server)).draft(&goals()).await;
        assert!(matches!(result, Err(CollaboratorError::Upstream(msg)) if msg.contains("Unauthorized")));
    }

    #[tokio::test]
    async fn test_empty_revision_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(response(json!([{"type": "text", "text": "   "}])))
            .mount(&server)
            .await;

        let result = ClaudeOptimizer::new(backend(&server))
            .optimize(&Candidate::new("config"), &goals(), &verdict())
            .await;
        assert!(matches!(result, Err(CollaboratorError::SchemaViolation(_))));
    }

    #[test]
    fn test_optimize_prompt_carries_full_verdict() {
        let prompt = optimize_prompt(&Candidate::new("CURRENT"), &goals(), &verdict());

        assert!(prompt.contains("CURRENT"));
        assert!(prompt.contains("6/10"));
        assert!(prompt.contains("Turbidity spikes in spring"));
        assert!(prompt.contains("Alum dose high"));
        assert!(prompt.contains("Add polymer aid"));
        assert!(prompt.contains("- source_water_turbidity: 12-18 NTU"));
    }

    #[test]
    #[allow(clippy::unwrap_used)] // Test code
    fn test_report_prompt_uses_first_history_entry_as_initial() {
        let state = OptimizationState::initialize("baseline", 3)
            .unwrap()
            .record_evaluation(verdict())
            .apply_revision(Candidate::new("first revision"))
            .record_evaluation(verdict());
        let outcome = RunOutcome {
            state,
            termination: Termination::BudgetExhausted,
        };

        let prompt = report_prompt(&outcome, &goals());
        assert!(prompt.contains("INITIAL CONFIGURATION:\nfirst revision"));
        assert!(prompt.contains("REVISIONS: 1 (stopped: budget_exhausted)"));
    }

    #[test]
    #[allow(clippy::unwrap_used)] // Test code
    fn test_report_prompt_without_history_or_evaluation() {
        let outcome = RunOutcome {
            state: OptimizationState::initialize("baseline", 3).unwrap(),
            termination: Termination::Cancelled,
        };

        let prompt = report_prompt(&outcome, &goals());
        assert!(prompt.contains("INITIAL CONFIGURATION:\nbaseline"));
        assert!(prompt.contains("No evaluation completed."));
    }
}
