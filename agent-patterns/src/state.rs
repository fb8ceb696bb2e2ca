//! Optimization state threaded through one run
//!
//! Every update consumes the current state and returns the next one. History
//! is append-only and holds one entry per revision.

use crate::config::ConfigError;
use crate::verdict::EvaluationVerdict;
use serde::{Deserialize, Serialize};
use std::fmt;

const DEBUG_PREVIEW_CHARS: usize = 60;

/// Opaque text of a treatment process configuration
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Candidate(String);

impl Candidate {
    /// Wrap configuration text
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Configuration text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Take the configuration text
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for Candidate {
    fn from(text: String) -> Self {
        Self(text)
    }
}

impl From<&str> for Candidate {
    fn from(text: &str) -> Self {
        Self(text.to_string())
    }
}

impl AsRef<str> for Candidate {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// Configurations run to pages of text; keep span fields readable.
impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chars = self.0.chars().count();
        if chars <= DEBUG_PREVIEW_CHARS {
            write!(f, "Candidate({:?})", self.0)
        } else {
            let preview: String = self.0.chars().take(DEBUG_PREVIEW_CHARS).collect();
            write!(f, "Candidate({preview:?}… {chars} chars)")
        }
    }
}

/// One revision step recorded in history
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Revision number the candidate was produced at (starts at 1)
    pub iteration: u32,
    /// Candidate produced by that revision
    pub candidate: Candidate,
    /// Verdict that was latest when the entry was appended
    pub evaluation: EvaluationVerdict,
}

/// State of one optimization run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationState {
    candidate: Candidate,
    iteration_count: u32,
    max_iterations: u32,
    latest_evaluation: Option<EvaluationVerdict>,
    history: Vec<HistoryEntry>,
}

impl OptimizationState {
    /// Fresh state for a run
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `max_iterations` is 0
    pub fn initialize(candidate: impl Into<Candidate>, max_iterations: u32) -> Result<Self, ConfigError> {
        if max_iterations < 1 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be >= 1".to_string(),
            ));
        }

        Ok(Self {
            candidate: candidate.into(),
            iteration_count: 0,
            max_iterations,
            latest_evaluation: None,
            history: Vec::new(),
        })
    }

    /// Record a new verdict for the current candidate
    ///
    /// After at least one revision, the current candidate is appended to
    /// history together with the verdict that was latest *before* this call.
    /// `latest_evaluation` is then replaced by `verdict`.
    #[must_use]
    pub fn record_evaluation(mut self, verdict: EvaluationVerdict) -> Self {
        if self.iteration_count > 0 {
            if let Some(previous) = self.latest_evaluation.take() {
                self.history.push(HistoryEntry {
                    iteration: self.iteration_count,
                    candidate: self.candidate.clone(),
                    evaluation: previous,
                });
            }
        }
        self.latest_evaluation = Some(verdict);
        self
    }

    /// Replace the candidate with a revision and count it
    ///
    /// The current candidate must have been evaluated since the last
    /// revision; otherwise the next [`record_evaluation`](Self::record_evaluation)
    /// has no verdict to pair with it and history falls behind the revision
    /// count.
    ///
    /// # Panics
    ///
    /// Debug builds panic when the current candidate has not been evaluated.
    #[must_use]
    pub fn apply_revision(mut self, candidate: Candidate) -> Self {
        debug_assert!(
            self.latest_evaluation.is_some()
                && usize::try_from(self.iteration_count).is_ok_and(|count| count == self.history.len()),
            "revision applied before the current candidate was evaluated"
        );
        self.candidate = candidate;
        self.iteration_count += 1;
        self
    }

    /// Current candidate
    #[must_use]
    pub const fn candidate(&self) -> &Candidate {
        &self.candidate
    }

    /// Number of revisions applied so far
    #[must_use]
    pub const fn iteration_count(&self) -> u32 {
        self.iteration_count
    }

    /// Revision budget
    #[must_use]
    pub const fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// Most recent verdict, if any evaluation completed
    #[must_use]
    pub const fn latest_evaluation(&self) -> Option<&EvaluationVerdict> {
        self.latest_evaluation.as_ref()
    }

    /// Revision history, oldest first
    #[must_use]
    pub fn history(&self) -> &[HistoryEntry] {
        &self.history
    }
}
