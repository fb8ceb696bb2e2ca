//! Treatment goals shared by every collaborator call in a run

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Fixed optimization goals for one run
///
/// `parameters` names the treatment parameters the candidate may tune (with a
/// description of each) and `targets` names what the run optimizes for.
/// Both maps keep their keys sorted so prompts render deterministically.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizationGoals {
    /// Treatment parameter → description
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Optimization target → description
    #[serde(default)]
    pub targets: BTreeMap<String, String>,
}

impl OptimizationGoals {
    /// Create empty goals
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: Add a treatment parameter
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), description.into());
        self
    }

    /// Builder: Add an optimization target
    #[must_use]
    pub fn with_target(mut self, name: impl Into<String>, description: impl Into<String>) -> Self {
        self.targets.insert(name.into(), description.into());
        self
    }

    /// Parse goals from TOML with `[parameters]` and `[targets]` tables
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ParseError` for malformed TOML and
    /// `ConfigError::ValidationError` for goals that fail [`Self::validate`]
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let goals: Self = toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        goals.validate()?;
        Ok(goals)
    }

    /// Reject goals with no targets or with blank names/descriptions
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` describing the first problem found
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::ValidationError(
                "goals must name at least one target".to_string(),
            ));
        }

        for (section, map) in [("parameters", &self.parameters), ("targets", &self.targets)] {
            for (key, value) in map {
                if key.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "{section} contains a blank name"
                    )));
                }
                if value.trim().is_empty() {
                    return Err(ConfigError::ValidationError(format!(
                        "{section}.{key} has a blank description"
                    )));
                }
            }
        }

        Ok(())
    }

    /// Parameters as `- name: description` lines
    #[must_use]
    pub fn render_parameters(&self) -> String {
        render(&self.parameters)
    }

    /// Targets as `- name: description` lines
    #[must_use]
    pub fn render_targets(&self) -> String {
        render(&self.targets)
    }
}

fn render(map: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    for (key, value) in map {
        if !out.is_empty() {
            out.push('\n');
        }
        let _ = write!(out, "- {key}: {value}");
    }
    out
}
