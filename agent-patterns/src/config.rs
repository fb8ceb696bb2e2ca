//! Configuration Management for the optimization loop
//!
//! Provides environment-based configuration with layered overrides and
//! validation.
//!
//! # Precedence (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Profile defaults for the deployment [`Environment`] (`CONFIG_ENV`)
//! 3. An optional TOML file (any subset of sections/keys)
//! 4. Environment variable overrides (`HYDRO_MODEL`, `HYDRO_MAX_ITERATIONS`,
//!    `HYDRO_LOG_LEVEL`)
//!
//! # Example
//!
//! ```no_run
//! use hydro_agents_patterns::config::OptimizerConfig;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = OptimizerConfig::load_layered(Some(Path::new("hydro.toml")))?;
//!
//! println!("LLM Model: {}", config.llm.model);
//! println!("Max iterations: {}", config.optimization.max_iterations);
//! # Ok(())
//! # }
//! ```

use hydro_agents_anthropic::DEFAULT_MODEL;
use hydro_agents_runtime::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration error
///
/// Also raised at run start for an invalid iteration budget or malformed goals.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// Invalid environment value
    #[error("Invalid environment: {0}")]
    InvalidEnvironment(String),
    /// Configuration validation failed
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
    /// Failed to read a configuration file
    #[error("Failed to read {path}: {message}")]
    ReadError {
        /// File that could not be read
        path: String,
        /// Underlying I/O error
        message: String,
    },
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Development environment (local)
    Development,
    /// Staging environment (pre-production)
    Staging,
    /// Production environment
    Production,
}

impl Environment {
    /// Parse an environment name
    ///
    /// # Errors
    ///
    /// Returns error if environment string is invalid
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Self::Development),
            "staging" | "stage" => Ok(Self::Staging),
            "prod" | "production" => Ok(Self::Production),
            _ => Err(ConfigError::InvalidEnvironment(s.to_string())),
        }
    }

    /// Check if this is production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Staging => write!(f, "staging"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// LLM configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// LLM model to use
    pub model: String,
    /// Maximum tokens per request
    pub max_tokens: u32,
    /// Temperature for generation (0.0-1.0)
    pub temperature: f32,
    /// Per-request HTTP timeout in seconds
    pub timeout_secs: u64,
    /// Maximum retries for transient failures
    pub max_retries: u32,
}

impl LlmConfig {
    /// Validate LLM configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.trim().is_empty() {
            return Err(ConfigError::ValidationError("model cannot be empty".to_string()));
        }
        if self.max_tokens == 0 {
            return Err(ConfigError::ValidationError("max_tokens must be > 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(ConfigError::ValidationError(
                "temperature must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::ValidationError("timeout_secs must be > 0".to_string()));
        }
        Ok(())
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Retry policy for transient upstream failures
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::builder().max_retries(self.max_retries).build()
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            timeout_secs: 120,
            max_retries: 3,
        }
    }
}

/// Optimization loop configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Revision budget for one run (must be >= 1)
    pub max_iterations: u32,
    /// Upper bound on a single evaluator or optimizer call, in seconds
    pub collaborator_timeout_secs: u64,
}

impl LoopConfig {
    /// Validate loop configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::ValidationError(
                "max_iterations must be >= 1".to_string(),
            ));
        }
        if self.collaborator_timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "collaborator_timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get collaborator timeout as Duration
    #[must_use]
    pub const fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            collaborator_timeout_secs: 600,
        }
    }
}

/// Observability configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl ObservabilityConfig {
    /// Validate observability configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "invalid log_level: {}. Must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }
        Ok(())
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Complete configuration for an optimization deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    /// Deployment environment
    pub environment: Environment,
    /// LLM configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// Loop configuration
    #[serde(default)]
    pub optimization: LoopConfig,
    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl OptimizerConfig {
    /// Profile defaults for a specific environment
    #[must_use]
    pub fn profile(environment: Environment) -> Self {
        let mut config = Self {
            environment,
            ..Self::default()
        };

        match environment {
            Environment::Development => {
                config.observability.log_level = "debug".to_string();
                config.llm.max_retries = 1;
            }
            Environment::Staging => {
                config.observability.log_level = "info".to_string();
                config.llm.max_retries = 3;
            }
            Environment::Production => {
                config.observability.log_level = "warn".to_string();
                config.llm.max_retries = 5;
            }
        }

        config
    }

    /// Load profile defaults for `environment` and validate them
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn load(environment: Environment) -> Result<Self, ConfigError> {
        let config = Self::profile(environment);
        config.validate()?;
        Ok(config)
    }

    /// Load every layer: profile from `CONFIG_ENV`, optional TOML file,
    /// then `HYDRO_*` environment overrides
    ///
    /// A file that names an `environment` switches to that profile before
    /// its own keys are applied.
    ///
    /// # Errors
    ///
    /// Returns error if any layer cannot be read or parsed, or if the merged
    /// configuration is invalid
    pub fn load_layered(file: Option<&Path>) -> Result<Self, ConfigError> {
        let environment = match std::env::var("CONFIG_ENV") {
            Ok(value) => Environment::parse(&value)?,
            Err(_) => Environment::Development,
        };

        let mut config = Self::profile(environment);

        if let Some(path) = file {
            let text = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            config = config.merge_toml(&text)?;
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        tracing::debug!(environment = %config.environment, "Configuration loaded");
        Ok(config)
    }

    /// Parse a full configuration from TOML, filling unspecified keys from
    /// the built-in defaults
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed or the result is invalid
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config = Self::default().merge_toml(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay the keys present in `text` onto this configuration
    ///
    /// An `environment` key naming a different environment first switches to
    /// that environment's profile, replacing the values on `self`; the other
    /// keys are then applied on top of it.
    ///
    /// # Errors
    ///
    /// Returns error if the TOML is malformed, names an unknown environment,
    /// or has wrongly typed values
    pub fn merge_toml(self, text: &str) -> Result<Self, ConfigError> {
        let mut overlay: toml::Value =
            toml::from_str(text).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        let named = match overlay.as_table_mut().and_then(|table| table.remove("environment")) {
            Some(toml::Value::String(name)) => Some(Environment::parse(&name)?),
            Some(other) => {
                return Err(ConfigError::ParseError(format!(
                    "environment must be a string, got {other}"
                )));
            }
            None => None,
        };

        let start = match named {
            Some(environment) if environment != self.environment => {
                tracing::debug!(%environment, "Configuration file selects profile");
                Self::profile(environment)
            }
            _ => self,
        };

        let mut base =
            toml::Value::try_from(&start).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        merge_values(&mut base, overlay);

        base.try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(e.to_string()))
    }

    /// Apply `HYDRO_*` overrides using `lookup` to read variables
    ///
    /// # Errors
    ///
    /// Returns error if an override has an unparseable value
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("HYDRO_MODEL") {
            self.llm.model = model;
        }
        if let Some(raw) = lookup("HYDRO_MAX_ITERATIONS") {
            self.optimization.max_iterations = raw.trim().parse().map_err(|_| {
                ConfigError::ParseError(format!("HYDRO_MAX_ITERATIONS is not a number: {raw}"))
            })?;
        }
        if let Some(level) = lookup("HYDRO_LOG_LEVEL") {
            self.observability.log_level = level;
        }
        Ok(())
    }

    /// Validate entire configuration
    ///
    /// # Errors
    ///
    /// Returns error if any configuration section is invalid
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.llm.validate()?;
        self.optimization.validate()?;
        self.observability.validate()?;
        Ok(())
    }

    /// Check if running in production
    #[must_use]
    pub const fn is_production(&self) -> bool {
        self.environment.is_production()
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            llm: LlmConfig::default(),
            optimization: LoopConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, value) in overlay_table {
                match base_table.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base_table.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}
