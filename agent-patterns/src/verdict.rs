//! Structured evaluation verdicts
//!
//! A verdict is validated once, where it enters the system. After that the
//! loop relies on it being well-formed: the score is in range and the status
//! is one of the two known values.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Evaluator output that does not match the verdict schema
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("evaluation does not match schema: {0}")]
pub struct SchemaViolation(pub String);

/// Performance score in `1..=10`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Score(u8);

impl Score {
    /// Lowest valid score
    pub const MIN: u8 = 1;
    /// Highest valid score
    pub const MAX: u8 = 10;

    /// Validate a raw score
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` if `value` is outside `1..=10`
    pub fn new(value: i64) -> Result<Self, SchemaViolation> {
        u8::try_from(value)
            .ok()
            .filter(|v| (Self::MIN..=Self::MAX).contains(v))
            .map(Self)
            .ok_or_else(|| {
                SchemaViolation(format!(
                    "performance_score {value} outside {}..={}",
                    Self::MIN,
                    Self::MAX
                ))
            })
    }

    /// Raw score value
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Score {
    type Error = SchemaViolation;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Score> for u8 {
    fn from(score: Score) -> Self {
        score.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/10", self.0)
    }
}

/// Whether the evaluator considers the configuration done
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationStatus {
    /// Goals met; the loop stops
    Optimized,
    /// Further revision requested
    NeedsImprovement,
}

impl fmt::Display for OptimizationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Optimized => write!(f, "optimized"),
            Self::NeedsImprovement => write!(f, "needs_improvement"),
        }
    }
}

/// Free-text assessments; opaque to the controller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessments {
    /// Assessment of treated water quality
    pub water_quality: String,
    /// Assessment of energy/chemical efficiency
    pub efficiency: String,
}

/// A validated evaluation of one candidate configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    score: Score,
    status: OptimizationStatus,
    assessments: Assessments,
    recommendations: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawVerdict {
    performance_score: i64,
    water_quality_assessment: String,
    efficiency_assessment: String,
    optimization_status: OptimizationStatus,
    improvement_recommendations: String,
}

impl EvaluationVerdict {
    /// Name of the tool an LLM evaluator is forced to call
    pub const TOOL_NAME: &'static str = "record_process_evaluation";

    /// Assemble a verdict from already-validated parts
    #[must_use]
    pub fn new(
        score: Score,
        status: OptimizationStatus,
        assessments: Assessments,
        recommendations: impl Into<String>,
    ) -> Self {
        Self {
            score,
            status,
            assessments,
            recommendations: recommendations.into(),
        }
    }

    /// Parse and validate the arguments of a `record_process_evaluation` call
    ///
    /// # Errors
    ///
    /// Returns `SchemaViolation` for missing or extra fields, wrong types, an
    /// unknown status, or an out-of-range score
    pub fn from_tool_input(input: &serde_json::Value) -> Result<Self, SchemaViolation> {
        let raw = RawVerdict::deserialize(input).map_err(|e| SchemaViolation(e.to_string()))?;
        let score = Score::new(raw.performance_score)?;

        Ok(Self::new(
            score,
            raw.optimization_status,
            Assessments {
                water_quality: raw.water_quality_assessment,
                efficiency: raw.efficiency_assessment,
            },
            raw.improvement_recommendations,
        ))
    }

    /// JSON schema of the tool input accepted by [`Self::from_tool_input`]
    #[must_use]
    pub fn json_schema() -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "performance_score": {
                    "type": "integer",
                    "minimum": Score::MIN,
                    "maximum": Score::MAX,
                    "description": "Overall process performance from 1 (poor) to 10 (excellent)"
                },
                "water_quality_assessment": {
                    "type": "string",
                    "description": "Expected treated water quality against the targets"
                },
                "efficiency_assessment": {
                    "type": "string",
                    "description": "Energy and chemical efficiency of the configuration"
                },
                "optimization_status": {
                    "type": "string",
                    "enum": ["optimized", "needs_improvement"],
                    "description": "optimized only when every target is met"
                },
                "improvement_recommendations": {
                    "type": "string",
                    "description": "Concrete changes to make in the next revision"
                }
            },
            "required": [
                "performance_score",
                "water_quality_assessment",
                "efficiency_assessment",
                "optimization_status",
                "improvement_recommendations"
            ]
        })
    }

    /// Performance score
    #[must_use]
    pub const fn score(&self) -> Score {
        self.score
    }

    /// Optimization status
    #[must_use]
    pub const fn status(&self) -> OptimizationStatus {
        self.status
    }

    /// Free-text assessments
    #[must_use]
    pub const fn assessments(&self) -> &Assessments {
        &self.assessments
    }

    /// Recommendations for the optimizer
    #[must_use]
    pub fn recommendations(&self) -> &str {
        &self.recommendations
    }

    /// Whether the verdict signals the goals are met
    #[must_use]
    pub const fn is_optimized(&self) -> bool {
        matches!(self.status, OptimizationStatus::Optimized)
    }
}
