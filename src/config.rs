//! Session configuration
//!
//! Every section falls back to its defaults, so a config file only needs the
//! values it changes.

use serde::{Deserialize, Serialize};

use crate::aggregator::AggregationWeights;
use crate::canonical::PostureTolerances;
use crate::capture::CaptureConfig;
use crate::engagement::EngagementConfig;
use crate::error::ComputeError;
use crate::geometry::GeometryConfig;
use crate::stabilizer::StabilizerConfig;

/// Environment variable the CLI reads a config path from
pub const CONFIG_ENV_VAR: &str = "RAPPORT_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub capture: CaptureConfig,
    pub stabilizer: StabilizerConfig,
    pub weights: AggregationWeights,
    pub engagement: EngagementConfig,
    pub geometry: GeometryConfig,
    pub posture: PostureTolerances,
}

impl PipelineConfig {
    /// Parse and validate
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(self).map_err(|e| ComputeError::EncodingError(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        self.capture.validate()?;
        self.stabilizer.validate()?;
        self.weights.validate()?;
        self.engagement.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_object_is_default() {
        assert_eq!(PipelineConfig::from_json("{}").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config = PipelineConfig::from_json(
            r#"{"stabilizer": {"hold_duration_ms": 5000}, "engagement": {"base_score": 40}}"#,
        )
        .unwrap();
        assert_eq!(config.stabilizer.hold_duration_ms, 5_000);
        assert_eq!(config.stabilizer.zero_warning_threshold, 4);
        assert_eq!(config.engagement.base_score, 40.0);
        assert_eq!(config.engagement.expression.threshold, 75.0);
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let err = PipelineConfig::from_json(
            r#"{"weights": {"visual": 0.9, "auditory": 0.38, "conversational": 0.07}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ComputeError::InvalidConfig(_)));
    }

    #[test]
    fn test_round_trip() {
        let config = PipelineConfig::default();
        let json = config.to_json().unwrap();
        assert_eq!(PipelineConfig::from_json(&json).unwrap(), config);
    }
}
