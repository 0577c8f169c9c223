//! Score payload encoding
//!
//! Wraps a session snapshot with producer metadata and quality flags for the
//! presentation layer or for persistence.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::calibration::CalibrationSource;
use crate::error::ComputeError;
use crate::pipeline::SessionSnapshot;
use crate::{PRODUCER_NAME, RAPPORT_VERSION};

/// Current score payload schema version
pub const PAYLOAD_SCHEMA_VERSION: &str = "rapport.score.v1";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadProducer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// Conditions a consumer should know about before trusting the scores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayloadQuality {
    pub degraded: bool,
    pub using_held_scores: bool,
    pub collecting: bool,
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorePayload {
    pub schema_version: String,
    pub producer: PayloadProducer,
    pub observed_at_utc: String,
    pub computed_at_utc: String,
    pub quality: PayloadQuality,
    pub snapshot: SessionSnapshot,
}

/// Encoder for score payloads
pub struct SnapshotEncoder {
    instance_id: String,
}

impl Default for SnapshotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn encode(&self, snapshot: &SessionSnapshot) -> ScorePayload {
        ScorePayload {
            schema_version: PAYLOAD_SCHEMA_VERSION.to_string(),
            producer: PayloadProducer {
                name: PRODUCER_NAME.to_string(),
                version: RAPPORT_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            observed_at_utc: snapshot.at.to_rfc3339(),
            computed_at_utc: Utc::now().to_rfc3339(),
            quality: Self::build_quality(snapshot),
            snapshot: snapshot.clone(),
        }
    }

    /// Encode to pretty-printed JSON
    pub fn encode_to_json(&self, snapshot: &SessionSnapshot) -> Result<String, ComputeError> {
        serde_json::to_string_pretty(&self.encode(snapshot)).map_err(ComputeError::JsonError)
    }

    fn build_quality(snapshot: &SessionSnapshot) -> PayloadQuality {
        let degraded = snapshot.scores.as_ref().is_some_and(|s| s.degraded);
        let using_held_scores = snapshot.scores.as_ref().is_some_and(|s| s.using_held_scores);
        let collecting = snapshot.aggregate.state.composite().is_none();

        let mut flags = Vec::new();
        if snapshot.scores.is_none() {
            flags.push("no_frames");
        }
        if degraded {
            flags.push("degraded_signal");
        }
        if using_held_scores {
            flags.push("held_scores");
        }
        if collecting {
            flags.push("collecting");
        }
        if snapshot.calibration_source == CalibrationSource::Fallback {
            flags.push("calibration_fallback");
        }
        if snapshot.cooling_down {
            flags.push("capture_cooldown");
        }

        PayloadQuality {
            degraded,
            using_held_scores,
            collecting,
            flags: flags.into_iter().map(String::from).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SessionPipeline;
    use chrono::{DateTime, TimeZone};
    use pretty_assertions::assert_eq;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_encode_fresh_session() {
        let pipeline = SessionPipeline::new();
        let encoder = SnapshotEncoder::with_instance_id("test-instance".to_string());
        let payload = encoder.encode(&pipeline.snapshot(t(0)));

        assert_eq!(payload.schema_version, PAYLOAD_SCHEMA_VERSION);
        assert_eq!(payload.producer.name, "rapport-flux");
        assert_eq!(payload.producer.instance_id, "test-instance");
        assert_eq!(payload.observed_at_utc, t(0).to_rfc3339());
        assert_eq!(payload.quality.flags, vec!["no_frames", "collecting"]);
    }

    #[test]
    fn test_quality_flags_follow_state() {
        let mut pipeline = SessionPipeline::new();
        pipeline.process_result_json(r#"{"scores": {"A": 80, "S": 80, "R": 80}, "posture": 80}"#, t(0))
            .unwrap();
        for i in 1..=4 {
            pipeline.process_frame(None, t(i * 100));
        }
        pipeline.on_transport_error(500, t(500));

        let payload = SnapshotEncoder::new().encode(&pipeline.snapshot(t(600)));
        assert!(payload.quality.degraded);
        assert!(payload.quality.using_held_scores);
        assert_eq!(
            payload.quality.flags,
            vec!["degraded_signal", "held_scores", "collecting", "capture_cooldown"]
        );
    }

    #[test]
    fn test_encode_to_json() {
        let pipeline = SessionPipeline::new();
        let json = SnapshotEncoder::new().encode_to_json(&pipeline.snapshot(t(0))).unwrap();
        assert!(json.contains("rapport.score.v1"));
        assert!(json.contains("\"initiative\""));
        let parsed: ScorePayload = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.snapshot.frames_processed, 0);
    }
}
