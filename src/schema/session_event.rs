//! session.event.v1 schema definition
//!
//! One event per line of a session recording. Every input the pipeline accepts
//! has a payload variant:
//! - Landmark frames (or their absence)
//! - Upstream analysis results and transport outcomes
//! - Transcript turns and auditory sub-scores
//! - Personal calibration records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calibration::CalibrationRecord;
use crate::initiative::{Role, Turn};
use crate::types::{Landmark, FACE_MESH_POINTS};

/// Current schema version
pub const SCHEMA_VERSION: &str = "session.event.v1";

fn default_true() -> bool {
    true
}

/// Event payload, tagged by `type`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    /// One landmark frame; no points or `face_detected: false` is signal loss
    Landmarks {
        #[serde(default)]
        points: Vec<Landmark>,
        #[serde(default = "default_true")]
        face_detected: bool,
    },
    /// Upstream analysis result of any shape
    Result { result: serde_json::Value },
    /// Upstream request failed with an HTTP-like status
    TransportError { status: u16 },
    TransportSuccess,
    Turn { role: Role, text: String },
    /// Auditory sub-scores (0-100)
    Auditory {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tone: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        concentration: Option<f64>,
    },
    Calibration { record: CalibrationRecord },
}

impl EventPayload {
    pub fn type_name(&self) -> &'static str {
        match self {
            EventPayload::Landmarks { .. } => "landmarks",
            EventPayload::Result { .. } => "result",
            EventPayload::TransportError { .. } => "transport_error",
            EventPayload::TransportSuccess => "transport_success",
            EventPayload::Turn { .. } => "turn",
            EventPayload::Auditory { .. } => "auditory",
            EventPayload::Calibration { .. } => "calibration",
        }
    }
}

/// The session.event.v1 envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    /// Schema version identifier
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Event timestamp (UTC); drives every time-based component
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

impl SessionEvent {
    pub fn new(timestamp: DateTime<Utc>, payload: EventPayload) -> Self {
        SessionEvent {
            schema_version: SCHEMA_VERSION.to_string(),
            event_id: Some(uuid::Uuid::new_v4().to_string()),
            timestamp,
            payload,
        }
    }

    pub fn landmarks(timestamp: DateTime<Utc>, points: Vec<Landmark>) -> Self {
        Self::new(
            timestamp,
            EventPayload::Landmarks {
                points,
                face_detected: true,
            },
        )
    }

    pub fn turn(timestamp: DateTime<Utc>, turn: Turn) -> Self {
        Self::new(
            timestamp,
            EventPayload::Turn {
                role: turn.role,
                text: turn.text,
            },
        )
    }

    pub fn with_event_id(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Validate the event schema
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.schema_version != SCHEMA_VERSION {
            return Err(ValidationError::InvalidSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }

        match &self.payload {
            EventPayload::Landmarks { points, .. } => {
                if !points.is_empty() && points.len() < FACE_MESH_POINTS {
                    return Err(ValidationError::LandmarkCount {
                        expected: FACE_MESH_POINTS,
                        actual: points.len(),
                    });
                }
                if let Some(index) = points
                    .iter()
                    .position(|p| !(p.x.is_finite() && p.y.is_finite() && p.z.is_finite()))
                {
                    return Err(ValidationError::NonFiniteLandmark { index });
                }
            }
            EventPayload::Result { result } => {
                if !result.is_object() {
                    return Err(ValidationError::ResultNotObject);
                }
            }
            EventPayload::TransportError { status } => {
                if !(100..=599).contains(status) {
                    return Err(ValidationError::InvalidStatus { status: *status });
                }
            }
            EventPayload::Auditory {
                tone,
                concentration,
            } => {
                if tone.is_none() && concentration.is_none() {
                    return Err(ValidationError::EmptyAuditory);
                }
                for (field, value) in [("tone", tone), ("concentration", concentration)] {
                    if let Some(v) = value {
                        if !(0.0..=100.0).contains(v) {
                            return Err(ValidationError::ScoreOutOfRange {
                                field: field.to_string(),
                                value: *v,
                            });
                        }
                    }
                }
            }
            EventPayload::TransportSuccess
            | EventPayload::Turn { .. }
            | EventPayload::Calibration { .. } => {}
        }
        Ok(())
    }
}

/// Validation errors for session events
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid schema version: expected {expected}, got {actual}")]
    InvalidSchemaVersion { expected: String, actual: String },

    #[error("Landmark frame has {actual} points, need at least {expected}")]
    LandmarkCount { expected: usize, actual: usize },

    #[error("Landmark {index} has a non-finite coordinate")]
    NonFiniteLandmark { index: usize },

    #[error("Result payload must be a JSON object")]
    ResultNotObject,

    #[error("Transport status {status} is not an HTTP status code")]
    InvalidStatus { status: u16 },

    #[error("Auditory event carries no scores")]
    EmptyAuditory,

    #[error("{field} score {value} is outside 0-100")]
    ScoreOutOfRange { field: String, value: f64 },
}
