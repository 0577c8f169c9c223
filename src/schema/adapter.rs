//! Parsing and batch validation of session.event.v1 recordings

use serde::Serialize;

use crate::error::ComputeError;
use crate::schema::session_event::*;

/// Reads session events from JSON arrays or NDJSON
pub struct SessionEventAdapter;

impl SessionEventAdapter {
    /// Parse a JSON string containing an array of SessionEvents
    pub fn parse_array(json: &str) -> Result<Vec<SessionEvent>, ComputeError> {
        let events: Vec<SessionEvent> = serde_json::from_str(json)?;
        Ok(events)
    }

    /// Parse NDJSON (newline-delimited JSON) containing SessionEvents
    pub fn parse_ndjson(ndjson: &str) -> Result<Vec<SessionEvent>, ComputeError> {
        let mut events = Vec::new();
        for (line_num, line) in ndjson.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let event = serde_json::from_str::<SessionEvent>(trimmed).map_err(|e| {
                ComputeError::ParseError(format!("Failed to parse line {}: {}", line_num + 1, e))
            })?;
            events.push(event);
        }
        Ok(events)
    }

    /// Validate a batch of events, returning only the failures
    pub fn validate_events(events: &[SessionEvent]) -> Vec<ValidationResult> {
        events
            .iter()
            .enumerate()
            .filter_map(|(index, event)| {
                event.validate().err().map(|error| ValidationResult {
                    index,
                    event_id: event.event_id.clone(),
                    event_type: event.payload.type_name(),
                    error,
                })
            })
            .collect()
    }
}

/// One failed event
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub index: usize,
    pub event_id: Option<String>,
    pub event_type: &'static str,
    #[serde(serialize_with = "serialize_error")]
    pub error: ValidationError,
}

fn serialize_error<S: serde::Serializer>(error: &ValidationError, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(error)
}
