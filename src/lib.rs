//! Rapport Flux - real-time conversational coaching scores
//!
//! Rapport turns face landmarks, upstream analysis results and a chat
//! transcript into stable, normalized scores: attention, gaze stability, blink,
//! posture and expression per frame, plus conversational initiative, an
//! engagement (affinity) score and a weighted composite.
//!
//! ## Modules
//!
//! - **Geometry**: landmark frame to raw metrics (EAR, smile, neck, shoulders, gaze)
//! - **Canonical / Stabilizer**: any result shape to a held, bounded score vector
//! - **Aggregator / Initiative / Engagement**: session-level scores
//! - **Capture**: adaptive capture quality under transport failures
//! - **Pipeline**: `SessionPipeline`, which wires everything for one session

pub mod aggregator;
pub mod calibration;
pub mod canonical;
pub mod capture;
pub mod config;
pub mod encoder;
pub mod engagement;
pub mod error;
pub mod geometry;
pub mod initiative;
pub mod pipeline;
pub mod schema;
pub mod stabilizer;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use calibration::{Calibration, CalibrationStore};
pub use canonical::{Canonicalizer, UpstreamResult};
pub use config::PipelineConfig;
pub use encoder::SnapshotEncoder;
pub use error::ComputeError;
pub use pipeline::{SessionPipeline, SessionSnapshot};
pub use types::{CanonicalScoreVector, LandmarkFrame, StabilizedScoreVector};

// Schema exports
pub use schema::{SessionEvent, SessionEventAdapter, SCHEMA_VERSION};

/// Library version embedded in all score payloads
pub const RAPPORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for score payloads
pub const PRODUCER_NAME: &str = "rapport-flux";
