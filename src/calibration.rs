//! Calibration management
//!
//! This module holds the per-user baseline constants the geometry analyzer scores
//! against. Exactly one calibration is active at a time: a validated personal
//! record, the built-in default, or the default standing in as a fallback after a
//! personal record was rejected.

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// Current calibration format version
pub const CALIBRATION_VERSION: u32 = 2;

/// Maximum number of missing required fields a personal record may have
pub const MAX_MISSING_REQUIRED: usize = 2;

/// Baseline constants used for scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    // Gaze center and bands
    pub center_h: f64,
    pub center_v: f64,
    pub center_ear: f64,
    pub band_center_half: f64,
    pub band_mid_half: f64,

    // Eye openness
    pub blink_ear_threshold: f64,
    pub blink_closed_threshold: f64,

    // Gaze movement
    pub saccade_threshold: f64,
    pub focus_drift_seconds: f64,

    // Neck
    pub neck_length_baseline: f64,
    pub neck_angle_baseline: f64,
    pub chin_forward_baseline: f64,
    pub neck_tilt_baseline: f64,

    // Upper body
    pub shoulder_width_baseline: f64,
    pub torso_height_baseline: f64,
    pub back_curve_baseline: f64,
    pub shoulder_blade_position: f64,

    pub quality_score: f64,
    pub version: u32,
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            center_h: 0.5,
            center_v: 0.53,
            center_ear: 0.22,
            band_center_half: 0.08,
            band_mid_half: 0.18,
            blink_ear_threshold: 0.19,
            blink_closed_threshold: 0.22,
            saccade_threshold: 0.045,
            focus_drift_seconds: 2.0,
            neck_length_baseline: 0.18,
            neck_angle_baseline: 12.0,
            chin_forward_baseline: 0.02,
            neck_tilt_baseline: 0.005,
            shoulder_width_baseline: 0.28,
            torso_height_baseline: 0.38,
            back_curve_baseline: 8.0,
            shoulder_blade_position: 4.0,
            quality_score: 0.85,
            version: CALIBRATION_VERSION,
        }
    }
}

impl Calibration {
    /// EAR thresholds as `(closed, blink)`, ordered so closed is the lower bound
    pub fn ear_thresholds(&self) -> (f64, f64) {
        let a = self.blink_ear_threshold;
        let b = self.blink_closed_threshold;
        (a.min(b), a.max(b))
    }
}

/// Where the active calibration came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    Personal,
    Default,
    /// Default constants in use because a personal record was rejected
    Fallback,
}

/// Partially-populated calibration as delivered by the session API
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    pub center_h: Option<f64>,
    pub center_v: Option<f64>,
    pub center_ear: Option<f64>,
    pub band_center_half: Option<f64>,
    pub band_mid_half: Option<f64>,
    pub blink_ear_threshold: Option<f64>,
    pub blink_closed_threshold: Option<f64>,
    pub saccade_threshold: Option<f64>,
    pub focus_drift_seconds: Option<f64>,
    pub neck_length_baseline: Option<f64>,
    pub neck_angle_baseline: Option<f64>,
    pub chin_forward_baseline: Option<f64>,
    pub neck_tilt_baseline: Option<f64>,
    pub shoulder_width_baseline: Option<f64>,
    pub torso_height_baseline: Option<f64>,
    pub back_curve_baseline: Option<f64>,
    pub shoulder_blade_position: Option<f64>,
    pub quality_score: Option<f64>,
    pub version: Option<u32>,
}

/// Outcome of resolving a calibration record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub missing_fields: Vec<String>,
    /// Share of required fields present (0-1)
    pub quality_score: f64,
    pub is_valid: bool,
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

impl CalibrationRecord {
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        serde_json::from_str(json).map_err(|e| ComputeError::InvalidCalibration(e.to_string()))
    }

    fn required(&self) -> [(&'static str, Option<f64>); 7] {
        [
            ("center_h", finite(self.center_h)),
            ("center_v", finite(self.center_v)),
            ("center_ear", finite(self.center_ear)),
            ("blink_ear_threshold", finite(self.blink_ear_threshold)),
            ("blink_closed_threshold", finite(self.blink_closed_threshold)),
            ("neck_length_baseline", finite(self.neck_length_baseline)),
            ("shoulder_width_baseline", finite(self.shoulder_width_baseline)),
        ]
    }

    /// Check which required fields are present
    pub fn validate(&self) -> CalibrationReport {
        let required = self.required();
        let missing_fields: Vec<String> = required
            .iter()
            .filter(|(_, v)| v.is_none())
            .map(|(name, _)| name.to_string())
            .collect();
        let total = required.len() as f64;
        CalibrationReport {
            quality_score: (total - missing_fields.len() as f64) / total,
            is_valid: missing_fields.len() <= MAX_MISSING_REQUIRED,
            missing_fields,
        }
    }

    /// Fill every absent or non-finite field from the defaults
    pub fn fill_missing(&self) -> Calibration {
        let d = Calibration::default();
        Calibration {
            center_h: finite(self.center_h).unwrap_or(d.center_h),
            center_v: finite(self.center_v).unwrap_or(d.center_v),
            center_ear: finite(self.center_ear).unwrap_or(d.center_ear),
            band_center_half: finite(self.band_center_half).unwrap_or(d.band_center_half),
            band_mid_half: finite(self.band_mid_half).unwrap_or(d.band_mid_half),
            blink_ear_threshold: finite(self.blink_ear_threshold).unwrap_or(d.blink_ear_threshold),
            blink_closed_threshold: finite(self.blink_closed_threshold)
                .unwrap_or(d.blink_closed_threshold),
            saccade_threshold: finite(self.saccade_threshold).unwrap_or(d.saccade_threshold),
            focus_drift_seconds: finite(self.focus_drift_seconds).unwrap_or(d.focus_drift_seconds),
            neck_length_baseline: finite(self.neck_length_baseline)
                .unwrap_or(d.neck_length_baseline),
            neck_angle_baseline: finite(self.neck_angle_baseline).unwrap_or(d.neck_angle_baseline),
            chin_forward_baseline: finite(self.chin_forward_baseline)
                .unwrap_or(d.chin_forward_baseline),
            neck_tilt_baseline: finite(self.neck_tilt_baseline).unwrap_or(d.neck_tilt_baseline),
            shoulder_width_baseline: finite(self.shoulder_width_baseline)
                .unwrap_or(d.shoulder_width_baseline),
            torso_height_baseline: finite(self.torso_height_baseline)
                .unwrap_or(d.torso_height_baseline),
            back_curve_baseline: finite(self.back_curve_baseline).unwrap_or(d.back_curve_baseline),
            shoulder_blade_position: finite(self.shoulder_blade_position)
                .unwrap_or(d.shoulder_blade_position),
            quality_score: finite(self.quality_score).unwrap_or(d.quality_score),
            version: self.version.unwrap_or(d.version),
        }
    }

    /// Validate and fill in one step
    pub fn resolve(&self) -> (Calibration, CalibrationReport) {
        (self.fill_missing(), self.validate())
    }
}

/// Holds the active calibration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationStore {
    active: Calibration,
    source: CalibrationSource,
    #[serde(default)]
    last_report: Option<CalibrationReport>,
}

impl Default for CalibrationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationStore {
    /// Store with the default calibration active
    pub fn new() -> Self {
        Self {
            active: Calibration::default(),
            source: CalibrationSource::Default,
            last_report: None,
        }
    }

    /// Store with an already-validated personal calibration active
    pub fn with_calibration(calibration: Calibration) -> Self {
        Self {
            active: calibration,
            source: CalibrationSource::Personal,
            last_report: None,
        }
    }

    pub fn active(&self) -> &Calibration {
        &self.active
    }

    pub fn source(&self) -> CalibrationSource {
        self.source
    }

    /// Report from the most recent personal record, if any
    pub fn last_report(&self) -> Option<&CalibrationReport> {
        self.last_report.as_ref()
    }

    /// Resolve a personal record and activate it when valid.
    ///
    /// An invalid record leaves the default constants active and marks the
    /// store as running on a fallback.
    pub fn activate_record(&mut self, record: &CalibrationRecord) -> &CalibrationReport {
        let (calibration, report) = record.resolve();
        if report.is_valid {
            info!(
                "personal calibration activated (quality {:.2}, {} fields filled)",
                report.quality_score,
                report.missing_fields.len()
            );
            self.active = calibration;
            self.source = CalibrationSource::Personal;
        } else {
            warn!(
                "personal calibration rejected, missing {:?}; using default constants",
                report.missing_fields
            );
            self.active = Calibration::default();
            self.source = CalibrationSource::Fallback;
        }
        self.last_report.insert(report)
    }

    /// Parse and activate a personal record from JSON.
    ///
    /// Unparseable input is non-fatal: the fallback is activated and the
    /// parse error returned for the caller to log or surface.
    pub fn load_personal_json(&mut self, json: &str) -> Result<&CalibrationReport, ComputeError> {
        match CalibrationRecord::from_json(json) {
            Ok(record) => Ok(self.activate_record(&record)),
            Err(e) => {
                warn!("personal calibration unavailable ({e}); using default constants");
                self.mark_unavailable();
                Err(e)
            }
        }
    }

    /// Switch to the default constants because no personal calibration could be loaded
    pub fn mark_unavailable(&mut self) {
        self.active = Calibration::default();
        self.source = CalibrationSource::Fallback;
    }

    pub fn reset_to_default(&mut self) {
        self.active = Calibration::default();
        self.source = CalibrationSource::Default;
        self.last_report = None;
    }

    /// Load calibration store from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serialize calibration store to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
