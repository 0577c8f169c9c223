//! Pipeline orchestration
//!
//! `SessionPipeline` owns every stateful component of one coaching session and
//! routes inputs through them:
//!
//! 1. Landmark frames: geometry analysis, blink tracking, then the same path
//!    as upstream results
//! 2. Upstream results: canonicalization, stabilization, then visual
//!    sub-scores into the aggregator and the engagement streaks
//! 3. Transport outcomes: capture quality control
//! 4. Transcript turns: initiative, conversation engagement
//! 5. Auditory scores: aggregator
//!
//! Time is always supplied by the caller, so replays are deterministic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregator::{AggregateBreakdown, AggregateState, ScoreItem, WeightedAggregator};
use crate::calibration::{Calibration, CalibrationRecord, CalibrationReport, CalibrationSource, CalibrationStore};
use crate::canonical::{Canonicalizer, UpstreamResult};
use crate::capture::{CaptureQualityController, CaptureSettings};
use crate::config::PipelineConfig;
use crate::engagement::{EngagementAccumulator, EngagementDetails, EngagementDimension};
use crate::error::ComputeError;
use crate::geometry::eyes::BlinkStats;
use crate::geometry::{BlinkTracker, LandmarkAnalyzer};
use crate::initiative::{InitiativeAnalyzer, InitiativeStats, Role, Turn};
use crate::schema::{EventPayload, SessionEvent};
use crate::stabilizer::ScoreStabilizer;
use crate::types::{CanonicalScoreVector, LandmarkFrame, RawMetricSet, StabilizedScoreVector};

/// Status attached to frames where no face was visible
const NO_FACE_STATUS: &str = "no-face";

/// Result of one frame or upstream result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameOutcome {
    /// Geometry metrics, present for landmark frames with a face
    pub metrics: Option<RawMetricSet>,
    pub canonical: CanonicalScoreVector,
    pub stabilized: StabilizedScoreVector,
    pub blink_completed: bool,
    pub aggregate: AggregateState,
    pub engagement: f64,
}

/// Result of one transcript turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub initiative: u8,
    pub engagement: f64,
    pub aggregate: AggregateState,
}

/// Result of applying one session event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventOutcome {
    Frame(FrameOutcome),
    Capture(CaptureSettings),
    Turn(TurnOutcome),
    Aggregate(AggregateState),
    Calibration(CalibrationReport),
}

/// Everything the presentation layer renders
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub at: DateTime<Utc>,
    pub frames_processed: u64,
    pub calibration_source: CalibrationSource,
    pub capture: CaptureSettings,
    pub consecutive_errors: u32,
    pub cooling_down: bool,
    pub scores: Option<StabilizedScoreVector>,
    pub metrics: Option<RawMetricSet>,
    pub blinks: BlinkStats,
    pub aggregate: AggregateBreakdown,
    pub initiative: InitiativeStats,
    pub engagement: EngagementDetails,
}

/// Stateful scorer for one session
pub struct SessionPipeline {
    config: PipelineConfig,
    calibration: CalibrationStore,
    capture: CaptureQualityController,
    canonicalizer: Canonicalizer,
    stabilizer: ScoreStabilizer,
    aggregator: WeightedAggregator,
    initiative: InitiativeAnalyzer,
    engagement: EngagementAccumulator,
    blinks: BlinkTracker,
    last_metrics: Option<RawMetricSet>,
    last_scores: Option<StabilizedScoreVector>,
    frames_processed: u64,
}

impl Default for SessionPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionPipeline {
    /// Create a pipeline with default settings
    pub fn new() -> Self {
        Self::build(PipelineConfig::default())
    }

    /// Create a pipeline with a validated configuration
    pub fn with_config(config: PipelineConfig) -> Result<Self, ComputeError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: PipelineConfig) -> Self {
        Self {
            calibration: CalibrationStore::new(),
            capture: CaptureQualityController::new(config.capture.clone()),
            canonicalizer: Canonicalizer::new(config.posture.clone()),
            stabilizer: ScoreStabilizer::new(config.stabilizer.clone()),
            aggregator: WeightedAggregator::new(config.weights.clone()),
            initiative: InitiativeAnalyzer::new(),
            engagement: EngagementAccumulator::new(config.engagement.clone()),
            blinks: BlinkTracker::new(),
            last_metrics: None,
            last_scores: None,
            frames_processed: 0,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn calibration(&self) -> &CalibrationStore {
        &self.calibration
    }

    /// Activate an already-resolved personal calibration
    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = CalibrationStore::with_calibration(calibration);
    }

    /// Resolve and activate a personal calibration record
    pub fn activate_calibration(&mut self, record: &CalibrationRecord) -> CalibrationReport {
        self.calibration.activate_record(record).clone()
    }

    /// Load a personal calibration from JSON; defaults stay active on failure
    pub fn load_calibration_json(&mut self, json: &str) -> Result<CalibrationReport, ComputeError> {
        self.calibration.load_personal_json(json).cloned()
    }

    /// Geometry metrics for a frame under the active calibration
    pub fn analyze_frame(&self, frame: &LandmarkFrame) -> RawMetricSet {
        LandmarkAnalyzer::analyze(frame, self.calibration.active(), &self.config.geometry)
    }

    /// Score one landmark frame; `None` means no face this tick
    pub fn process_frame(&mut self, frame: Option<&LandmarkFrame>, at: DateTime<Utc>) -> FrameOutcome {
        let metrics = frame.map(|f| self.analyze_frame(f));
        let (result, blink_completed) = match &metrics {
            Some(m) => (
                UpstreamResult::from_metrics(m),
                self.blinks.observe(m.eyes.state, at),
            ),
            None => (
                UpstreamResult {
                    face_detected: Some(false),
                    status: Some(NO_FACE_STATUS.to_string()),
                    ..Default::default()
                },
                false,
            ),
        };
        if metrics.is_some() {
            self.last_metrics = metrics;
        }
        let mut outcome = self.ingest(&result, at);
        outcome.metrics = metrics;
        outcome.blink_completed = blink_completed;
        outcome
    }

    /// Score one upstream analysis result
    pub fn process_result(&mut self, result: &UpstreamResult, at: DateTime<Utc>) -> FrameOutcome {
        self.ingest(result, at)
    }

    pub fn process_result_json(&mut self, json: &str, at: DateTime<Utc>) -> Result<FrameOutcome, ComputeError> {
        let result = UpstreamResult::from_json(json)?;
        Ok(self.process_result(&result, at))
    }

    fn ingest(&mut self, result: &UpstreamResult, at: DateTime<Utc>) -> FrameOutcome {
        self.frames_processed += 1;
        let canonical = self.canonicalizer.canonicalize(result);
        let stabilized = self.stabilizer.process(canonical.clone(), at);
        self.feed_visual(&stabilized.scores, at);
        self.last_scores = Some(stabilized.clone());

        FrameOutcome {
            metrics: None,
            canonical,
            stabilized,
            blink_completed: false,
            aggregate: self.aggregator.state(),
            engagement: self.engagement.score(),
        }
    }

    fn feed_visual(&mut self, scores: &CanonicalScoreVector, at: DateTime<Utc>) {
        let stability = scores.stability as f64;
        let posture = scores.posture as f64;

        self.aggregator.update(ScoreItem::GazeStability, stability);
        self.aggregator.update(ScoreItem::Posture, posture);
        self.aggregator.update(ScoreItem::Blinking, scores.blink as f64);
        self.engagement.observe(EngagementDimension::Gaze, stability, at);
        self.engagement.observe(EngagementDimension::Posture, posture, at);

        if let Some(expression) = scores.expression_score {
            self.aggregator.update(ScoreItem::Expression, expression as f64);
            self.engagement
                .observe(EngagementDimension::Expression, expression as f64, at);
        }
    }

    /// Upstream request failed
    pub fn on_transport_error(&mut self, status: u16, at: DateTime<Utc>) -> CaptureSettings {
        self.capture.on_error(status, at)
    }

    pub fn on_transport_success(&mut self, at: DateTime<Utc>) -> CaptureSettings {
        self.capture.on_success(at)
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        self.capture.settings()
    }

    /// Append a transcript turn
    pub fn add_turn(&mut self, turn: &Turn, at: DateTime<Utc>) -> TurnOutcome {
        let initiative = self.initiative.push(turn);
        self.aggregator.update(ScoreItem::Initiative, initiative as f64);
        if turn.role == Role::User {
            self.engagement.on_turn(&turn.text, at);
        }
        TurnOutcome {
            initiative,
            engagement: self.engagement.score(),
            aggregate: self.aggregator.state(),
        }
    }

    /// Record auditory sub-scores; absent values leave the previous ones
    pub fn update_auditory(&mut self, tone: Option<f64>, concentration: Option<f64>) -> AggregateState {
        if let Some(tone) = tone {
            self.aggregator.update(ScoreItem::Tone, tone);
        }
        if let Some(concentration) = concentration {
            self.aggregator.update(ScoreItem::Concentration, concentration);
        }
        self.aggregator.state()
    }

    /// Validate and dispatch one recorded event
    pub fn apply(&mut self, event: &SessionEvent) -> Result<EventOutcome, ComputeError> {
        event
            .validate()
            .map_err(|e| ComputeError::InvalidEvent(e.to_string()))?;
        let at = event.timestamp;

        let outcome = match &event.payload {
            EventPayload::Landmarks {
                points,
                face_detected,
            } => {
                let frame = if *face_detected && !points.is_empty() {
                    Some(LandmarkFrame::new(points.clone())?)
                } else {
                    None
                };
                EventOutcome::Frame(self.process_frame(frame.as_ref(), at))
            }
            EventPayload::Result { result } => {
                let result = UpstreamResult::from_value(result.clone())?;
                EventOutcome::Frame(self.process_result(&result, at))
            }
            EventPayload::TransportError { status } => {
                EventOutcome::Capture(self.on_transport_error(*status, at))
            }
            EventPayload::TransportSuccess => EventOutcome::Capture(self.on_transport_success(at)),
            EventPayload::Turn { role, text } => {
                EventOutcome::Turn(self.add_turn(&Turn::new(*role, text.clone()), at))
            }
            EventPayload::Auditory {
                tone,
                concentration,
            } => EventOutcome::Aggregate(self.update_auditory(*tone, *concentration)),
            EventPayload::Calibration { record } => {
                EventOutcome::Calibration(self.activate_calibration(record))
            }
        };
        Ok(outcome)
    }

    /// Current state of every component
    pub fn snapshot(&self, at: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            at,
            frames_processed: self.frames_processed,
            calibration_source: self.calibration.source(),
            capture: self.capture.settings(),
            consecutive_errors: self.capture.consecutive_errors(),
            cooling_down: self.capture.is_cooling_down(at),
            scores: self.last_scores.clone(),
            metrics: self.last_metrics,
            blinks: self.blinks.stats(),
            aggregate: self.aggregator.breakdown(),
            initiative: self.initiative.stats(),
            engagement: self.engagement.details(),
        }
    }

    /// Clear all session state, keeping configuration and calibration
    pub fn reset(&mut self) {
        let calibration = std::mem::take(&mut self.calibration);
        *self = Self::build(self.config.clone());
        self.calibration = calibration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::ScoreCategory;
    use crate::geometry::indices::{FACE_LEFT, FACE_RIGHT, NOSE_TIP};
    use crate::geometry::test_support::frontal_frame;
    use crate::types::{BlinkState, Landmark};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    fn open_frame() -> LandmarkFrame {
        frontal_frame(0.3, (0.5, 0.53))
    }

    #[test]
    fn test_closed_eyes_at_center_with_poor_posture() {
        let mut points = frontal_frame(0.15, (0.5, 0.53)).points().to_vec();
        points[FACE_LEFT] = Landmark::new(0.56, 0.35);
        points[FACE_RIGHT] = Landmark::new(0.84, 0.65);
        points[NOSE_TIP] = Landmark::new(0.75, 0.55);
        let frame = LandmarkFrame::new(points).unwrap();

        let mut pipeline = SessionPipeline::new();
        let outcome = pipeline.process_frame(Some(&frame), t(0));
        let metrics = outcome.metrics.unwrap();

        assert_eq!(metrics.eyes.state, BlinkState::Closed);
        assert_eq!(metrics.gaze.stability_score, 100);
        assert_eq!(metrics.neck.posture_score, 60);
        assert_eq!(metrics.shoulder.score, 50);
        assert_eq!(outcome.canonical.blink, 0);
        assert_eq!(outcome.canonical.stability, 100);
        assert_eq!(outcome.canonical.posture, 60);
    }

    #[test]
    fn test_face_loss_is_held() {
        let mut pipeline = SessionPipeline::new();
        let first = pipeline.process_frame(Some(&open_frame()), t(0));
        assert!(!first.stabilized.using_held_scores);

        let lost = pipeline.process_frame(None, t(1_000));
        assert!(lost.metrics.is_none());
        assert!(!lost.canonical.face_detected);
        assert!(lost.stabilized.using_held_scores);
        assert_eq!(lost.stabilized.scores, first.canonical);

        let expired = pipeline.process_frame(None, t(4_500));
        assert!(!expired.stabilized.using_held_scores);
        assert!(expired.stabilized.scores.all_zero());
    }

    #[test]
    fn test_composite_waits_for_every_input() {
        let mut pipeline = SessionPipeline::new();
        let frame = pipeline.process_frame(Some(&open_frame()), t(0));
        assert_eq!(
            frame.aggregate,
            AggregateState::Collecting {
                missing: vec![ScoreCategory::Auditory, ScoreCategory::Conversational]
            }
        );

        pipeline.update_auditory(Some(80.0), Some(80.0));
        let turn = pipeline.add_turn(&Turn::new(Role::User, "안녕하세요, 오늘 어떻게 지내셨어요?"), t(500));
        assert!(turn.initiative > 50);
        assert!(turn.aggregate.composite().is_some());
    }

    #[test]
    fn test_result_path_matches_canonicalizer() {
        let mut pipeline = SessionPipeline::new();
        let outcome = pipeline
            .process_result_json(r#"{"scores": {"A": 73, "S": 81, "R": 90, "W": 70}, "posture_score": 0.66}"#, t(0))
            .unwrap();
        assert_eq!(outcome.canonical.attention, 73);
        assert_eq!(outcome.canonical.posture, 66);
        assert_eq!(outcome.canonical.expression_label, "positive");
        assert!(pipeline.process_result_json("[]", t(10)).is_err());
    }

    #[test]
    fn test_transport_outcomes_drive_capture() {
        let mut pipeline = SessionPipeline::new();
        let initial = pipeline.capture_settings();
        for i in 0..3 {
            pipeline.on_transport_error(503, t(i * 100));
        }
        let degraded = pipeline.capture_settings();
        assert!(degraded.fps < initial.fps);
        let snapshot = pipeline.snapshot(t(400));
        assert!(snapshot.cooling_down);
        assert!(snapshot.consecutive_errors > 0);
    }

    #[test]
    fn test_apply_events() {
        let mut pipeline = SessionPipeline::new();
        let frame = SessionEvent::landmarks(t(0), open_frame().points().to_vec());
        assert!(matches!(pipeline.apply(&frame).unwrap(), EventOutcome::Frame(_)));

        let record = SessionEvent::new(
            t(10),
            EventPayload::Calibration {
                record: CalibrationRecord::default(),
            },
        );
        match pipeline.apply(&record).unwrap() {
            EventOutcome::Calibration(report) => assert!(!report.is_valid),
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(pipeline.calibration().source(), CalibrationSource::Fallback);

        let bad = SessionEvent::new(t(20), EventPayload::TransportError { status: 7 });
        assert!(matches!(
            pipeline.apply(&bad),
            Err(ComputeError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_snapshot_and_reset() {
        let mut pipeline = SessionPipeline::new();
        pipeline.load_calibration_json(r#"{"center_h": 0.5, "center_v": 0.53, "center_ear": 0.22, "blink_ear_threshold": 0.19, "blink_closed_threshold": 0.22}"#)
            .unwrap();
        pipeline.process_frame(Some(&open_frame()), t(0));
        pipeline.add_turn(&Turn::new(Role::Assistant, "hello"), t(100));

        let snapshot = pipeline.snapshot(t(200));
        assert_eq!(snapshot.frames_processed, 1);
        assert_eq!(snapshot.calibration_source, CalibrationSource::Personal);
        assert!(snapshot.scores.is_some());
        assert_eq!(snapshot.initiative.assistant.messages, 1);

        pipeline.reset();
        let snapshot = pipeline.snapshot(t(300));
        assert_eq!(snapshot.frames_processed, 0);
        assert!(snapshot.scores.is_none());
        assert_eq!(snapshot.calibration_source, CalibrationSource::Personal);
    }
}
