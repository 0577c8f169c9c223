//! Result canonicalization
//!
//! Upstream analyzers disagree on field names, value ranges and even types.
//! This module maps any of those shapes into one `CanonicalScoreVector`:
//!
//! 1. Face-not-detected results short-circuit to the zero vector.
//! 2. Each dimension walks an ordered list of extractors; the first one that
//!    yields a value wins.
//! 3. Values are scaled (fractions in [0,1] become percentages) and clamped.
//! 4. Dimensions nothing resolved default to 0.
//!
//! Missing or mistyped fields never produce an error; only input that is not a
//! JSON object is rejected.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::ComputeError;
use crate::types::{CanonicalScoreVector, RawMetricSet, NO_EXPRESSION_LABEL};

/// Coaching message upstream sends when the camera view is blocked
pub const CAMERA_BLOCKED_MESSAGE: &str = "카메라가 보이지 않아서 피드백을 할 수 없습니다.";

/// Expression labels derived from an expression score
pub const EXPRESSION_POSITIVE: &str = "positive";
pub const EXPRESSION_NEUTRAL: &str = "neutral";
pub const EXPRESSION_NEEDS_IMPROVEMENT: &str = "needs-improvement";

fn number_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn lenient_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.as_ref().and_then(number_from_value))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(match value {
        Some(Value::Bool(b)) => Some(b),
        _ => None,
    })
}

fn lenient_scores<'de, D: Deserializer<'de>>(d: D) -> Result<Option<ShortScores>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value
        .filter(Value::is_object)
        .and_then(|v| serde_json::from_value(v).ok()))
}

/// Single-letter score block some producers emit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShortScores {
    /// Attention
    #[serde(rename = "A", default, deserialize_with = "lenient_number")]
    pub a: Option<f64>,
    /// Stability
    #[serde(rename = "S", default, deserialize_with = "lenient_number")]
    pub s: Option<f64>,
    /// Blink / eye rest
    #[serde(rename = "R", default, deserialize_with = "lenient_number")]
    pub r: Option<f64>,
    /// Posture (backup only)
    #[serde(rename = "P", default, deserialize_with = "lenient_number")]
    pub p: Option<f64>,
    /// Warmth / expression
    #[serde(rename = "W", default, deserialize_with = "lenient_number")]
    pub w: Option<f64>,
}

/// Upstream analysis result of any known shape. Unknown fields are ignored and
/// fields of an unexpected JSON type read as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamResult {
    #[serde(deserialize_with = "lenient_string")]
    pub status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub coaching_message: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub face_detected: Option<bool>,
    #[serde(deserialize_with = "lenient_scores")]
    pub scores: Option<ShortScores>,

    // Attention
    #[serde(deserialize_with = "lenient_number")]
    pub attention: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub attention_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub focus: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub focus_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub gaze_attention: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub concentration: Option<f64>,

    // Stability
    #[serde(deserialize_with = "lenient_number")]
    pub stability_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub stability: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub gaze_stability: Option<f64>,

    // Blink
    #[serde(deserialize_with = "lenient_number")]
    pub blink: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub blink_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub blinking: Option<f64>,
    /// Blinks per minute
    #[serde(deserialize_with = "lenient_number")]
    pub blink_rate: Option<f64>,

    // Posture sub-scores
    #[serde(deserialize_with = "lenient_number")]
    pub chin_forward_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub neck_tilt_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub neck_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub back_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub shoulder_blade_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub shoulder_width_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub torso_height_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub neck_length_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub neck_angle_score: Option<f64>,

    // Posture aggregates
    #[serde(deserialize_with = "lenient_number")]
    pub enhanced_posture_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub posture_score: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub posture: Option<f64>,

    // Posture status strings
    #[serde(deserialize_with = "lenient_string")]
    pub posture_status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub enhanced_posture_status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub back_status: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub neck_status: Option<String>,

    // Posture geometry
    #[serde(deserialize_with = "lenient_number")]
    pub forward_head: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub shoulder_tilt: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub forward_head_ratio: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub shoulder_open_deg: Option<f64>,
    #[serde(deserialize_with = "lenient_number")]
    pub torso_lean_deg: Option<f64>,

    // Expression
    #[serde(deserialize_with = "lenient_number")]
    pub smile_score: Option<f64>,
    #[serde(deserialize_with = "lenient_string")]
    pub warmth_label: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub expression: Option<String>,
}

impl UpstreamResult {
    /// Parse a result payload; anything but a JSON object is rejected
    pub fn from_json(json: &str) -> Result<Self, ComputeError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, ComputeError> {
        if !value.is_object() {
            return Err(ComputeError::ParseError(
                "analysis result must be a JSON object".to_string(),
            ));
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Result for a locally analyzed frame.
    ///
    /// Scores travel as fractions so the usual scaling maps them back exactly.
    pub fn from_metrics(metrics: &RawMetricSet) -> Self {
        let fraction = |score: u8| Some(score as f64 / 100.0);
        Self {
            face_detected: Some(true),
            attention: fraction(metrics.concentration_score),
            stability_score: fraction(metrics.gaze.stability_score),
            blink_score: fraction(metrics.blink_score),
            posture_score: fraction(metrics.neck.posture_score),
            smile_score: fraction(metrics.expression.smile_score),
            forward_head: Some(metrics.neck.forward_head),
            forward_head_ratio: Some(metrics.neck.forward_head_ratio),
            ..Default::default()
        }
    }

    /// Whether the payload says no face was visible
    pub fn face_missing(&self) -> bool {
        let no_face_status = self
            .status
            .as_deref()
            .is_some_and(|s| normalize_status(s) == "no-face");
        let blocked = self.coaching_message.as_deref() == Some(CAMERA_BLOCKED_MESSAGE);
        no_face_status || blocked || self.face_detected == Some(false)
    }
}

/// Lowercase and unify separators so `No_Face` and `no-face` compare equal
pub fn normalize_status(status: &str) -> String {
    status.trim().to_lowercase().replace(['_', ' '], "-")
}

/// Normalization bounds for the geometry-derived posture fallback
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostureTolerances {
    pub forward_head: f64,
    pub forward_head_weight: f64,
    pub shoulder_tilt: f64,
    pub shoulder_tilt_weight: f64,
    pub forward_head_ratio: f64,
    pub forward_head_ratio_weight: f64,
    /// Ideal shoulder opening angle (degrees)
    pub shoulder_open_ideal: f64,
    pub shoulder_open: f64,
    pub shoulder_open_weight: f64,
    /// Ideal torso angle (degrees)
    pub torso_lean_ideal: f64,
    pub torso_lean: f64,
    pub torso_lean_weight: f64,
}

impl Default for PostureTolerances {
    fn default() -> Self {
        Self {
            forward_head: 0.35,
            forward_head_weight: 30.0,
            shoulder_tilt: 0.25,
            shoulder_tilt_weight: 35.0,
            forward_head_ratio: 0.5,
            forward_head_ratio_weight: 20.0,
            shoulder_open_ideal: 175.0,
            shoulder_open: 10.0,
            shoulder_open_weight: 25.0,
            torso_lean_ideal: 180.0,
            torso_lean: 10.0,
            torso_lean_weight: 10.0,
        }
    }
}

/// A value pulled out of a result, tagged with how it should be scaled
#[derive(Debug, Clone, Copy, PartialEq)]
enum RawScore {
    /// Producer-supplied; may be a fraction or a percentage
    Upstream(f64),
    /// Computed here, already on the 0-100 scale
    Derived(f64),
}

impl RawScore {
    fn to_score(self) -> u8 {
        match self {
            RawScore::Upstream(v) => scale_to_percent(v),
            RawScore::Derived(v) => v.clamp(0.0, 100.0).round() as u8,
        }
    }
}

/// Fractions in [0,1] become percentages; everything else is clamped to [0,100]
pub fn scale_to_percent(value: f64) -> u8 {
    if !value.is_finite() {
        return 0;
    }
    let pct = if value <= 1.0 { value * 100.0 } else { value };
    pct.clamp(0.0, 100.0).round() as u8
}

struct Context<'a> {
    result: &'a UpstreamResult,
    tolerances: &'a PostureTolerances,
}

type Extractor = fn(&Context) -> Option<RawScore>;

fn upstream(value: Option<f64>) -> Option<RawScore> {
    value.map(RawScore::Upstream)
}

fn short<'a>(ctx: &'a Context<'_>) -> Option<&'a ShortScores> {
    ctx.result.scores.as_ref()
}

const ATTENTION_CHAIN: &[(&str, Extractor)] = &[
    ("scores.A", |c| upstream(short(c).and_then(|s| s.a))),
    ("attention", |c| upstream(c.result.attention)),
    ("attention_score", |c| upstream(c.result.attention_score)),
    ("focus", |c| upstream(c.result.focus)),
    ("focus_score", |c| upstream(c.result.focus_score)),
    ("gaze_attention", |c| upstream(c.result.gaze_attention)),
    ("concentration", |c| upstream(c.result.concentration)),
];

const STABILITY_CHAIN: &[(&str, Extractor)] = &[
    ("scores.S", |c| upstream(short(c).and_then(|s| s.s))),
    ("stability_score", |c| upstream(c.result.stability_score)),
    ("stability", |c| upstream(c.result.stability)),
    ("gaze_stability", |c| upstream(c.result.gaze_stability)),
];

const BLINK_CHAIN: &[(&str, Extractor)] = &[
    ("scores.R", |c| upstream(short(c).and_then(|s| s.r))),
    ("blink", |c| upstream(c.result.blink)),
    ("blink_score", |c| upstream(c.result.blink_score)),
    ("blinking", |c| upstream(c.result.blinking)),
    ("blink_rate", blink_from_rate),
];

const POSTURE_CHAIN: &[(&str, Extractor)] = &[
    ("posture_sub_scores", posture_from_sub_scores),
    ("enhanced_posture_score", |c| upstream(c.result.enhanced_posture_score)),
    ("posture_score", |c| upstream(c.result.posture_score)),
    ("posture", |c| upstream(c.result.posture)),
    ("posture_status", posture_from_status),
    ("posture_geometry", posture_from_geometry),
    ("scores.P", |c| upstream(short(c).and_then(|s| s.p).filter(|p| *p > 0.0))),
];

const EXPRESSION_CHAIN: &[(&str, Extractor)] = &[
    ("scores.W", |c| upstream(short(c).and_then(|s| s.w))),
    ("smile_score", |c| upstream(c.result.smile_score)),
];

/// Above ten blinks a minute, every extra blink costs five points
fn blink_from_rate(ctx: &Context) -> Option<RawScore> {
    ctx.result
        .blink_rate
        .map(|rate| RawScore::Derived(100.0 - ((rate - 10.0) * 5.0).clamp(0.0, 100.0)))
}

fn posture_from_sub_scores(ctx: &Context) -> Option<RawScore> {
    let r = ctx.result;
    let present: Vec<f64> = [
        r.chin_forward_score,
        r.neck_tilt_score,
        r.neck_score,
        r.back_score,
        r.shoulder_blade_score,
        r.shoulder_width_score,
        r.torso_height_score,
        r.neck_length_score,
        r.neck_angle_score,
    ]
    .into_iter()
    .flatten()
    .collect();
    if present.is_empty() {
        return None;
    }
    Some(RawScore::Upstream(
        present.iter().sum::<f64>() / present.len() as f64,
    ))
}

/// Tier for a free-text posture status, matched on keywords
pub fn status_tier(status: &str) -> Option<f64> {
    let s = status.to_lowercase();
    let has = |keys: &[&str]| keys.iter().any(|k| s.contains(k));

    if has(&["excellent", "best", "매우 좋"]) {
        Some(95.0)
    } else if has(&["good", "좋"]) {
        Some(85.0)
    } else if has(&["neutral", "fair", "ok", "보통"]) {
        Some(70.0)
    } else if has(&["improve", "bad", "poor", "개선", "나쁨"]) {
        Some(50.0)
    } else if has(&["no data", "no-data", "no_data", "데이터없음", "데이터 없음"]) {
        Some(0.0)
    } else {
        None
    }
}

fn posture_from_status(ctx: &Context) -> Option<RawScore> {
    let r = ctx.result;
    let best = [
        &r.posture_status,
        &r.enhanced_posture_status,
        &r.back_status,
        &r.neck_status,
    ]
    .into_iter()
    .filter_map(|s| s.as_deref().and_then(status_tier))
    .fold(None, |acc: Option<f64>, tier| Some(acc.map_or(tier, |a| a.max(tier))));

    // A "no data" tier alone does not resolve posture
    best.filter(|tier| *tier > 0.0).map(RawScore::Derived)
}

fn posture_from_geometry(ctx: &Context) -> Option<RawScore> {
    let r = ctx.result;
    let t = ctx.tolerances;
    let terms = [
        (r.forward_head, 0.0, t.forward_head, t.forward_head_weight),
        (r.shoulder_tilt, 0.0, t.shoulder_tilt, t.shoulder_tilt_weight),
        (r.forward_head_ratio, 0.0, t.forward_head_ratio, t.forward_head_ratio_weight),
        (r.shoulder_open_deg, t.shoulder_open_ideal, t.shoulder_open, t.shoulder_open_weight),
        (r.torso_lean_deg, t.torso_lean_ideal, t.torso_lean, t.torso_lean_weight),
    ];

    let penalties: Vec<f64> = terms
        .iter()
        .filter_map(|&(value, ideal, tolerance, weight)| {
            let v = value?;
            if tolerance <= 0.0 {
                return None;
            }
            Some(((v - ideal).abs() / tolerance).min(1.0) * weight)
        })
        .collect();
    if penalties.is_empty() {
        return None;
    }
    let average = penalties.iter().sum::<f64>() / penalties.len() as f64;
    Some(RawScore::Derived(100.0 - average))
}

fn resolve(chain: &[(&'static str, Extractor)], ctx: &Context) -> Option<(u8, &'static str)> {
    chain
        .iter()
        .find_map(|(name, extract)| extract(ctx).map(|raw| (raw.to_score(), *name)))
}

/// Label for an expression score
pub fn expression_label(score: u8) -> &'static str {
    match score {
        s if s >= 66 => EXPRESSION_POSITIVE,
        s if s >= 40 => EXPRESSION_NEUTRAL,
        _ => EXPRESSION_NEEDS_IMPROVEMENT,
    }
}

/// Which field resolved each dimension
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionTrace {
    pub face_missing: bool,
    pub attention: Option<&'static str>,
    pub stability: Option<&'static str>,
    pub blink: Option<&'static str>,
    pub posture: Option<&'static str>,
    pub expression: Option<&'static str>,
}

/// Maps upstream results to canonical score vectors
#[derive(Debug, Clone, Default)]
pub struct Canonicalizer {
    tolerances: PostureTolerances,
}

impl Canonicalizer {
    pub fn new(tolerances: PostureTolerances) -> Self {
        Self { tolerances }
    }

    pub fn canonicalize(&self, result: &UpstreamResult) -> CanonicalScoreVector {
        self.canonicalize_traced(result).0
    }

    /// Canonicalize and report which extractor won per dimension
    pub fn canonicalize_traced(
        &self,
        result: &UpstreamResult,
    ) -> (CanonicalScoreVector, ResolutionTrace) {
        if result.face_missing() {
            let trace = ResolutionTrace {
                face_missing: true,
                ..Default::default()
            };
            return (CanonicalScoreVector::no_face(result.status.clone()), trace);
        }

        let ctx = Context {
            result,
            tolerances: &self.tolerances,
        };

        let attention = resolve(ATTENTION_CHAIN, &ctx);
        let stability = resolve(STABILITY_CHAIN, &ctx);
        let blink = resolve(BLINK_CHAIN, &ctx);
        let posture = resolve(POSTURE_CHAIN, &ctx);
        let expression = resolve(EXPRESSION_CHAIN, &ctx);

        let expression_label = match expression {
            Some((score, _)) => expression_label(score).to_string(),
            None => result
                .warmth_label
                .clone()
                .or_else(|| result.expression.clone())
                .unwrap_or_else(|| NO_EXPRESSION_LABEL.to_string()),
        };

        let vector = CanonicalScoreVector {
            attention: attention.map_or(0, |(v, _)| v),
            stability: stability.map_or(0, |(v, _)| v),
            blink: blink.map_or(0, |(v, _)| v),
            posture: posture.map_or(0, |(v, _)| v),
            expression_label,
            expression_score: expression.map(|(v, _)| v),
            face_detected: true,
            status: result.status.clone(),
        };
        let trace = ResolutionTrace {
            face_missing: false,
            attention: attention.map(|(_, n)| n),
            stability: stability.map(|(_, n)| n),
            blink: blink.map(|(_, n)| n),
            posture: posture.map(|(_, n)| n),
            expression: expression.map(|(_, n)| n),
        };
        (vector, trace)
    }

    /// Parse and canonicalize a JSON result
    pub fn canonicalize_json(&self, json: &str) -> Result<CanonicalScoreVector, ComputeError> {
        Ok(self.canonicalize(&UpstreamResult::from_json(json)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn canon(json: &str) -> CanonicalScoreVector {
        Canonicalizer::default().canonicalize_json(json).unwrap()
    }

    fn trace(json: &str) -> ResolutionTrace {
        let result = UpstreamResult::from_json(json).unwrap();
        Canonicalizer::default().canonicalize_traced(&result).1
    }

    #[test]
    fn test_explicit_value_passes_through() {
        let v = canon(r#"{"scores": {"A": 73, "S": 73, "R": 73}, "posture_score": 73}"#);
        assert_eq!((v.attention, v.stability, v.blink, v.posture), (73, 73, 73, 73));
    }

    #[test]
    fn test_fractions_are_scaled() {
        let v = canon(r#"{"attention": 0.82, "stability": 0.5, "blink": 1.0, "posture": 0.0}"#);
        assert_eq!(v.attention, 82);
        assert_eq!(v.stability, 50);
        assert_eq!(v.blink, 100);
        assert_eq!(v.posture, 0);
    }

    #[test]
    fn test_out_of_range_is_clamped() {
        let v = canon(r#"{"attention": 180, "stability": -20, "blink": "64"}"#);
        assert_eq!(v.attention, 100);
        assert_eq!(v.stability, 0);
        assert_eq!(v.blink, 64);
    }

    #[test]
    fn test_short_scores_take_priority() {
        let t = trace(r#"{"scores": {"A": 90}, "attention": 10, "focus": 20}"#);
        assert_eq!(t.attention, Some("scores.A"));
        assert_eq!(canon(r#"{"scores": {"A": 90}, "attention": 10}"#).attention, 90);
    }

    #[test]
    fn test_attention_fallback_order() {
        assert_eq!(trace(r#"{"focus": 40, "concentration": 70}"#).attention, Some("focus"));
        assert_eq!(trace(r#"{"concentration": 70}"#).attention, Some("concentration"));
        assert_eq!(canon(r#"{"gaze_stability": 66}"#).stability, 66);
    }

    #[test]
    fn test_blink_from_rate() {
        assert_eq!(canon(r#"{"blink_rate": 8}"#).blink, 100);
        assert_eq!(canon(r#"{"blink_rate": 20}"#).blink, 50);
        assert_eq!(canon(r#"{"blink_rate": 29.9}"#).blink, 1);
        assert_eq!(canon(r#"{"blink_rate": 45}"#).blink, 0);
    }

    #[test]
    fn test_posture_sub_scores_win() {
        let json = r#"{
            "neck_score": 80, "back_score": 60,
            "posture_score": 10, "posture_status": "excellent",
            "scores": {"P": 5}
        }"#;
        assert_eq!(canon(json).posture, 70);
        assert_eq!(trace(json).posture, Some("posture_sub_scores"));
    }

    #[test]
    fn test_posture_from_status_takes_best_tier() {
        let v = canon(r#"{"posture_status": "needs improvement", "neck_status": "good"}"#);
        assert_eq!(v.posture, 85);
        assert_eq!(canon(r#"{"back_status": "매우 좋음"}"#).posture, 95);
        assert_eq!(canon(r#"{"posture_status": "보통"}"#).posture, 70);
    }

    #[test]
    fn test_no_data_status_falls_through_to_geometry() {
        let json = r#"{"posture_status": "no data", "forward_head": 0.35, "shoulder_tilt": 0.0}"#;
        // penalties 30 and 0, average 15
        assert_eq!(canon(json).posture, 85);
        assert_eq!(trace(json).posture, Some("posture_geometry"));
    }

    #[test]
    fn test_posture_geometry_caps_each_term() {
        let json = r#"{"forward_head": 5.0, "shoulder_open_deg": 175, "torso_lean_deg": 160}"#;
        // 30 (capped) + 0 + 10 (capped) over three terms
        assert_eq!(canon(json).posture, 87);
    }

    #[test]
    fn test_posture_backup_only_when_positive() {
        assert_eq!(canon(r#"{"scores": {"P": 0.64}}"#).posture, 64);
        assert_eq!(trace(r#"{"scores": {"P": 0}}"#).posture, None);
    }

    #[test]
    fn test_missing_dimensions_default_to_zero() {
        let v = canon(r#"{"unrelated": true}"#);
        assert!(v.all_zero());
        assert!(v.face_detected);
        assert_eq!(v.expression_label, NO_EXPRESSION_LABEL);
    }

    #[test]
    fn test_face_missing_forces_zero_vector() {
        for json in [
            r#"{"status": "no-face", "attention": 90}"#,
            r#"{"status": "No_Face", "scores": {"A": 90}}"#,
            r#"{"face_detected": false, "posture_score": 80}"#,
            r#"{"coaching_message": "카메라가 보이지 않아서 피드백을 할 수 없습니다.", "blink": 70}"#,
        ] {
            let v = canon(json);
            assert!(v.all_zero(), "{json}");
            assert!(!v.face_detected);
            assert_eq!(v.expression_label, NO_EXPRESSION_LABEL);
        }
    }

    #[test]
    fn test_expression_label() {
        assert_eq!(canon(r#"{"scores": {"W": 70}}"#).expression_label, EXPRESSION_POSITIVE);
        assert_eq!(canon(r#"{"smile_score": 0.5}"#).expression_label, EXPRESSION_NEUTRAL);
        assert_eq!(
            canon(r#"{"smile_score": 20}"#).expression_label,
            EXPRESSION_NEEDS_IMPROVEMENT
        );
        assert_eq!(canon(r#"{"warmth_label": "warm"}"#).expression_label, "warm");
        assert_eq!(canon(r#"{"expression": "smiling"}"#).expression_label, "smiling");
        assert_eq!(canon(r#"{"smile_score": 70}"#).expression_score, Some(70));
    }

    #[test]
    fn test_mistyped_fields_read_as_absent() {
        let v = canon(r#"{"attention": [1, 2], "scores": "oops", "status": 3, "stability": null}"#);
        assert!(v.all_zero());
        assert_eq!(v.status, None);
    }

    #[test]
    fn test_non_object_rejected() {
        assert!(UpstreamResult::from_json("[1, 2, 3]").is_err());
        assert!(UpstreamResult::from_json("not json").is_err());
    }

    #[test]
    fn test_every_dimension_bounded() {
        for raw in [-1e9, -1.0, 0.0, 0.3, 1.0, 1.5, 99.6, 100.0, 1e12] {
            let json = format!(
                r#"{{"attention": {raw}, "stability": {raw}, "blink": {raw}, "posture": {raw}}}"#
            );
            let v = canon(&json);
            for d in [v.attention, v.stability, v.blink, v.posture] {
                assert!(d <= 100);
            }
        }
    }

    #[test]
    fn test_local_metrics_keep_exact_scores() {
        use crate::calibration::Calibration;
        use crate::geometry::test_support::frontal_frame;
        use crate::geometry::{GeometryConfig, LandmarkAnalyzer};

        let metrics = LandmarkAnalyzer::analyze(
            &frontal_frame(0.3, (0.5, 0.53)),
            &Calibration::default(),
            &GeometryConfig::default(),
        );
        let (v, trace) = Canonicalizer::default().canonicalize_traced(&UpstreamResult::from_metrics(&metrics));
        assert_eq!(v.attention, metrics.concentration_score);
        assert_eq!(v.stability, metrics.gaze.stability_score);
        assert_eq!(v.blink, metrics.blink_score);
        assert_eq!(v.posture, metrics.neck.posture_score);
        assert_eq!(v.expression_score, Some(metrics.expression.smile_score));
        assert_eq!(trace.posture, Some("posture_score"));
    }
}
