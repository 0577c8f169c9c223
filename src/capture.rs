//! Capture quality control
//!
//! A feedback controller over capture frame rate, frame width and compression
//! quality, keyed on a consecutive-error counter. Failures degrade quickly and in
//! graduated tiers; successes only relax parameters once the counter has drained
//! to zero, and then by steps smaller than the degrade steps.
//!
//! The controller exposes a cooldown deadline but never suppresses capture
//! itself; that is the caller's decision.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// Status codes at or above this count as server-side failures
pub const SERVER_ERROR_STATUS: u16 = 500;

/// Tunables for the capture controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub min_fps: f64,
    pub max_fps: f64,
    pub initial_fps: f64,
    pub fps_degrade_step: f64,
    pub fps_recover_step: f64,
    /// Rate ceiling once the ladder tier is reached
    pub low_fps_floor: f64,

    /// Width tiers, any order; the smallest and largest bound the width
    pub width_ladder: Vec<u32>,
    pub initial_width: u32,
    pub width_recover_step: u32,

    pub min_quality: f64,
    pub max_quality: f64,
    pub initial_quality: f64,
    pub quality_degrade_step: f64,
    pub quality_recover_step: f64,

    /// Extra counter weight for a server-side failure
    pub server_error_weight: u32,
    pub ladder_threshold: u32,
    pub severe_threshold: u32,
    pub server_cooldown_ms: i64,
    pub severe_cooldown_ms: i64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            min_fps: 1.0,
            max_fps: 5.0,
            initial_fps: 3.0,
            fps_degrade_step: 1.0,
            fps_recover_step: 0.25,
            low_fps_floor: 1.5,
            width_ladder: vec![1280, 960, 640, 480, 320],
            initial_width: 640,
            width_recover_step: 32,
            min_quality: 0.4,
            max_quality: 0.9,
            initial_quality: 0.8,
            quality_degrade_step: 0.1,
            quality_recover_step: 0.02,
            server_error_weight: 2,
            ladder_threshold: 3,
            severe_threshold: 5,
            server_cooldown_ms: 2_000,
            severe_cooldown_ms: 10_000,
        }
    }
}

impl CaptureConfig {
    pub fn min_width(&self) -> u32 {
        self.width_ladder.iter().copied().min().unwrap_or(self.initial_width)
    }

    pub fn max_width(&self) -> u32 {
        self.width_ladder.iter().copied().max().unwrap_or(self.initial_width)
    }

    /// Reject bounds that cannot hold and recovery that is not slower than degradation
    pub fn validate(&self) -> Result<(), ComputeError> {
        let invalid = |msg: &str| Err(ComputeError::InvalidConfig(format!("capture: {msg}")));

        if self.width_ladder.is_empty() {
            return invalid("width ladder is empty");
        }
        if !(self.min_fps > 0.0 && self.min_fps <= self.max_fps) {
            return invalid("frame rate bounds must satisfy 0 < min <= max");
        }
        if !(self.min_quality > 0.0 && self.min_quality <= self.max_quality && self.max_quality <= 1.0)
        {
            return invalid("quality bounds must satisfy 0 < min <= max <= 1");
        }
        if !(self.min_fps..=self.max_fps).contains(&self.initial_fps)
            || !(self.min_quality..=self.max_quality).contains(&self.initial_quality)
            || !(self.min_width()..=self.max_width()).contains(&self.initial_width)
        {
            return invalid("initial values must lie within their bounds");
        }
        if self.fps_recover_step <= 0.0 || self.fps_recover_step >= self.fps_degrade_step {
            return invalid("frame rate recover step must be positive and below the degrade step");
        }
        if self.quality_recover_step <= 0.0 || self.quality_recover_step >= self.quality_degrade_step
        {
            return invalid("quality recover step must be positive and below the degrade step");
        }
        let smallest_tier_gap = self.smallest_tier_gap();
        if self.width_recover_step == 0
            || smallest_tier_gap.is_some_and(|gap| self.width_recover_step >= gap)
        {
            return invalid("width recover step must be positive and below the ladder spacing");
        }
        if self.ladder_threshold >= self.severe_threshold {
            return invalid("ladder threshold must be below the severe threshold");
        }
        Ok(())
    }

    fn smallest_tier_gap(&self) -> Option<u32> {
        let mut tiers = self.width_ladder.clone();
        tiers.sort_unstable();
        tiers.dedup();
        tiers.windows(2).map(|w| w[1] - w[0]).min()
    }
}

/// Capture parameters the caller should apply
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CaptureSettings {
    pub fps: f64,
    pub width: u32,
    pub quality: f64,
}

/// Adaptive capture controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureQualityController {
    config: CaptureConfig,
    consecutive_errors: u32,
    settings: CaptureSettings,
    cooldown_until: Option<DateTime<Utc>>,
}

impl Default for CaptureQualityController {
    fn default() -> Self {
        Self::new(CaptureConfig::default())
    }
}

impl CaptureQualityController {
    pub fn new(config: CaptureConfig) -> Self {
        let settings = CaptureSettings {
            fps: config.initial_fps,
            width: config.initial_width,
            quality: config.initial_quality,
        };
        let mut controller = Self {
            config,
            consecutive_errors: 0,
            settings,
            cooldown_until: None,
        };
        controller.clamp();
        controller
    }

    pub fn settings(&self) -> CaptureSettings {
        self.settings
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn cooldown_until(&self) -> Option<DateTime<Utc>> {
        self.cooldown_until
    }

    /// Whether the caller should hold off capturing at `now`
    pub fn is_cooling_down(&self, now: DateTime<Utc>) -> bool {
        self.cooldown_until.is_some_and(|until| now < until)
    }

    /// Register a failed upload/analysis with its status code
    pub fn on_error(&mut self, status: u16, now: DateTime<Utc>) -> CaptureSettings {
        self.consecutive_errors += 1;
        if status >= SERVER_ERROR_STATUS {
            self.consecutive_errors += self.config.server_error_weight;
            self.extend_cooldown(now, self.config.server_cooldown_ms);
        }

        let errors = self.consecutive_errors;
        let cfg = &self.config;
        let s = &mut self.settings;

        if errors >= cfg.severe_threshold {
            s.fps = cfg.min_fps;
            s.width = cfg.min_width();
            s.quality = cfg.min_quality;
            let severe = cfg.severe_cooldown_ms;
            self.extend_cooldown(now, severe);
        } else if errors >= cfg.ladder_threshold {
            s.width = cfg
                .width_ladder
                .iter()
                .copied()
                .filter(|&w| w < s.width)
                .max()
                .unwrap_or_else(|| cfg.min_width());
            s.quality -= 2.0 * cfg.quality_degrade_step;
            s.fps = (s.fps - cfg.fps_degrade_step).min(cfg.low_fps_floor);
        } else if errors >= 2 {
            s.fps -= cfg.fps_degrade_step;
            s.quality -= cfg.quality_degrade_step;
        } else {
            s.fps -= cfg.fps_degrade_step;
        }

        self.clamp();
        debug!(
            "capture degraded: status={} errors={} fps={:.2} width={} quality={:.2}",
            status, errors, self.settings.fps, self.settings.width, self.settings.quality
        );
        self.settings
    }

    /// Register a successful upload/analysis
    pub fn on_success(&mut self, _now: DateTime<Utc>) -> CaptureSettings {
        self.consecutive_errors = self.consecutive_errors.saturating_sub(1);
        self.cooldown_until = None;

        if self.consecutive_errors == 0 {
            let cfg = &self.config;
            let s = &mut self.settings;
            let before = *s;
            s.fps += cfg.fps_recover_step;
            s.quality += cfg.quality_recover_step;
            s.width = s.width.saturating_add(cfg.width_recover_step);
            self.clamp();
            if self.settings != before {
                debug!(
                    "capture recovering: fps={:.2} width={} quality={:.2}",
                    self.settings.fps, self.settings.width, self.settings.quality
                );
            }
        }
        self.settings
    }

    fn extend_cooldown(&mut self, now: DateTime<Utc>, ms: i64) {
        let until = now + Duration::milliseconds(ms);
        self.cooldown_until = Some(match self.cooldown_until {
            Some(existing) if existing > until => existing,
            _ => until,
        });
    }

    fn clamp(&mut self) {
        let cfg = &self.config;
        let s = &mut self.settings;
        s.fps = s.fps.clamp(cfg.min_fps, cfg.max_fps);
        s.quality = s.quality.clamp(cfg.min_quality, cfg.max_quality);
        s.width = s.width.clamp(cfg.min_width(), cfg.max_width());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(CaptureConfig::default().validate().is_ok());
    }

    #[test]
    fn test_symmetric_steps_rejected() {
        let config = CaptureConfig {
            fps_recover_step: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = CaptureConfig {
            width_recover_step: 160,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_single_client_error_cuts_rate_only() {
        let mut controller = CaptureQualityController::default();
        let s = controller.on_error(404, t(0));
        assert_eq!(s.fps, 2.0);
        assert_eq!(s.width, 640);
        assert_eq!(s.quality, 0.8);
        assert!(controller.cooldown_until().is_none());
    }

    #[test]
    fn test_graduated_degradation() {
        let mut controller = CaptureQualityController::default();
        controller.on_error(400, t(0));
        let s = controller.on_error(400, t(100));
        assert_eq!(s.fps, 1.0);
        assert!((s.quality - 0.7).abs() < 1e-9);
        assert_eq!(s.width, 640);

        let s = controller.on_error(400, t(200));
        assert_eq!(s.width, 480);
        assert!((s.quality - 0.5).abs() < 1e-9);
        assert_eq!(s.fps, 1.0);
    }

    #[test]
    fn test_server_errors_drive_to_floors() {
        let mut controller = CaptureQualityController::default();
        for i in 0..3 {
            controller.on_error(503, t(i * 100));
        }
        let s = controller.settings();
        assert_eq!(s.fps, 1.0);
        assert_eq!(s.width, 320);
        assert_eq!(s.quality, 0.4);
        assert_eq!(controller.consecutive_errors(), 9);
        assert!(controller.is_cooling_down(t(300)));
        assert!(controller.cooldown_until().unwrap() > t(200));

        // One success drains a single error and relaxes nothing
        let s = controller.on_success(t(400));
        assert_eq!(controller.consecutive_errors(), 8);
        assert_eq!(s.fps, 1.0);
        assert_eq!(s.width, 320);
        assert!(!controller.is_cooling_down(t(400)));
    }

    #[test]
    fn test_recovery_only_at_zero_and_slower() {
        let mut controller = CaptureQualityController::default();
        controller.on_error(400, t(0));
        controller.on_error(400, t(10));
        let degraded = controller.settings();

        controller.on_success(t(20));
        assert_eq!(controller.settings(), degraded);

        let s = controller.on_success(t(30));
        assert_eq!(controller.consecutive_errors(), 0);
        assert!((s.fps - (degraded.fps + 0.25)).abs() < 1e-9);
        assert!((s.quality - (degraded.quality + 0.02)).abs() < 1e-9);
        assert_eq!(s.width, degraded.width + 32);
    }

    #[test]
    fn test_parameters_stay_bounded() {
        let mut controller = CaptureQualityController::default();
        for i in 0..200 {
            controller.on_success(t(i));
        }
        let s = controller.settings();
        assert_eq!(s.fps, 5.0);
        assert_eq!(s.width, 1280);
        assert_eq!(s.quality, 0.9);

        for i in 0..20 {
            controller.on_error(500, t(1_000 + i));
        }
        let s = controller.settings();
        assert_eq!(s.fps, 1.0);
        assert_eq!(s.width, 320);
        assert_eq!(s.quality, 0.4);
    }
}
