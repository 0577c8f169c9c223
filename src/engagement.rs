//! Engagement (affinity) accumulator
//!
//! A fixed base score plus four bonus accumulators: conversation, expression,
//! posture and gaze. Visual accumulators follow streaks of good frames and
//! decay more slowly than they grow. Streak milestones grant one-off extras,
//! rate-limited by a cooldown shared across every boost type.

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// Streak parameters for one visual dimension
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreakConfig {
    /// Score at or above which a frame counts as good
    pub threshold: f64,
    /// Bonus per streak frame
    pub step: f64,
    pub cap: f64,
    /// Bonus lost per poor frame
    pub decay: f64,
    /// Good frames between milestones
    pub milestone_every: u32,
    pub milestone_extra: f64,
}

impl StreakConfig {
    fn validate(&self, name: &str) -> Result<(), ComputeError> {
        let values = [self.threshold, self.step, self.cap, self.decay, self.milestone_extra];
        if values.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(ComputeError::InvalidConfig(format!(
                "engagement.{name}: values must be finite and non-negative"
            )));
        }
        if self.decay >= self.step {
            return Err(ComputeError::InvalidConfig(format!(
                "engagement.{name}: decay ({}) must be smaller than step ({})",
                self.decay, self.step
            )));
        }
        if self.milestone_every == 0 {
            return Err(ComputeError::InvalidConfig(format!(
                "engagement.{name}: milestone interval must be at least 1"
            )));
        }
        Ok(())
    }
}

/// Per-turn conversation bonus parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationBonusConfig {
    pub per_turn: f64,
    pub turn_cap: f64,
    pub per_keyword: f64,
    pub keyword_cap: f64,
    pub per_char: f64,
    pub length_cap: f64,
    pub total_cap: f64,
    pub positive_keywords: Vec<String>,
}

impl Default for ConversationBonusConfig {
    fn default() -> Self {
        Self {
            per_turn: 0.1,
            turn_cap: 5.0,
            per_keyword: 0.5,
            keyword_cap: 3.0,
            per_char: 0.002,
            length_cap: 0.5,
            total_cap: 8.5,
            positive_keywords: ["좋다", "감사", "고마워", "훌륭", "멋지다", "예쁘다", "좋아요", "최고", "완벽"]
                .iter()
                .map(|k| k.to_string())
                .collect(),
        }
    }
}

/// Tunables for the engagement accumulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngagementConfig {
    pub base_score: f64,
    pub conversation: ConversationBonusConfig,
    pub expression: StreakConfig,
    pub posture: StreakConfig,
    pub gaze: StreakConfig,
    /// Minimum gap between any two boosts (ms)
    pub boost_cooldown_ms: i64,
    /// Window after a boost during which boosts are ignored (ms)
    pub boost_guard_ms: i64,
    /// Upper bound on the sum of milestone extras
    pub milestone_bonus_cap: f64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            base_score: 50.0,
            conversation: ConversationBonusConfig::default(),
            expression: StreakConfig {
                threshold: 75.0,
                step: 0.05,
                cap: 3.0,
                decay: 0.02,
                milestone_every: 15,
                milestone_extra: 1.0,
            },
            posture: StreakConfig {
                threshold: 80.0,
                step: 0.03,
                cap: 2.0,
                decay: 0.01,
                milestone_every: 25,
                milestone_extra: 0.5,
            },
            gaze: StreakConfig {
                threshold: 85.0,
                step: 0.02,
                cap: 2.0,
                decay: 0.005,
                milestone_every: 30,
                milestone_extra: 0.5,
            },
            boost_cooldown_ms: 1_000,
            boost_guard_ms: 2_000,
            milestone_bonus_cap: 10.0,
        }
    }
}

impl EngagementConfig {
    pub fn validate(&self) -> Result<(), ComputeError> {
        self.expression.validate("expression")?;
        self.posture.validate("posture")?;
        self.gaze.validate("gaze")?;
        if !(0.0..=100.0).contains(&self.base_score) {
            return Err(ComputeError::InvalidConfig(
                "engagement: base score must be within 0-100".to_string(),
            ));
        }
        if self.boost_cooldown_ms < 0 || self.boost_guard_ms < 0 {
            return Err(ComputeError::InvalidConfig(
                "engagement: boost timings must not be negative".to_string(),
            ));
        }
        let c = &self.conversation;
        let caps = [c.per_turn, c.turn_cap, c.per_keyword, c.keyword_cap, c.per_char, c.length_cap, c.total_cap];
        if caps.iter().any(|v| !v.is_finite() || *v < 0.0) || self.milestone_bonus_cap < 0.0 {
            return Err(ComputeError::InvalidConfig(
                "engagement: bonus parameters must be finite and non-negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Visual dimension tracked by a streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementDimension {
    Expression,
    Posture,
    Gaze,
}

/// Kind of boost event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostKind {
    Conversation,
    Expression,
    Posture,
    Gaze,
}

impl From<EngagementDimension> for BoostKind {
    fn from(dimension: EngagementDimension) -> Self {
        match dimension {
            EngagementDimension::Expression => BoostKind::Expression,
            EngagementDimension::Posture => BoostKind::Posture,
            EngagementDimension::Gaze => BoostKind::Gaze,
        }
    }
}

/// A boost that was accepted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boost {
    pub kind: BoostKind,
    pub extra: f64,
    pub at: DateTime<Utc>,
}

/// Qualitative engagement band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityLevel {
    Perfect,
    Charmed,
    Warm,
    Neutral,
    Indifferent,
    Cold,
}

impl AffinityLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 95.0 {
            AffinityLevel::Perfect
        } else if score >= 80.0 {
            AffinityLevel::Charmed
        } else if score >= 60.0 {
            AffinityLevel::Warm
        } else if score >= 40.0 {
            AffinityLevel::Neutral
        } else if score >= 20.0 {
            AffinityLevel::Indifferent
        } else {
            AffinityLevel::Cold
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Streak {
    count: u32,
    bonus: f64,
}

impl Streak {
    /// Apply one frame; true when a milestone was reached
    fn observe(&mut self, score: f64, config: &StreakConfig) -> bool {
        if score >= config.threshold {
            self.count = self.count.saturating_add(1);
            self.bonus = (self.count as f64 * config.step).min(config.cap);
            self.count % config.milestone_every == 0
        } else {
            self.count = self.count.saturating_sub(1);
            self.bonus = (self.bonus - config.decay).max(0.0);
            false
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementBonuses {
    pub conversation: f64,
    pub expression: f64,
    pub posture: f64,
    pub gaze: f64,
    pub milestones: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementStreaks {
    pub conversation_turns: u32,
    pub expression: u32,
    pub posture: u32,
    pub gaze: u32,
}

/// Detailed view of the accumulator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementDetails {
    pub score: f64,
    pub display_score: u8,
    pub level: AffinityLevel,
    pub bonuses: EngagementBonuses,
    pub streaks: EngagementStreaks,
    pub positive_words: u32,
    pub last_boost: Option<Boost>,
}

/// Engagement accumulator state
#[derive(Debug, Clone, Default)]
pub struct EngagementAccumulator {
    config: EngagementConfig,
    conversation_turns: u32,
    conversation_bonus: f64,
    positive_words: u32,
    expression: Streak,
    posture: Streak,
    gaze: Streak,
    milestone_bonus: f64,
    last_boost: Option<Boost>,
    guard_until: Option<DateTime<Utc>>,
}

impl EngagementAccumulator {
    pub fn new(config: EngagementConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    /// Register a conversation turn
    pub fn on_turn(&mut self, message: &str, now: DateTime<Utc>) -> f64 {
        let c = &self.config.conversation;
        self.conversation_turns = self.conversation_turns.saturating_add(1);

        let hits = c
            .positive_keywords
            .iter()
            .filter(|k| !k.is_empty() && message.contains(k.as_str()))
            .count() as u32;
        self.positive_words = self.positive_words.saturating_add(hits);

        let turn_bonus = (self.conversation_turns as f64 * c.per_turn).min(c.turn_cap);
        let keyword_bonus = (hits as f64 * c.per_keyword).min(c.keyword_cap);
        let length_bonus = (message.chars().count() as f64 * c.per_char).min(c.length_cap);
        self.conversation_bonus = (turn_bonus + keyword_bonus + length_bonus).min(c.total_cap);

        self.try_boost(BoostKind::Conversation, 0.0, now);
        self.score()
    }

    /// Feed one stabilized visual score
    pub fn observe(&mut self, dimension: EngagementDimension, score: f64, now: DateTime<Utc>) -> f64 {
        let (streak, config) = match dimension {
            EngagementDimension::Expression => (&mut self.expression, &self.config.expression),
            EngagementDimension::Posture => (&mut self.posture, &self.config.posture),
            EngagementDimension::Gaze => (&mut self.gaze, &self.config.gaze),
        };
        let extra = config.milestone_extra;
        if streak.observe(score, config) {
            debug!("{dimension:?} streak milestone at {}", streak.count);
            self.try_boost(dimension.into(), extra, now);
        }
        self.score()
    }

    /// Apply a boost unless the cooldown or the guard window is active
    fn try_boost(&mut self, kind: BoostKind, extra: f64, now: DateTime<Utc>) -> bool {
        if self.guard_until.is_some_and(|until| now < until) {
            return false;
        }
        let cooldown = Duration::milliseconds(self.config.boost_cooldown_ms);
        if self
            .last_boost
            .as_ref()
            .is_some_and(|last| now - last.at < cooldown)
        {
            return false;
        }
        if extra > 0.0 {
            self.milestone_bonus = (self.milestone_bonus + extra).min(self.config.milestone_bonus_cap);
        }
        self.guard_until = Some(now + Duration::milliseconds(self.config.boost_guard_ms));
        self.last_boost = Some(Boost { kind, extra, at: now });
        true
    }

    /// Base plus every bonus, clamped to 0-100
    pub fn score(&self) -> f64 {
        let bonus = self.conversation_bonus
            + self.expression.bonus
            + self.posture.bonus
            + self.gaze.bonus
            + self.milestone_bonus;
        (self.config.base_score + bonus).clamp(0.0, 100.0)
    }

    pub fn display_score(&self) -> u8 {
        self.score().round() as u8
    }

    pub fn level(&self) -> AffinityLevel {
        AffinityLevel::from_score(self.score())
    }

    pub fn last_boost(&self) -> Option<&Boost> {
        self.last_boost.as_ref()
    }

    pub fn details(&self) -> EngagementDetails {
        EngagementDetails {
            score: self.score(),
            display_score: self.display_score(),
            level: self.level(),
            bonuses: EngagementBonuses {
                conversation: self.conversation_bonus,
                expression: self.expression.bonus,
                posture: self.posture.bonus,
                gaze: self.gaze.bonus,
                milestones: self.milestone_bonus,
            },
            streaks: EngagementStreaks {
                conversation_turns: self.conversation_turns,
                expression: self.expression.count,
                posture: self.posture.count,
                gaze: self.gaze.count,
            },
            positive_words: self.positive_words,
            last_boost: self.last_boost.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn t(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(1_700_000_000_000 + ms).unwrap()
    }

    #[test]
    fn test_starts_at_base() {
        let acc = EngagementAccumulator::default();
        assert_eq!(acc.score(), 50.0);
        assert_eq!(acc.level(), AffinityLevel::Neutral);
    }

    #[test]
    fn test_conversation_bonus() {
        let mut acc = EngagementAccumulator::default();
        // 1 turn 0.1, two keywords 1.0, 10 chars 0.02
        let score = acc.on_turn("감사해요 최고예요!", t(0));
        assert!((score - 51.12).abs() < 1e-9, "{score}");
        assert_eq!(acc.details().positive_words, 2);
        assert_eq!(acc.last_boost().map(|b| b.kind), Some(BoostKind::Conversation));
    }

    #[test]
    fn test_conversation_bonus_capped() {
        let config = EngagementConfig::default();
        let mut acc = EngagementAccumulator::new(config.clone());
        let message = config.conversation.positive_keywords.join(" ").repeat(20);
        for i in 0..100 {
            acc.on_turn(&message, t(i * 5_000));
        }
        assert!((acc.details().bonuses.conversation - 8.5).abs() < 1e-9);
    }

    #[test]
    fn test_streak_grows_then_decays_slower() {
        let mut acc = EngagementAccumulator::default();
        for i in 0..10 {
            acc.observe(EngagementDimension::Posture, 90.0, t(i * 100));
        }
        let grown = acc.details().bonuses.posture;
        assert!((grown - 0.3).abs() < 1e-9);

        acc.observe(EngagementDimension::Posture, 10.0, t(1_100));
        let details = acc.details();
        assert_eq!(details.streaks.posture, 9);
        assert!((grown - details.bonuses.posture - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_streak_floor_at_zero() {
        let mut acc = EngagementAccumulator::default();
        for i in 0..3 {
            acc.observe(EngagementDimension::Gaze, 0.0, t(i * 100));
        }
        assert_eq!(acc.details().streaks.gaze, 0);
        assert_eq!(acc.details().bonuses.gaze, 0.0);
        assert_eq!(acc.score(), 50.0);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let mut acc = EngagementAccumulator::default();
        acc.observe(EngagementDimension::Expression, 75.0, t(0));
        assert_eq!(acc.details().streaks.expression, 1);
    }

    #[test]
    fn test_milestone_extra() {
        let mut acc = EngagementAccumulator::default();
        for i in 0..15 {
            acc.observe(EngagementDimension::Expression, 80.0, t(i * 200));
        }
        let details = acc.details();
        assert_eq!(details.bonuses.milestones, 1.0);
        // 50 + 15*0.05 + 1.0
        assert!((details.score - 51.75).abs() < 1e-9);
        assert_eq!(details.last_boost.map(|b| b.kind), Some(BoostKind::Expression));
    }

    #[test]
    fn test_milestones_share_cooldown() {
        let mut acc = EngagementAccumulator::default();
        acc.on_turn("hi", t(0));
        // Expression milestone lands inside the guard window of the turn boost
        for i in 0..15 {
            acc.observe(EngagementDimension::Expression, 80.0, t(i * 10));
        }
        assert_eq!(acc.details().bonuses.milestones, 0.0);

        // Next milestone after the window is accepted
        for i in 0..15 {
            acc.observe(EngagementDimension::Expression, 80.0, t(3_000 + i * 10));
        }
        assert_eq!(acc.details().bonuses.milestones, 1.0);
    }

    #[test]
    fn test_affinity_levels() {
        assert_eq!(AffinityLevel::from_score(95.0), AffinityLevel::Perfect);
        assert_eq!(AffinityLevel::from_score(80.0), AffinityLevel::Charmed);
        assert_eq!(AffinityLevel::from_score(59.9), AffinityLevel::Neutral);
        assert_eq!(AffinityLevel::from_score(20.0), AffinityLevel::Indifferent);
        assert_eq!(AffinityLevel::from_score(0.0), AffinityLevel::Cold);
    }

    #[test]
    fn test_config_rejects_fast_decay() {
        let mut config = EngagementConfig::default();
        assert!(config.validate().is_ok());
        config.gaze.decay = 0.05;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reset() {
        let mut acc = EngagementAccumulator::default();
        acc.on_turn("좋아요", t(0));
        acc.reset();
        assert_eq!(acc.score(), 50.0);
        assert!(acc.last_boost().is_none());
    }
}
