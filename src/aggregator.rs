//! Weighted composite scoring
//!
//! Seven sub-scores in three categories (visual, auditory, conversational) are
//! averaged per category and combined with fixed weights. The composite stays in
//! a "collecting" state until every sub-score has been reported with a strictly
//! positive value at least once.
//!
//! Known quirk: an item whose only reports are genuine zeros never counts as
//! received, so it blocks the composite indefinitely.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::ComputeError;

/// Score category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreCategory {
    Visual,
    Auditory,
    Conversational,
}

/// Individually tracked sub-score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreItem {
    Expression,
    GazeStability,
    Posture,
    Blinking,
    Tone,
    Concentration,
    Initiative,
}

impl ScoreItem {
    pub const ALL: [ScoreItem; 7] = [
        ScoreItem::Expression,
        ScoreItem::GazeStability,
        ScoreItem::Posture,
        ScoreItem::Blinking,
        ScoreItem::Tone,
        ScoreItem::Concentration,
        ScoreItem::Initiative,
    ];

    pub fn category(&self) -> ScoreCategory {
        match self {
            ScoreItem::Expression
            | ScoreItem::GazeStability
            | ScoreItem::Posture
            | ScoreItem::Blinking => ScoreCategory::Visual,
            ScoreItem::Tone | ScoreItem::Concentration => ScoreCategory::Auditory,
            ScoreItem::Initiative => ScoreCategory::Conversational,
        }
    }

    fn index(&self) -> usize {
        match self {
            ScoreItem::Expression => 0,
            ScoreItem::GazeStability => 1,
            ScoreItem::Posture => 2,
            ScoreItem::Blinking => 3,
            ScoreItem::Tone => 4,
            ScoreItem::Concentration => 5,
            ScoreItem::Initiative => 6,
        }
    }
}

/// Category weights for the composite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationWeights {
    pub visual: f64,
    pub auditory: f64,
    pub conversational: f64,
}

impl Default for AggregationWeights {
    fn default() -> Self {
        Self {
            visual: 0.55,
            auditory: 0.38,
            conversational: 0.07,
        }
    }
}

impl AggregationWeights {
    pub fn for_category(&self, category: ScoreCategory) -> f64 {
        match category {
            ScoreCategory::Visual => self.visual,
            ScoreCategory::Auditory => self.auditory,
            ScoreCategory::Conversational => self.conversational,
        }
    }

    pub fn validate(&self) -> Result<(), ComputeError> {
        let all = [self.visual, self.auditory, self.conversational];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ComputeError::InvalidConfig(
                "aggregation: weights must be finite and non-negative".to_string(),
            ));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ComputeError::InvalidConfig(format!(
                "aggregation: weights must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Aggregation result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AggregateState {
    /// Not every sub-score has reported yet
    Collecting { missing: Vec<ScoreCategory> },
    Ready { composite: u8 },
}

impl AggregateState {
    pub fn composite(&self) -> Option<u8> {
        match self {
            AggregateState::Ready { composite } => Some(*composite),
            AggregateState::Collecting { .. } => None,
        }
    }
}

/// Per-category detail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub category: ScoreCategory,
    pub average: f64,
    pub weight: f64,
    pub contribution: f64,
    pub items: Vec<ItemScore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemScore {
    pub item: ScoreItem,
    pub score: f64,
    pub received: bool,
    pub updates: u32,
}

/// Detailed view of the aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateBreakdown {
    pub state: AggregateState,
    pub categories: Vec<CategoryBreakdown>,
}

/// Push-model weighted aggregator
#[derive(Debug, Clone, Default)]
pub struct WeightedAggregator {
    weights: AggregationWeights,
    scores: [f64; 7],
    received: [bool; 7],
    updates: [u32; 7],
    last_composite: Option<u8>,
}

impl WeightedAggregator {
    pub fn new(weights: AggregationWeights) -> Self {
        Self {
            weights,
            ..Default::default()
        }
    }

    /// Record a sub-score (clamped to 0-100) and re-aggregate
    pub fn update(&mut self, item: ScoreItem, score: f64) -> AggregateState {
        let score = if score.is_finite() {
            score.clamp(0.0, 100.0)
        } else {
            0.0
        };
        let i = item.index();
        self.scores[i] = score;
        self.updates[i] = self.updates[i].saturating_add(1);
        if score > 0.0 {
            self.received[i] = true;
        }
        self.recompute()
    }

    pub fn score(&self, item: ScoreItem) -> f64 {
        self.scores[item.index()]
    }

    pub fn state(&self) -> AggregateState {
        match self.last_composite {
            Some(composite) if self.missing_categories().is_empty() => {
                AggregateState::Ready { composite }
            }
            _ => AggregateState::Collecting {
                missing: self.missing_categories(),
            },
        }
    }

    fn missing_categories(&self) -> Vec<ScoreCategory> {
        let mut missing = Vec::new();
        for item in ScoreItem::ALL {
            let category = item.category();
            if !self.received[item.index()] && !missing.contains(&category) {
                missing.push(category);
            }
        }
        missing
    }

    fn category_average(&self, category: ScoreCategory) -> f64 {
        let values: Vec<f64> = ScoreItem::ALL
            .iter()
            .filter(|item| item.category() == category)
            .map(|item| self.scores[item.index()])
            .collect();
        values.iter().sum::<f64>() / values.len() as f64
    }

    fn recompute(&mut self) -> AggregateState {
        if !self.received.iter().all(|r| *r) {
            return self.state();
        }
        let raw: f64 = [
            ScoreCategory::Visual,
            ScoreCategory::Auditory,
            ScoreCategory::Conversational,
        ]
        .iter()
        .map(|c| self.category_average(*c) * self.weights.for_category(*c))
        .sum();
        let composite = raw.clamp(0.0, 100.0).round() as u8;
        if self.last_composite != Some(composite) {
            debug!("composite score {composite}");
        }
        self.last_composite = Some(composite);
        self.state()
    }

    pub fn breakdown(&self) -> AggregateBreakdown {
        let categories = [
            ScoreCategory::Visual,
            ScoreCategory::Auditory,
            ScoreCategory::Conversational,
        ]
        .iter()
        .map(|&category| {
            let average = self.category_average(category);
            let weight = self.weights.for_category(category);
            CategoryBreakdown {
                category,
                average,
                weight,
                contribution: average * weight,
                items: ScoreItem::ALL
                    .iter()
                    .filter(|item| item.category() == category)
                    .map(|&item| ItemScore {
                        item,
                        score: self.scores[item.index()],
                        received: self.received[item.index()],
                        updates: self.updates[item.index()],
                    })
                    .collect(),
            }
        })
        .collect();
        AggregateBreakdown {
            state: self.state(),
            categories,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.weights.clone());
    }
}
