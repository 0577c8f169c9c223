//! Conversational initiative
//!
//! Scores how much the user leads the conversation relative to the assistant,
//! from message counts, message lengths, question counts and who opened.

use serde::{Deserialize, Serialize};

/// Interrogative words counted as questions
const QUESTION_WORDS: &[&str] = &[
    "어떻게", "무엇", "언제", "어디서", "왜", "누가", "어떤", "얼마나", "몇", "어떠한",
];

/// Interrogative sentence endings counted as questions
const QUESTION_ENDINGS: &[&str] = &["인가요", "일까요", "겠어요", "인가?", "일까?", "겠어?"];

const OPENER_USER: f64 = 10.0;
const OPENER_QUESTION: f64 = 5.0;
const OPENER_ASSISTANT: f64 = -10.0;

/// Who sent a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
        }
    }
}

/// Count question markers in a message
///
/// Each question mark (ASCII or full-width), interrogative word and
/// interrogative ending adds one.
pub fn count_questions(text: &str) -> usize {
    let marks = text.chars().filter(|c| *c == '?' || *c == '？').count();
    let words: usize = QUESTION_WORDS.iter().map(|w| text.matches(w).count()).sum();
    let endings: usize = QUESTION_ENDINGS.iter().map(|e| text.matches(e).count()).sum();
    marks + words + endings
}

/// Qualitative initiative band
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitiativeLevel {
    VeryActive,
    Active,
    Balanced,
    Passive,
    VeryPassive,
}

impl InitiativeLevel {
    pub fn from_score(score: u8) -> Self {
        match score {
            80.. => InitiativeLevel::VeryActive,
            65..=79 => InitiativeLevel::Active,
            45..=64 => InitiativeLevel::Balanced,
            30..=44 => InitiativeLevel::Passive,
            _ => InitiativeLevel::VeryPassive,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCounts {
    pub messages: usize,
    pub characters: usize,
    pub questions: usize,
}

/// Counts and percentage shares behind the score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitiativeStats {
    pub score: u8,
    pub level: InitiativeLevel,
    pub user: RoleCounts,
    pub assistant: RoleCounts,
    pub message_share: f64,
    pub length_share: f64,
    pub question_share: f64,
    pub opener_bonus: f64,
}

/// Running initiative analysis over a transcript
#[derive(Debug, Clone, Default)]
pub struct InitiativeAnalyzer {
    user: RoleCounts,
    assistant: RoleCounts,
    opener_bonus: Option<f64>,
}

/// User percentage of a user/assistant pair, 50 when both are zero
fn share(user: usize, assistant: usize) -> f64 {
    let total = user + assistant;
    if total == 0 {
        50.0
    } else {
        user as f64 / total as f64 * 100.0
    }
}

impl InitiativeAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a whole transcript
    pub fn from_turns<'a>(turns: impl IntoIterator<Item = &'a Turn>) -> Self {
        let mut analyzer = Self::new();
        for turn in turns {
            analyzer.push(turn);
        }
        analyzer
    }

    /// Append one turn and return the updated score
    pub fn push(&mut self, turn: &Turn) -> u8 {
        let questions = count_questions(&turn.text);

        if self.opener_bonus.is_none() {
            self.opener_bonus = Some(match turn.role {
                Role::User if questions > 0 => OPENER_USER + OPENER_QUESTION,
                Role::User => OPENER_USER,
                Role::Assistant => OPENER_ASSISTANT,
                Role::System => 0.0,
            });
        }

        let counts = match turn.role {
            Role::User => &mut self.user,
            Role::Assistant => &mut self.assistant,
            Role::System => return self.score(),
        };
        counts.messages += 1;
        counts.characters += turn.text.chars().count();
        counts.questions += questions;

        self.score()
    }

    pub fn turn_count(&self) -> usize {
        self.user.messages + self.assistant.messages
    }

    pub fn score(&self) -> u8 {
        if self.turn_count() == 0 {
            return 50;
        }
        let raw = 50.0
            + (self.message_share() - 50.0) * 0.3
            + (self.length_share() - 50.0) * 0.25
            + (self.question_share() - 50.0) * 0.25
            + self.opener_bonus.unwrap_or(0.0) * 0.2;
        raw.clamp(0.0, 100.0).round() as u8
    }

    pub fn level(&self) -> InitiativeLevel {
        InitiativeLevel::from_score(self.score())
    }

    fn message_share(&self) -> f64 {
        share(self.user.messages, self.assistant.messages)
    }

    fn length_share(&self) -> f64 {
        share(self.user.characters, self.assistant.characters)
    }

    fn question_share(&self) -> f64 {
        share(self.user.questions, self.assistant.questions)
    }

    pub fn stats(&self) -> InitiativeStats {
        InitiativeStats {
            score: self.score(),
            level: self.level(),
            user: self.user,
            assistant: self.assistant,
            message_share: self.message_share(),
            length_share: self.length_share(),
            question_share: self.question_share(),
            opener_bonus: self.opener_bonus.unwrap_or(0.0),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_transcript() {
        let analyzer = InitiativeAnalyzer::new();
        assert_eq!(analyzer.score(), 50);
        assert_eq!(analyzer.level(), InitiativeLevel::Balanced);
    }

    #[test]
    fn test_question_counting() {
        assert_eq!(count_questions("hello"), 0);
        assert_eq!(count_questions("really?"), 1);
        assert_eq!(count_questions("정말？"), 1);
        assert_eq!(count_questions("어떻게 지내세요"), 1);
        // word + ending
        assert_eq!(count_questions("무엇인가요"), 2);
    }

    #[test]
    fn test_user_led_conversation_scores_high() {
        let turns = vec![
            Turn::new(Role::User, "Hi! What did you do this weekend?"),
            Turn::new(Role::Assistant, "Went hiking."),
            Turn::new(Role::User, "That sounds lovely, where did you go and how long was the trail?"),
            Turn::new(Role::Assistant, "A short loop."),
        ];
        let analyzer = InitiativeAnalyzer::from_turns(&turns);
        let stats = analyzer.stats();
        assert_eq!(stats.opener_bonus, 15.0);
        assert_eq!(stats.message_share, 50.0);
        assert_eq!(stats.question_share, 100.0);
        assert!(analyzer.score() > 50);
    }

    #[test]
    fn test_assistant_opener_penalty() {
        let mut analyzer = InitiativeAnalyzer::new();
        analyzer.push(&Turn::new(Role::Assistant, "hello"));
        analyzer.push(&Turn::new(Role::User, "hello"));
        // 50 + 0 + 0 + 0 - 10*0.2
        assert_eq!(analyzer.score(), 48);
    }

    #[test]
    fn test_system_turns_not_counted() {
        let mut analyzer = InitiativeAnalyzer::new();
        analyzer.push(&Turn::new(Role::System, "session started"));
        assert_eq!(analyzer.turn_count(), 0);
        assert_eq!(analyzer.score(), 50);
        analyzer.push(&Turn::new(Role::User, "hi"));
        // opener was the system turn, so no bonus; user holds every share
        // 50 + 15 + 12.5 + 0
        assert_eq!(analyzer.score(), 78);
        assert_eq!(analyzer.level(), InitiativeLevel::Active);
    }

    #[test]
    fn test_monologue_clamps() {
        let mut analyzer = InitiativeAnalyzer::new();
        for _ in 0..5 {
            analyzer.push(&Turn::new(Role::User, "왜? 언제? 어디서?"));
        }
        // 50 + 15 + 12.5 + 12.5 + 3
        assert_eq!(analyzer.score(), 93);
        assert_eq!(analyzer.level(), InitiativeLevel::VeryActive);
        analyzer.reset();
        assert_eq!(analyzer.turn_count(), 0);
    }
}
