//! Heuristic emotional state
//!
//! Best-effort and non-authoritative: audio level, message punctuation and
//! explicit emotion messages all write the same slot, last write wins. A rule
//! that doesn't match leaves the previous value in place.

use serde::{Deserialize, Serialize};

use crate::robot::RobotState;

/// Level above which the avatar looks happy
const HAPPY_LEVEL: f32 = 0.7;

/// Level above which the avatar settles to neutral
const NEUTRAL_LEVEL: f32 = 0.4;

/// Emotional expression of the avatar
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalState {
    /// Resting expression
    #[default]
    Neutral,
    /// Energetic speech
    Happy,
    /// Remote peer is reasoning
    Thinking,
    /// A question was asked
    Confused,
    /// An exclamation was made
    Surprised,
}

impl std::fmt::Display for EmotionalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Neutral => "neutral",
            Self::Happy => "happy",
            Self::Thinking => "thinking",
            Self::Confused => "confused",
            Self::Surprised => "surprised",
        };
        f.pad(name)
    }
}

/// Keeps the current [`EmotionalState`] and applies the heuristics
#[derive(Debug, Clone, Default)]
pub struct EmotionClassifier {
    state: EmotionalState,
}

impl EmotionClassifier {
    /// Create a classifier at `Neutral`
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: EmotionalState::Neutral,
        }
    }

    /// Current emotional state
    #[must_use]
    pub const fn state(&self) -> EmotionalState {
        self.state
    }

    /// Apply the audio-level rule
    pub fn observe_level(&mut self, level: f32) {
        if level > HAPPY_LEVEL {
            self.set(EmotionalState::Happy);
        } else if level > NEUTRAL_LEVEL {
            self.set(EmotionalState::Neutral);
        }
    }

    /// Apply the punctuation rule to freshly received message content
    pub fn observe_message(&mut self, content: &str) {
        if content.contains('?') {
            self.set(EmotionalState::Confused);
        } else if content.contains('!') {
            self.set(EmotionalState::Surprised);
        }
    }

    /// Settle when the avatar stops speaking
    pub fn speaking_stopped(&mut self, robot: RobotState) {
        match robot {
            RobotState::Thinking => self.set(EmotionalState::Thinking),
            RobotState::Idle => self.set(EmotionalState::Neutral),
            _ => {}
        }
    }

    /// Overwrite the state
    pub fn set(&mut self, state: EmotionalState) {
        if self.state != state {
            tracing::trace!(from = %self.state, to = %state, "emotional state changed");
            self.state = state;
        }
    }

    /// Return to `Neutral`
    pub fn reset(&mut self) {
        self.state = EmotionalState::Neutral;
    }
}
