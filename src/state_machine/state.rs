//! Conversation state types

use crate::platform::{ChannelId, UserId};
use crate::survey::Questionnaire;
use std::sync::Arc;

/// Conversation state.
///
/// Every variant carries the answers collected so far; the number of
/// answers is the index of the next question to ask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConvState {
    /// Between questions: the next advance asks a question or finishes
    Waiting { answers: Vec<String> },

    /// Question `answers.len()` was sent, waiting for exactly one reply
    Responding { answers: Vec<String> },

    /// All questions answered (terminal)
    Done { answers: Vec<String> },
}

impl Default for ConvState {
    fn default() -> Self {
        ConvState::Waiting {
            answers: Vec::new(),
        }
    }
}

impl ConvState {
    pub fn answers(&self) -> &[String] {
        match self {
            ConvState::Waiting { answers }
            | ConvState::Responding { answers }
            | ConvState::Done { answers } => answers,
        }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn is_responding(&self) -> bool {
        matches!(self, ConvState::Responding { .. })
    }

    pub fn is_done(&self) -> bool {
        matches!(self, ConvState::Done { .. })
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ConvState::Waiting { .. } => "waiting",
            ConvState::Responding { .. } => "responding",
            ConvState::Done { .. } => "done",
        }
    }
}

/// Context for a conversation (immutable for the whole cycle)
#[derive(Debug, Clone)]
pub struct ConvContext {
    pub user_id: UserId,
    /// Direct channel questions are asked in and answers arrive on
    pub channel: ChannelId,
    pub questionnaire: Arc<Questionnaire>,
}

impl ConvContext {
    pub fn new(user_id: UserId, channel: ChannelId, questionnaire: Arc<Questionnaire>) -> Self {
        Self {
            user_id,
            channel,
            questionnaire,
        }
    }

    pub fn question_count(&self) -> usize {
        self.questionnaire.question_count()
    }
}
