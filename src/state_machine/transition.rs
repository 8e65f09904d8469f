//! Pure state transition function

use super::{ConvContext, ConvState, Effect, Event};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No question is pending, answer ignored")]
    NotAwaitingAnswer,
    #[error("Conversation already finished")]
    Finished,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
///
/// Given the same inputs it always produces the same outputs, with no I/O.
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    let total = context.question_count();

    match (state, event) {
        // ============================================================
        // Advance
        // ============================================================

        // Waiting + Advance (all answered) -> Done
        (ConvState::Waiting { answers }, Event::Advance) if answers.len() >= total => {
            Ok(TransitionResult::new(ConvState::Done {
                answers: answers.clone(),
            }))
        }

        // Waiting + Advance -> Responding, ask the next question
        (ConvState::Waiting { answers }, Event::Advance) => {
            let index = answers.len();
            let text = context.questionnaire.question(index).ok_or_else(|| {
                TransitionError::InvalidTransition(format!("no question at index {index}"))
            })?;
            Ok(TransitionResult::new(ConvState::Responding {
                answers: answers.clone(),
            })
            .with_effect(Effect::SendQuestion {
                channel: context.channel.clone(),
                index,
                text: text.to_string(),
            }))
        }

        // Question already out, or finished: nothing to do
        (ConvState::Responding { .. } | ConvState::Done { .. }, Event::Advance) => {
            Ok(TransitionResult::new(state.clone()))
        }

        // ============================================================
        // Answers
        // ============================================================

        // Responding + Answer -> Waiting with the answer appended
        (ConvState::Responding { answers }, Event::Answer { text }) if answers.len() < total => {
            let mut answers = answers.clone();
            answers.push(text);
            Ok(TransitionResult::new(ConvState::Waiting { answers }))
        }

        (ConvState::Responding { answers }, Event::Answer { .. }) => {
            Err(TransitionError::InvalidTransition(format!(
                "responding with {} of {total} answers",
                answers.len()
            )))
        }

        (ConvState::Waiting { .. }, Event::Answer { .. }) => Err(TransitionError::NotAwaitingAnswer),

        (ConvState::Done { .. }, Event::Answer { .. }) => Err(TransitionError::Finished),
    }
}
