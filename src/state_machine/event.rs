//! Events that can occur in a survey conversation

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Once-per-tick nudge: ask the next question or finish
    Advance,
    /// A plain message from the participant in their direct channel
    Answer { text: String },
}

impl Event {
    pub fn answer(text: impl Into<String>) -> Self {
        Event::Answer { text: text.into() }
    }
}
