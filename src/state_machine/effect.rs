//! Effects produced by state transitions

use crate::platform::{ChannelId, OutboundMessage};

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Post a question to the participant's direct channel
    SendQuestion {
        channel: ChannelId,
        index: usize,
        text: String,
    },
}

impl Effect {
    pub fn to_message(&self) -> OutboundMessage {
        match self {
            Effect::SendQuestion { channel, text, .. } => {
                OutboundMessage::new(channel.clone(), text.clone())
            }
        }
    }
}
