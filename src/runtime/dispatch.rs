//! Routing of inbound chat events to conversations

use super::Conversation;
use crate::platform::{ChannelId, InboundEvent, UserId};
use crate::state_machine::{Event, TransitionError};
use std::collections::{BTreeMap, HashMap};

/// What happened to one tick's event batch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Events recorded as answers
    pub applied: usize,
    /// System messages, malformed events and stray messages
    pub ignored: usize,
}

/// Feed a batch of inbound events to the conversations they belong to.
///
/// Only plain messages on a conversation's direct channel count, and only
/// while that conversation is responding. Because an answer moves the
/// conversation back to waiting, a second message in the same batch for
/// the same conversation is dropped.
pub fn dispatch_events(
    conversations: &mut BTreeMap<UserId, Conversation>,
    channel_index: &HashMap<ChannelId, UserId>,
    events: Vec<InboundEvent>,
) -> DispatchSummary {
    let mut summary = DispatchSummary::default();

    for event in events {
        let Some((channel, text)) = event.plain_message() else {
            summary.ignored += 1;
            continue;
        };
        let Some(conversation) = channel_index
            .get(channel)
            .and_then(|user| conversations.get_mut(user))
        else {
            summary.ignored += 1;
            continue;
        };

        match conversation.apply(Event::answer(text)) {
            Ok(_) => {
                summary.applied += 1;
                tracing::info!(
                    user_id = %conversation.user_id(),
                    answered = conversation.state().answers().len(),
                    "Answer recorded"
                );
            }
            Err(TransitionError::InvalidTransition(reason)) => {
                summary.ignored += 1;
                tracing::warn!(user_id = %conversation.user_id(), %reason, "Answer rejected");
            }
            Err(e) => {
                summary.ignored += 1;
                tracing::debug!(user_id = %conversation.user_id(), reason = %e, "Message ignored");
            }
        }
    }

    summary
}
