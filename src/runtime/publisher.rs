//! Publication of finished conversations to the shared results thread

use super::Conversation;
use crate::platform::{ChannelId, ChatPlatform, OutboundMessage, UserId};
use crate::survey::Questionnaire;
use std::collections::{BTreeMap, HashSet};

/// Posts each finished conversation exactly once.
///
/// Sole owner of the results thread handle for a cycle. The thread is
/// created lazily by the first publication and reused afterwards.
#[derive(Debug)]
pub struct ResultPublisher {
    results_channel: ChannelId,
    results_thread: Option<String>,
    published: HashSet<UserId>,
}

impl ResultPublisher {
    pub fn new(results_channel: ChannelId) -> Self {
        Self {
            results_channel,
            results_thread: None,
            published: HashSet::new(),
        }
    }

    pub fn results_thread(&self) -> Option<&str> {
        self.results_thread.as_deref()
    }

    pub fn is_published(&self, user: &UserId) -> bool {
        self.published.contains(user)
    }

    pub fn published_count(&self) -> usize {
        self.published.len()
    }

    /// Publish every done, not yet published conversation. Returns how
    /// many were published by this call.
    ///
    /// Failed posts are logged and not re-attempted; the conversation
    /// still counts as published.
    pub async fn publish<P: ChatPlatform + ?Sized>(
        &mut self,
        platform: &P,
        questionnaire: &Questionnaire,
        conversations: &BTreeMap<UserId, Conversation>,
    ) -> usize {
        let mut count = 0;

        for (user, conversation) in conversations {
            if !conversation.state().is_done() || self.published.contains(user) {
                continue;
            }

            let finish = OutboundMessage::new(
                conversation.channel().clone(),
                questionnaire.finish_message.as_str(),
            );
            if let Err(e) = platform.post_message(&finish).await {
                tracing::error!(user_id = %user, error = %e, "Failed to send finish notice");
            }

            if let Some(thread_ts) = self.ensure_thread(platform, questionnaire).await {
                let entry = OutboundMessage::new(
                    self.results_channel.clone(),
                    questionnaire.transcript(conversation.state().answers()),
                )
                .in_thread(thread_ts)
                .attributed_to(conversation.participant().attribution());
                if let Err(e) = platform.post_message(&entry).await {
                    tracing::error!(user_id = %user, error = %e, "Failed to publish results");
                }
            }

            self.published.insert(user.clone());
            count += 1;
            tracing::info!(user_id = %user, "Results published");
        }

        count
    }

    async fn ensure_thread<P: ChatPlatform + ?Sized>(
        &mut self,
        platform: &P,
        questionnaire: &Questionnaire,
    ) -> Option<String> {
        if self.results_thread.is_none() {
            let root = OutboundMessage::new(
                self.results_channel.clone(),
                questionnaire.results_heading.as_str(),
            );
            match platform.post_message(&root).await {
                Ok(posted) => {
                    tracing::info!(channel = %self.results_channel, ts = %posted.ts, "Results thread created");
                    self.results_thread = Some(posted.ts);
                }
                Err(e) => {
                    tracing::error!(channel = %self.results_channel, error = %e, "Failed to create results thread");
                }
            }
        }
        self.results_thread.clone()
    }
}
