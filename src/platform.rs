//! Chat platform abstraction
//!
//! The report cycle only talks to the platform through [`ChatPlatform`],
//! so tests can drive it with an in-memory fake.

mod error;
pub mod slack;
mod types;

pub use error::{ChatError, ChatErrorKind};
pub use slack::{SlackConfig, SlackPlatform};
pub use types::*;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Capabilities consumed from the chat platform
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Enumerate every member of the workspace, service accounts included
    async fn list_participants(&self) -> Result<Vec<Participant>, ChatError>;

    /// Open (or reuse) the private channel with a member
    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId, ChatError>;

    /// Deliver a message
    async fn post_message(&self, message: &OutboundMessage) -> Result<PostedMessage, ChatError>;

    /// Events received since the previous poll
    async fn poll_inbound_events(&self) -> Result<Vec<InboundEvent>, ChatError>;
}

#[async_trait]
impl<T: ChatPlatform + ?Sized> ChatPlatform for Arc<T> {
    async fn list_participants(&self) -> Result<Vec<Participant>, ChatError> {
        (**self).list_participants().await
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId, ChatError> {
        (**self).open_direct_channel(user).await
    }

    async fn post_message(&self, message: &OutboundMessage) -> Result<PostedMessage, ChatError> {
        (**self).post_message(message).await
    }

    async fn poll_inbound_events(&self) -> Result<Vec<InboundEvent>, ChatError> {
        (**self).poll_inbound_events().await
    }
}

/// Logging wrapper for chat platforms
pub struct LoggingPlatform<P> {
    inner: P,
}

impl<P: ChatPlatform> LoggingPlatform<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }
}

fn log_outcome<T>(operation: &str, start: Instant, result: &Result<T, ChatError>) {
    let duration = start.elapsed();
    match result {
        Ok(_) => {
            tracing::debug!(
                operation,
                duration_ms = %duration.as_millis(),
                "Chat platform call completed"
            );
        }
        Err(e) => {
            tracing::error!(
                operation,
                duration_ms = %duration.as_millis(),
                kind = %e.kind,
                error = %e.message,
                "Chat platform call failed"
            );
        }
    }
}

#[async_trait]
impl<P: ChatPlatform> ChatPlatform for LoggingPlatform<P> {
    async fn list_participants(&self) -> Result<Vec<Participant>, ChatError> {
        let start = Instant::now();
        let result = self.inner.list_participants().await;
        log_outcome("list_participants", start, &result);
        if let Ok(participants) = &result {
            tracing::info!(count = participants.len(), "Listed workspace members");
        }
        result
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId, ChatError> {
        let start = Instant::now();
        let result = self.inner.open_direct_channel(user).await;
        log_outcome("open_direct_channel", start, &result);
        result
    }

    async fn post_message(&self, message: &OutboundMessage) -> Result<PostedMessage, ChatError> {
        let start = Instant::now();
        let result = self.inner.post_message(message).await;
        log_outcome("post_message", start, &result);
        result
    }

    async fn poll_inbound_events(&self) -> Result<Vec<InboundEvent>, ChatError> {
        let start = Instant::now();
        let result = self.inner.poll_inbound_events().await;
        log_outcome("poll_inbound_events", start, &result);
        result
    }
}
