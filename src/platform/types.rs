//! Chat platform data types

use std::fmt;

/// Opaque participant handle
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UserId(pub String);

/// Opaque channel handle (direct or shared)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChannelId(pub String);

impl UserId {
    #[allow(dead_code)] // Useful for tests
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ChannelId {
    #[allow(dead_code)] // Useful for tests
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A member of the workspace directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: UserId,
    /// Bots, deactivated accounts and the platform's own system user
    pub is_service_account: bool,
    pub display_name: String,
    pub avatar_url: String,
}

impl Participant {
    pub fn attribution(&self) -> Attribution {
        Attribution {
            name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
        }
    }
}

/// Name and avatar a posted message is displayed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub name: String,
    pub avatar_url: String,
}

/// A message to deliver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: ChannelId,
    pub text: String,
    /// Thread root timestamp to reply under
    pub thread_ts: Option<String>,
    pub attribution: Option<Attribution>,
}

impl OutboundMessage {
    pub fn new(channel: ChannelId, text: impl Into<String>) -> Self {
        Self {
            channel,
            text: text.into(),
            thread_ts: None,
            attribution: None,
        }
    }

    pub fn in_thread(mut self, thread_ts: impl Into<String>) -> Self {
        self.thread_ts = Some(thread_ts.into());
        self
    }

    pub fn attributed_to(mut self, attribution: Attribution) -> Self {
        self.attribution = Some(attribution);
        self
    }
}

/// Handle to a delivered message; `ts` doubles as the thread id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostedMessage {
    pub channel: ChannelId,
    pub ts: String,
}

/// An inbound chat event as received from the platform.
///
/// Fields are optional because the platform does not guarantee them;
/// consumers go through [`InboundEvent::plain_message`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundEvent {
    pub channel: Option<ChannelId>,
    pub text: Option<String>,
    /// Set for joins, edits, bot posts and other system messages
    pub subtype: Option<String>,
}

impl InboundEvent {
    #[allow(dead_code)] // Useful for tests
    pub fn message(channel: ChannelId, text: impl Into<String>) -> Self {
        Self {
            channel: Some(channel),
            text: Some(text.into()),
            subtype: None,
        }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn system(channel: ChannelId, subtype: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            channel: Some(channel),
            text: Some(text.into()),
            subtype: Some(subtype.into()),
        }
    }

    /// Channel and text of a plain user message, `None` for system
    /// subtypes and malformed events.
    pub fn plain_message(&self) -> Option<(&ChannelId, &str)> {
        if self.subtype.is_some() {
            return None;
        }
        Some((self.channel.as_ref()?, self.text.as_deref()?))
    }
}
