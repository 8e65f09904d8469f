//! Runtime for executing report cycles
//!
//! A cycle opens one conversation per eligible member, then polls in a
//! fixed-period loop (dispatch, advance, publish) until every
//! conversation is done.

mod dispatch;
mod executor;
mod publisher;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{Conversation, ReportCycle};
pub use traits::*;

use crate::platform::{ChatError, ChannelId, UserId};
use crate::survey::Questionnaire;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Default poll-loop period
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Fixed inputs shared by every cycle
#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub results_channel: ChannelId,
    pub questionnaire: Arc<Questionnaire>,
    pub tick_period: Duration,
}

/// Setup failures; the cycle is abandoned before any question is asked
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("failed to list participants: {0}")]
    ListParticipants(#[source] ChatError),
    #[error("failed to open direct channel with {user}: {source}")]
    OpenChannel {
        user: UserId,
        #[source]
        source: ChatError,
    },
}

/// How a cycle's poll loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Every conversation reached done and was published
    Completed { published: usize },
    /// Shutdown was requested while conversations were still open
    Cancelled,
}
