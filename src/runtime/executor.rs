//! Report cycle executor

use super::dispatch::dispatch_events;
use super::publisher::ResultPublisher;
use super::traits::Sleeper;
use super::{CycleError, CycleOutcome, CycleSettings};

use crate::platform::{ChannelId, ChatPlatform, OutboundMessage, Participant, UserId};
use crate::state_machine::{transition, ConvContext, ConvState, Effect, Event, TransitionError};
use crate::survey::Questionnaire;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// One participant's conversation for the current cycle
#[derive(Debug)]
pub struct Conversation {
    participant: Participant,
    context: ConvContext,
    state: ConvState,
}

impl Conversation {
    pub fn new(
        participant: Participant,
        channel: ChannelId,
        questionnaire: Arc<Questionnaire>,
    ) -> Self {
        let context = ConvContext::new(participant.id.clone(), channel, questionnaire);
        Self {
            participant,
            context,
            state: ConvState::default(),
        }
    }

    pub fn participant(&self) -> &Participant {
        &self.participant
    }

    pub fn user_id(&self) -> &UserId {
        &self.context.user_id
    }

    pub fn channel(&self) -> &ChannelId {
        &self.context.channel
    }

    pub fn state(&self) -> &ConvState {
        &self.state
    }

    /// Run one transition and keep the new state; effects are left to
    /// the caller.
    pub fn apply(&mut self, event: Event) -> Result<Vec<Effect>, TransitionError> {
        let result = transition(&self.state, &self.context, event)?;
        if result.new_state.name() != self.state.name() {
            tracing::debug!(
                user_id = %self.context.user_id,
                from = self.state.name(),
                to = result.new_state.name(),
                "Conversation state changed"
            );
        }
        self.state = result.new_state;
        Ok(result.effects)
    }
}

/// A single survey run across all eligible participants
pub struct ReportCycle<P: ChatPlatform> {
    id: Uuid,
    platform: P,
    settings: Arc<CycleSettings>,
    conversations: BTreeMap<UserId, Conversation>,
    /// Direct channel -> owning participant, for event routing
    channel_index: HashMap<ChannelId, UserId>,
    publisher: ResultPublisher,
    ticks: u64,
}

impl<P: ChatPlatform> ReportCycle<P> {
    /// Enumerate participants, open their direct channels, then greet
    /// everyone and ask the first question.
    ///
    /// Directory and channel failures abort before anything is sent, so a
    /// cycle never runs on a partial participant list.
    pub async fn start(platform: P, settings: Arc<CycleSettings>) -> Result<Self, CycleError> {
        let id = Uuid::new_v4();
        let participants = platform
            .list_participants()
            .await
            .map_err(CycleError::ListParticipants)?;

        let mut conversations = BTreeMap::new();
        let mut channel_index = HashMap::new();
        for participant in participants.into_iter().filter(|p| !p.is_service_account) {
            let channel = platform
                .open_direct_channel(&participant.id)
                .await
                .map_err(|source| CycleError::OpenChannel {
                    user: participant.id.clone(),
                    source,
                })?;
            channel_index.insert(channel.clone(), participant.id.clone());
            conversations.insert(
                participant.id.clone(),
                Conversation::new(participant, channel, settings.questionnaire.clone()),
            );
        }

        tracing::info!(cycle_id = %id, participants = conversations.len(), "Report cycle started");

        let mut cycle = Self {
            id,
            publisher: ResultPublisher::new(settings.results_channel.clone()),
            platform,
            settings,
            conversations,
            channel_index,
            ticks: 0,
        };
        cycle.send_greetings().await;
        Ok(cycle)
    }

    async fn send_greetings(&mut self) {
        let users: Vec<UserId> = self.conversations.keys().cloned().collect();
        for user in users {
            let Some(conversation) = self.conversations.get(&user) else {
                continue;
            };
            let greeting = OutboundMessage::new(
                conversation.channel().clone(),
                self.settings.questionnaire.greeting.as_str(),
            );
            if let Err(e) = self.platform.post_message(&greeting).await {
                tracing::error!(cycle_id = %self.id, user_id = %user, error = %e, "Failed to send greeting");
            }
            self.advance(&user).await;
        }
    }

    /// Advance one conversation and execute the resulting effects
    async fn advance(&mut self, user: &UserId) {
        let Some(conversation) = self.conversations.get_mut(user) else {
            return;
        };
        let was_done = conversation.state().is_done();
        let effects = match conversation.apply(Event::Advance) {
            Ok(effects) => effects,
            Err(e) => {
                tracing::warn!(cycle_id = %self.id, user_id = %user, error = %e, "Advance rejected");
                return;
            }
        };
        if !was_done && conversation.state().is_done() {
            tracing::info!(cycle_id = %self.id, user_id = %user, "Conversation finished");
        }
        for effect in effects {
            self.execute_effect(user, effect).await;
        }
    }

    async fn execute_effect(&self, user: &UserId, effect: Effect) {
        let message = effect.to_message();
        match effect {
            Effect::SendQuestion { index, .. } => {
                match self.platform.post_message(&message).await {
                    Ok(_) => {
                        tracing::info!(cycle_id = %self.id, user_id = %user, index, "Question sent");
                    }
                    Err(e) => {
                        tracing::error!(
                            cycle_id = %self.id,
                            user_id = %user,
                            index,
                            error = %e,
                            "Failed to send question"
                        );
                    }
                }
            }
        }
    }

    /// One poll-loop iteration: fetch, dispatch, advance, publish.
    /// Returns whether the cycle is complete.
    pub async fn tick(&mut self) -> bool {
        self.ticks += 1;

        let events = match self.platform.poll_inbound_events().await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(cycle_id = %self.id, error = %e, "Failed to poll inbound events");
                Vec::new()
            }
        };
        let summary = dispatch_events(&mut self.conversations, &self.channel_index, events);
        if summary.applied > 0 || summary.ignored > 0 {
            tracing::debug!(
                cycle_id = %self.id,
                tick = self.ticks,
                applied = summary.applied,
                ignored = summary.ignored,
                "Dispatched inbound events"
            );
        }

        let users: Vec<UserId> = self.conversations.keys().cloned().collect();
        for user in &users {
            self.advance(user).await;
        }

        self.publisher
            .publish(
                &self.platform,
                &self.settings.questionnaire,
                &self.conversations,
            )
            .await;

        self.is_complete()
    }

    /// Every conversation done (vacuously true with no participants)
    pub fn is_complete(&self) -> bool {
        self.conversations.values().all(|c| c.state().is_done())
    }

    /// Tick until complete, sleeping one period between ticks.
    ///
    /// A participant who never answers keeps the cycle open; only
    /// `cancel` ends it early.
    pub async fn run<S: Sleeper + ?Sized>(
        mut self,
        sleeper: &S,
        cancel: &CancellationToken,
    ) -> CycleOutcome {
        loop {
            if self.tick().await {
                let published = self.publisher.published_count();
                tracing::info!(cycle_id = %self.id, ticks = self.ticks, published, "Report cycle complete");
                return CycleOutcome::Completed { published };
            }

            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let pending = self.conversations.values().filter(|c| !c.state().is_done()).count();
                    tracing::warn!(cycle_id = %self.id, pending, "Report cycle cancelled");
                    return CycleOutcome::Cancelled;
                }
                () = sleeper.sleep(self.settings.tick_period) => {}
            }
        }
    }

    #[allow(dead_code)] // Useful for tests
    pub fn conversation(&self, user: &UserId) -> Option<&Conversation> {
        self.conversations.get(user)
    }

    #[allow(dead_code)] // Useful for tests
    pub fn participant_count(&self) -> usize {
        self.conversations.len()
    }

    #[allow(dead_code)] // Useful for tests
    pub fn results_thread(&self) -> Option<&str> {
        self.publisher.results_thread()
    }

    #[allow(dead_code)] // Useful for tests
    pub fn is_published(&self, user: &UserId) -> bool {
        self.publisher.is_published(user)
    }
}
