//! Fake implementations for testing
//!
//! These fakes enable cycle and scheduler tests without a chat platform
//! or real time.

use super::traits::{Clock, Sleeper};
use crate::platform::{
    ChannelId, ChatError, ChatErrorKind, ChatPlatform, InboundEvent, OutboundMessage, Participant,
    PostedMessage, UserId,
};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fake Chat Platform
// ============================================================================

pub fn member(id: &str, name: &str) -> Participant {
    Participant {
        id: UserId::new(id),
        is_service_account: false,
        display_name: name.to_string(),
        avatar_url: format!("https://avatars.test/{id}.png"),
    }
}

pub fn service_account(id: &str) -> Participant {
    Participant {
        is_service_account: true,
        ..member(id, id)
    }
}

/// Direct channel the fake opens for a member
pub fn dm(user: &str) -> ChannelId {
    ChannelId::new(format!("D-{user}"))
}

/// In-memory platform: scripted inbound batches, recorded outbound posts
#[derive(Default)]
pub struct FakePlatform {
    participants: Vec<Participant>,
    /// One batch is handed out per poll; empty once exhausted
    inbound: Mutex<VecDeque<Vec<InboundEvent>>>,
    posted: Mutex<Vec<OutboundMessage>>,
    opened: Mutex<Vec<UserId>>,
    failing_channels: Mutex<HashSet<ChannelId>>,
    fail_listing: Mutex<bool>,
    fail_open_for: Mutex<Option<UserId>>,
    fail_next_poll: Mutex<bool>,
    post_attempts: AtomicUsize,
    list_calls: AtomicUsize,
    polls: AtomicUsize,
}

impl FakePlatform {
    pub fn new(participants: Vec<Participant>) -> Self {
        Self {
            participants,
            ..Self::default()
        }
    }

    /// Queue the event batch returned by a future poll
    pub fn queue_events(&self, batch: Vec<InboundEvent>) {
        self.inbound.lock().unwrap().push_back(batch);
    }

    /// Queue a plain reply from a member on their direct channel
    pub fn queue_reply(&self, user: &str, text: &str) {
        self.queue_events(vec![InboundEvent::message(dm(user), text)]);
    }

    pub fn fail_listing(&self) {
        *self.fail_listing.lock().unwrap() = true;
    }

    pub fn fail_open_for(&self, user: &str) {
        *self.fail_open_for.lock().unwrap() = Some(UserId::new(user));
    }

    pub fn fail_posts_to(&self, channel: ChannelId) {
        self.failing_channels.lock().unwrap().insert(channel);
    }

    pub fn fail_next_poll(&self) {
        *self.fail_next_poll.lock().unwrap() = true;
    }

    /// Successfully delivered messages, in order
    pub fn posted_messages(&self) -> Vec<OutboundMessage> {
        self.posted.lock().unwrap().clone()
    }

    pub fn messages_to(&self, channel: &ChannelId) -> Vec<OutboundMessage> {
        self.posted_messages()
            .into_iter()
            .filter(|m| &m.channel == channel)
            .collect()
    }

    pub fn texts_to(&self, channel: &ChannelId) -> Vec<String> {
        self.messages_to(channel).into_iter().map(|m| m.text).collect()
    }

    pub fn opened_channels(&self) -> Vec<UserId> {
        self.opened.lock().unwrap().clone()
    }

    /// Deliveries attempted, failed ones included
    pub fn post_attempts(&self) -> usize {
        self.post_attempts.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatPlatform for FakePlatform {
    async fn list_participants(&self) -> Result<Vec<Participant>, ChatError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if *self.fail_listing.lock().unwrap() {
            return Err(ChatError::new(
                ChatErrorKind::Auth,
                "users.list failed: invalid_auth",
            ));
        }
        Ok(self.participants.clone())
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId, ChatError> {
        if self.fail_open_for.lock().unwrap().as_ref() == Some(user) {
            return Err(ChatError::new(
                ChatErrorKind::Api,
                "conversations.open failed: user_not_found",
            ));
        }
        self.opened.lock().unwrap().push(user.clone());
        Ok(dm(user.as_str()))
    }

    async fn post_message(&self, message: &OutboundMessage) -> Result<PostedMessage, ChatError> {
        let attempt = self.post_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing_channels.lock().unwrap().contains(&message.channel) {
            return Err(ChatError::transport("connection reset"));
        }
        self.posted.lock().unwrap().push(message.clone());
        Ok(PostedMessage {
            channel: message.channel.clone(),
            ts: format!("1700000000.{attempt:06}"),
        })
    }

    async fn poll_inbound_events(&self) -> Result<Vec<InboundEvent>, ChatError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        {
            let mut fail = self.fail_next_poll.lock().unwrap();
            if *fail {
                *fail = false;
                return Err(ChatError::transport("timed out"));
            }
        }
        Ok(self.inbound.lock().unwrap().pop_front().unwrap_or_default())
    }
}

// ============================================================================
// Time
// ============================================================================

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<NaiveDateTime>,
}

impl ManualClock {
    pub fn at(now: NaiveDateTime) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: NaiveDateTime) {
        *self.now.lock().unwrap() = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        *self.now.lock().unwrap()
    }
}

/// Sleeper that returns immediately, optionally cancelling a token after
/// a number of sleeps
#[derive(Default)]
pub struct InstantSleeper {
    sleeps: AtomicUsize,
    cancel_after: Option<(usize, CancellationToken)>,
}

impl InstantSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancelling_after(sleeps: usize, token: CancellationToken) -> Self {
        Self {
            sleeps: AtomicUsize::new(0),
            cancel_after: Some((sleeps, token)),
        }
    }

    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sleeper for InstantSleeper {
    async fn sleep(&self, _period: Duration) {
        let count = self.sleeps.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some((limit, token)) = &self.cancel_after {
            if count >= *limit {
                token.cancel();
            }
        }
        tokio::task::yield_now().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{CycleError, CycleOutcome, CycleSettings, ReportCycle};
    use crate::state_machine::ConvState;
    use crate::survey::Questionnaire;
    use std::sync::Arc;

    const RESULTS: &str = "C-results";

    fn settings() -> Arc<CycleSettings> {
        Arc::new(CycleSettings {
            results_channel: ChannelId::new(RESULTS),
            questionnaire: Arc::new(Questionnaire::default()),
            tick_period: Duration::from_millis(10),
        })
    }

    fn results() -> ChannelId {
        ChannelId::new(RESULTS)
    }

    #[tokio::test]
    async fn test_fake_platform_records_posts() {
        let platform = FakePlatform::new(vec![]);
        let posted = platform
            .post_message(&OutboundMessage::new(ChannelId::new("C1"), "hello"))
            .await
            .unwrap();
        assert_eq!(posted.ts, "1700000000.000001");
        assert_eq!(platform.texts_to(&ChannelId::new("C1")), vec!["hello"]);
    }

    #[tokio::test]
    async fn test_empty_cycle_completes_on_first_tick() {
        let platform = Arc::new(FakePlatform::new(vec![service_account("USLACKBOT")]));
        let sleeper = InstantSleeper::new();

        let cycle = ReportCycle::start(platform.clone(), settings()).await.unwrap();
        assert_eq!(cycle.participant_count(), 0);
        let outcome = cycle.run(&sleeper, &CancellationToken::new()).await;

        assert_eq!(outcome, CycleOutcome::Completed { published: 0 });
        assert_eq!(sleeper.sleeps(), 0);
        assert!(platform.posted_messages().is_empty());
        assert!(platform.opened_channels().is_empty());
    }

    #[tokio::test]
    async fn test_start_greets_then_asks_first_question() {
        let platform = Arc::new(FakePlatform::new(vec![
            member("U1", "Ann"),
            service_account("B1"),
            member("U2", "Bob"),
        ]));

        let cycle = ReportCycle::start(platform.clone(), settings()).await.unwrap();

        assert_eq!(
            platform.opened_channels(),
            vec![UserId::new("U1"), UserId::new("U2")]
        );
        for user in ["U1", "U2"] {
            assert_eq!(
                platform.texts_to(&dm(user)),
                vec![
                    "It's time for your weather report!",
                    "What's the weather looking like?"
                ]
            );
            assert!(cycle
                .conversation(&UserId::new(user))
                .unwrap()
                .state()
                .is_responding());
        }
        assert!(platform.texts_to(&dm("B1")).is_empty());
        assert!(!cycle.is_complete());
    }

    #[tokio::test]
    async fn test_listing_failure_aborts_cycle() {
        let platform = Arc::new(FakePlatform::new(vec![member("U1", "Ann")]));
        platform.fail_listing();

        let result = ReportCycle::start(platform.clone(), settings()).await;
        assert!(matches!(result, Err(CycleError::ListParticipants(_))));
        assert!(platform.posted_messages().is_empty());
    }

    #[tokio::test]
    async fn test_channel_open_failure_aborts_before_any_message() {
        let platform = Arc::new(FakePlatform::new(vec![
            member("U1", "Ann"),
            member("U2", "Bob"),
        ]));
        platform.fail_open_for("U2");

        let result = ReportCycle::start(platform.clone(), settings()).await;
        match result {
            Err(CycleError::OpenChannel { user, .. }) => assert_eq!(user, UserId::new("U2")),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("cycle should not start"),
        }
        assert!(platform.posted_messages().is_empty());
    }

    /// Two members, three questions: Ann answers everything, Bob never does.
    #[tokio::test]
    async fn test_responsive_member_published_while_silent_member_blocks() {
        let platform = Arc::new(FakePlatform::new(vec![
            member("U1", "Ann"),
            member("U2", "Bob"),
        ]));
        let mut cycle = ReportCycle::start(platform.clone(), settings()).await.unwrap();

        platform.queue_reply("U1", "Cloudy");
        assert!(!cycle.tick().await);
        assert_eq!(
            platform.texts_to(&dm("U1")).last().map(String::as_str),
            Some("How are your tasks going?")
        );

        platform.queue_reply("U1", "Great, thanks");
        assert!(!cycle.tick().await);
        platform.queue_reply("U1", "Nope");
        assert!(!cycle.tick().await);

        let ann = UserId::new("U1");
        assert!(cycle.conversation(&ann).unwrap().state().is_done());
        assert!(cycle.is_published(&ann));
        assert_eq!(
            platform.texts_to(&dm("U1")).last().map(String::as_str),
            Some("That's all for today!")
        );

        let thread = cycle.results_thread().unwrap().to_string();
        let entries = platform.messages_to(&results());
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].text, "Here are the results of today's weather report");
        assert_eq!(entries[1].thread_ts.as_deref(), Some(thread.as_str()));
        assert_eq!(
            entries[1].text,
            "*What's the weather looking like?*\nCloudy\n\
             *How are your tasks going?*\nGreat, thanks\n\
             *Do you need help with your tasks?*\nNope\n"
        );
        let attribution = entries[1].attribution.clone().unwrap();
        assert_eq!(attribution.name, "Ann");
        assert_eq!(attribution.avatar_url, "https://avatars.test/U1.png");

        // Bob stays on the first question no matter how long we poll
        let posted = platform.posted_messages().len();
        for _ in 0..20 {
            assert!(!cycle.tick().await);
        }
        let bob = cycle.conversation(&UserId::new("U2")).unwrap();
        assert_eq!(bob.state(), &ConvState::Responding { answers: vec![] });
        assert_eq!(platform.posted_messages().len(), posted);
    }

    #[tokio::test]
    async fn test_thread_shared_by_members_finishing_on_different_ticks() {
        let platform = Arc::new(FakePlatform::new(vec![
            member("U1", "Ann"),
            member("U2", "Bob"),
        ]));
        let mut cycle = ReportCycle::start(platform.clone(), settings()).await.unwrap();

        for answer in ["a1", "a2", "a3"] {
            platform.queue_reply("U1", answer);
            cycle.tick().await;
        }
        let thread = cycle.results_thread().unwrap().to_string();

        for answer in ["b1", "b2"] {
            platform.queue_reply("U2", answer);
            assert!(!cycle.tick().await);
        }
        platform.queue_reply("U2", "b3");
        assert!(cycle.tick().await);

        let to_results = platform.messages_to(&results());
        assert_eq!(to_results.iter().filter(|m| m.thread_ts.is_none()).count(), 1);
        let threaded: Vec<_> = to_results.iter().filter(|m| m.thread_ts.is_some()).collect();
        assert_eq!(threaded.len(), 2);
        assert!(threaded
            .iter()
            .all(|m| m.thread_ts.as_deref() == Some(thread.as_str())));
        assert_eq!(cycle.results_thread(), Some(thread.as_str()));
    }

    #[tokio::test]
    async fn test_fast_duplicate_and_stray_messages_ignored() {
        let platform = Arc::new(FakePlatform::new(vec![
            member("U1", "Ann"),
            member("U2", "Bob"),
        ]));
        let mut cycle = ReportCycle::start(platform.clone(), settings()).await.unwrap();

        platform.queue_events(vec![
            InboundEvent::message(dm("U1"), "Sunny"),
            InboundEvent::message(dm("U1"), "and warm"),
            InboundEvent::system(dm("U2"), "channel_join", "Bob joined"),
            InboundEvent::message(results(), "cross-talk"),
        ]);
        cycle.tick().await;

        let ann = cycle.conversation(&UserId::new("U1")).unwrap();
        assert_eq!(
            ann.state(),
            &ConvState::Responding {
                answers: vec!["Sunny".to_string()]
            }
        );
        let bob = cycle.conversation(&UserId::new("U2")).unwrap();
        assert_eq!(bob.state(), &ConvState::Responding { answers: vec![] });
    }

    #[tokio::test]
    async fn test_poll_failure_does_not_end_cycle() {
        let platform = Arc::new(FakePlatform::new(vec![member("U1", "Ann")]));
        let mut cycle = ReportCycle::start(platform.clone(), settings()).await.unwrap();

        platform.fail_next_poll();
        assert!(!cycle.tick().await);

        for answer in ["a", "b", "c"] {
            platform.queue_reply("U1", answer);
            cycle.tick().await;
        }
        assert!(cycle.is_complete());
    }

    #[tokio::test]
    async fn test_run_drives_scripted_cycle_to_completion() {
        let platform = Arc::new(FakePlatform::new(vec![
            member("U1", "Ann"),
            member("U2", "Bob"),
        ]));
        platform.queue_events(vec![
            InboundEvent::message(dm("U1"), "a1"),
            InboundEvent::message(dm("U2"), "b1"),
        ]);
        platform.queue_events(vec![]);
        platform.queue_events(vec![InboundEvent::message(dm("U1"), "a2")]);
        platform.queue_events(vec![
            InboundEvent::message(dm("U1"), "a3"),
            InboundEvent::message(dm("U2"), "b2"),
        ]);
        platform.queue_events(vec![InboundEvent::message(dm("U2"), "b3")]);

        let sleeper = InstantSleeper::new();
        let cycle = ReportCycle::start(platform.clone(), settings()).await.unwrap();
        let outcome = cycle.run(&sleeper, &CancellationToken::new()).await;

        assert_eq!(outcome, CycleOutcome::Completed { published: 2 });
        assert_eq!(platform.polls(), 5);
        assert_eq!(sleeper.sleeps(), 4);
        assert_eq!(
            platform.texts_to(&dm("U2")).last().map(String::as_str),
            Some("That's all for today!")
        );
    }

    #[tokio::test]
    async fn test_run_stops_when_cancelled() {
        let platform = Arc::new(FakePlatform::new(vec![member("U1", "Ann")]));
        let token = CancellationToken::new();
        let sleeper = InstantSleeper::cancelling_after(3, token.clone());

        let cycle = ReportCycle::start(platform.clone(), settings()).await.unwrap();
        let outcome = cycle.run(&sleeper, &token).await;

        assert_eq!(outcome, CycleOutcome::Cancelled);
        assert_eq!(platform.polls(), 3);
        assert!(platform.messages_to(&results()).is_empty());
    }
}
