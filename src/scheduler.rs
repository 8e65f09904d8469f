//! Daily report scheduling
//!
//! Checks the clock once per period and starts a report cycle when the
//! configured time of day comes around. At most one cycle runs at a time.

use crate::config::ConfigError;
use crate::platform::ChatPlatform;
use crate::runtime::{Clock, CycleOutcome, CycleSettings, ReportCycle, Sleeper};
use chrono::{NaiveDateTime, Timelike};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time of day the report starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportSchedule {
    hour: u32,
    minute: u32,
}

impl ReportSchedule {
    pub fn new(hour: u32, minute: u32) -> Result<Self, ConfigError> {
        if hour > 23 {
            return Err(ConfigError::invalid("hour", format!("{hour} is not in 0-23")));
        }
        if minute > 59 {
            return Err(ConfigError::invalid("minute", format!("{minute} is not in 0-59")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    /// Hour and minute match. Any second of the minute counts, so a
    /// check that drifts past second zero still fires.
    pub fn is_due(&self, now: NaiveDateTime) -> bool {
        now.hour() == self.hour && now.minute() == self.minute
    }
}

/// Outcome of one clock check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Not report time
    Idle,
    /// Report time: start a cycle
    Start,
    /// Report time, but this scheduled minute already started a cycle
    AlreadyStarted,
    /// Report time, but the previous cycle is still draining
    Busy,
}

/// Decide what to do at `now`.
///
/// `last_started` is the scheduled minute of the most recent start; it
/// keeps every later check within that minute from firing again.
pub fn decide(
    schedule: &ReportSchedule,
    now: NaiveDateTime,
    last_started: Option<NaiveDateTime>,
    busy: bool,
) -> ScheduleDecision {
    if !schedule.is_due(now) {
        return ScheduleDecision::Idle;
    }
    if last_started == Some(scheduled_minute(now)) {
        return ScheduleDecision::AlreadyStarted;
    }
    if busy {
        return ScheduleDecision::Busy;
    }
    ScheduleDecision::Start
}

fn scheduled_minute(now: NaiveDateTime) -> NaiveDateTime {
    now.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now)
}

// ============================================================================
// Cycle exclusivity
// ============================================================================

/// Single slot for the running cycle
#[derive(Debug, Clone, Default)]
pub struct CycleSlot {
    running: Arc<AtomicBool>,
}

impl CycleSlot {
    pub fn is_busy(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the slot; `None` while another cycle holds it
    pub fn try_acquire(&self) -> Option<CycleGuard> {
        self.running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| CycleGuard {
                running: self.running.clone(),
            })
    }
}

/// Releases the slot when the cycle task ends, however it ends
#[derive(Debug)]
pub struct CycleGuard {
    running: Arc<AtomicBool>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

// ============================================================================
// Scheduler
// ============================================================================

pub struct Scheduler<P, C, S>
where
    P: ChatPlatform + 'static,
    C: Clock,
    S: Sleeper + 'static,
{
    platform: Arc<P>,
    clock: C,
    sleeper: Arc<S>,
    schedule: ReportSchedule,
    settings: Arc<CycleSettings>,
    slot: CycleSlot,
    last_started: Option<NaiveDateTime>,
    running: Option<JoinHandle<()>>,
}

impl<P, C, S> Scheduler<P, C, S>
where
    P: ChatPlatform + 'static,
    C: Clock,
    S: Sleeper + 'static,
{
    pub fn new(
        platform: Arc<P>,
        clock: C,
        sleeper: Arc<S>,
        schedule: ReportSchedule,
        settings: Arc<CycleSettings>,
    ) -> Self {
        Self {
            platform,
            clock,
            sleeper,
            schedule,
            settings,
            slot: CycleSlot::default(),
            last_started: None,
            running: None,
        }
    }

    /// Check the clock once, starting a cycle task if it is time
    pub fn check(&mut self, shutdown: &CancellationToken) -> ScheduleDecision {
        let now = self.clock.now();
        let decision = decide(&self.schedule, now, self.last_started, self.slot.is_busy());

        match decision {
            ScheduleDecision::Start => {
                if let Some(guard) = self.slot.try_acquire() {
                    self.last_started = Some(scheduled_minute(now));
                    tracing::info!(at = %now, "Report time reached, starting cycle");
                    self.running = Some(self.spawn_cycle(guard, shutdown.child_token()));
                } else {
                    tracing::warn!(at = %now, "Report time reached while a cycle is running, skipping");
                    return ScheduleDecision::Busy;
                }
            }
            ScheduleDecision::Busy => {
                self.last_started = Some(scheduled_minute(now));
                tracing::warn!(at = %now, "Report time reached while a cycle is running, skipping");
            }
            ScheduleDecision::Idle | ScheduleDecision::AlreadyStarted => {}
        }

        decision
    }

    fn spawn_cycle(&self, guard: CycleGuard, cancel: CancellationToken) -> JoinHandle<()> {
        let platform = self.platform.clone();
        let sleeper = self.sleeper.clone();
        let settings = self.settings.clone();

        tokio::spawn(async move {
            let _guard = guard;
            match ReportCycle::start(platform, settings).await {
                Ok(cycle) => match cycle.run(sleeper.as_ref(), &cancel).await {
                    CycleOutcome::Completed { published } => {
                        tracing::info!(published, "Report cycle finished");
                    }
                    CycleOutcome::Cancelled => {
                        tracing::info!("Report cycle stopped by shutdown");
                    }
                },
                Err(e) => {
                    tracing::error!(error = %e, "Report cycle aborted during setup");
                }
            }
        })
    }

    /// Check the clock every period until `shutdown`, then wait for the
    /// running cycle (if any) to stop.
    pub async fn run(mut self, shutdown: CancellationToken) {
        tracing::info!(
            hour = self.schedule.hour(),
            minute = self.schedule.minute(),
            "Scheduler running"
        );
        loop {
            self.check(&shutdown);
            tokio::select! {
                biased;
                () = shutdown.cancelled() => break,
                () = self.sleeper.sleep(self.settings.tick_period) => {}
            }
        }

        if let Some(handle) = self.running.take() {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Report cycle task failed");
            }
        }
        tracing::info!("Scheduler stopped");
    }

    #[allow(dead_code)] // Useful for tests
    pub fn slot(&self) -> &CycleSlot {
        &self.slot
    }
}
