//! Trait abstractions for time
//!
//! The poll loop and the scheduler only observe time through these, so
//! tests can drive logical ticks without waiting on the wall clock.

use async_trait::async_trait;
use chrono::{Local, NaiveDateTime};
use std::sync::Arc;
use std::time::Duration;

/// Source of local wall-clock time
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Suspends the caller between ticks
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, period: Duration);
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now(&self) -> NaiveDateTime {
        (**self).now()
    }
}

#[async_trait]
impl<T: Sleeper + ?Sized> Sleeper for Arc<T> {
    async fn sleep(&self, period: Duration) {
        (**self).sleep(period).await;
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// The machine's local time zone
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Real sleeping on the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, period: Duration) {
        tokio::time::sleep(period).await;
    }
}
