//! Report bot - scheduled team survey over Slack
//!
//! Once a day, at a configured time, asks every member a fixed set of
//! questions in a direct message and posts each finished transcript to a
//! shared results thread.

mod config;
mod platform;
mod runtime;
mod scheduler;
mod state_machine;
mod survey;

use config::Config;
use platform::{LoggingPlatform, SlackPlatform};
use runtime::{SystemClock, TokioSleeper};
use scheduler::Scheduler;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "report_bot=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        hour = config.schedule.hour(),
        minute = config.schedule.minute(),
        results_channel = %config.results_channel,
        questions = config.questionnaire.question_count(),
        "Configuration loaded"
    );

    let slack = SlackPlatform::new(&config.slack)?;
    let bot = slack.auth_check().await?;
    tracing::info!(bot = %bot, api_base = %config.slack.api_base, "Connected to Slack");
    let platform = Arc::new(LoggingPlatform::new(slack));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            return;
        }
        tracing::info!("Shutdown requested");
        signal_token.cancel();
    });

    Scheduler::new(
        platform,
        SystemClock,
        Arc::new(TokioSleeper),
        config.schedule,
        Arc::new(config.cycle_settings()),
    )
    .run(shutdown)
    .await;

    Ok(())
}
