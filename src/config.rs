//! Process configuration
//!
//! Positional arguments `<hour> <minute> <results-channel>`, each
//! overridable from the environment, plus Slack and survey settings read
//! from the environment.

use crate::platform::{ChannelId, SlackConfig};
use crate::runtime::{CycleSettings, DEFAULT_TICK_PERIOD};
use crate::scheduler::ReportSchedule;
use crate::survey::Questionnaire;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    pub fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub schedule: ReportSchedule,
    pub results_channel: ChannelId,
    pub questionnaire: Questionnaire,
    /// Poll-loop and clock-check period
    pub tick_period: Duration,
    pub slack: SlackConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_sources(&args, |key| std::env::var(key).ok())
    }

    /// Build from positional arguments and an environment lookup
    pub fn from_sources(
        args: &[String],
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let setting = |position: usize, key: &str| {
            env(key)
                .or_else(|| args.get(position).cloned())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let hour = setting(0, "REPORT_HOUR").ok_or(ConfigError::Missing("hour"))?;
        let minute = setting(1, "REPORT_MINUTE").ok_or(ConfigError::Missing("minute"))?;
        let schedule = ReportSchedule::new(
            parse_number("hour", &hour)?,
            parse_number("minute", &minute)?,
        )?;
        let results_channel = setting(2, "REPORT_RESULTS_CHANNEL")
            .map(ChannelId)
            .ok_or(ConfigError::Missing("results channel"))?;

        let bot_token = env("SLACK_BOT_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or(ConfigError::Missing("SLACK_BOT_TOKEN"))?;
        let request_timeout = match env("SLACK_REQUEST_TIMEOUT_MS") {
            Some(ms) => Duration::from_millis(parse_number("SLACK_REQUEST_TIMEOUT_MS", &ms)?),
            None => SlackConfig::DEFAULT_TIMEOUT,
        };
        let slack = SlackConfig {
            bot_token,
            api_base: env("SLACK_API_BASE")
                .unwrap_or_else(|| SlackConfig::DEFAULT_API_BASE.to_string()),
            request_timeout,
        };

        let tick_period = match env("REPORT_TICK_MS") {
            Some(ms) => {
                let ms: u64 = parse_number("REPORT_TICK_MS", &ms)?;
                if ms == 0 {
                    return Err(ConfigError::invalid("REPORT_TICK_MS", "must be positive"));
                }
                Duration::from_millis(ms)
            }
            None => DEFAULT_TICK_PERIOD,
        };

        Ok(Self {
            schedule,
            results_channel,
            questionnaire: questionnaire_from_env(&env)?,
            tick_period,
            slack,
        })
    }

    pub fn cycle_settings(&self) -> CycleSettings {
        CycleSettings {
            results_channel: self.results_channel.clone(),
            questionnaire: Arc::new(self.questionnaire.clone()),
            tick_period: self.tick_period,
        }
    }
}

fn parse_number<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::invalid(name, format!("{value:?} is not a number")))
}

fn questionnaire_from_env(env: &impl Fn(&str) -> Option<String>) -> Result<Questionnaire, ConfigError> {
    let mut questionnaire = Questionnaire::default();
    if let Some(greeting) = env("REPORT_GREETING") {
        questionnaire.greeting = greeting;
    }
    if let Some(finish) = env("REPORT_FINISH_MESSAGE") {
        questionnaire.finish_message = finish;
    }
    if let Some(heading) = env("REPORT_RESULTS_HEADING") {
        questionnaire.results_heading = heading;
    }
    if let Some(raw) = env("REPORT_QUESTIONS") {
        let questions: Vec<String> = serde_json::from_str(&raw)
            .map_err(|e| ConfigError::invalid("REPORT_QUESTIONS", e.to_string()))?;
        if questions.iter().any(|q| q.trim().is_empty()) {
            return Err(ConfigError::invalid("REPORT_QUESTIONS", "questions must not be blank"));
        }
        questionnaire.questions = questions;
    }
    Ok(questionnaire)
}
