//! Environment configuration and session tuning.

use std::env;
use std::time::Duration;

pub const LOG_PATH_ENV: &str = "TDD_RELAY_LOG";
pub const DEBUG_ENV: &str = "TDD_RELAY_DEBUG";

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_PROMPT_WAIT: Duration = Duration::from_secs(1);
pub const DEFAULT_INPUT_TICK: Duration = Duration::from_millis(100);
pub const DEFAULT_DIAL_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub log_path: Option<String>,
    pub debug: bool,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            log_path: env_string_opt(LOG_PATH_ENV),
            debug: env_flag(DEBUG_ENV),
        }
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key).map(|value| value == "1").unwrap_or(false)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

/// Knobs for one relay session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Channel to use for the first cycle instead of prompting.
    pub channel: Option<String>,
    /// Re-list the directory on this interval while prompting.
    pub refresh_interval: Option<Duration>,
    /// How long the channel prompt waits for input between refresh checks.
    pub prompt_wait: Duration,
    /// Poll slice of the keystroke loop; bounds shutdown latency.
    pub input_tick: Duration,
    /// Pause between tones of a dialed number.
    pub dial_delay: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            channel: None,
            refresh_interval: None,
            prompt_wait: DEFAULT_PROMPT_WAIT,
            input_tick: DEFAULT_INPUT_TICK,
            dial_delay: DEFAULT_DIAL_DELAY,
        }
    }
}

impl SessionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = Some(interval);
        self
    }

    pub fn with_prompt_wait(mut self, wait: Duration) -> Self {
        self.prompt_wait = wait;
        self
    }

    pub fn with_input_tick(mut self, tick: Duration) -> Self {
        self.input_tick = tick;
        self
    }

    pub fn with_dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }
}
