//! Outbound actions: text, tones and relay activation on the active channel.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use manager_api::{Action, ManagerClient};
use tracing::{debug, warn};

use crate::core::output::Console;
use crate::error::{RelayError, Result};

/// Stands in for a space on the wire; the transport cannot carry whitespace.
pub const SPACE_PLACEHOLDER: char = '_';
/// Two-character newline escape used in both directions.
pub const WIRE_NEWLINE: &str = "\\n";
/// Decoder options: baudot at 45.45, send and receive.
pub const RELAY_OPTIONS: &str = "b(1)s";
pub const GREETING: &str = "HELLO GA";

pub const PLAY_TONE_ACTION: &str = "PlayDTMF";
pub const SEND_TEXT_ACTION: &str = "TddTx";
pub const ENABLE_RELAY_ACTION: &str = "TddRx";

/// Wire form of typed text.
pub fn encode_text(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            ' ' => encoded.push(SPACE_PLACEHOLDER),
            '\n' => encoded.push_str(WIRE_NEWLINE),
            '\r' => {}
            other => encoded.push(other),
        }
    }
    encoded
}

/// Digits, `A`-`D`, `*` and `#`.
pub fn is_tone_char(ch: char) -> bool {
    ch.is_ascii_digit() || matches!(ch, 'A'..='D' | '*' | '#')
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    PlayTone(char),
    SendText(String),
    EnableRelay,
}

impl OutboundAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlayTone(_) => PLAY_TONE_ACTION,
            Self::SendText(_) => SEND_TEXT_ACTION,
            Self::EnableRelay => ENABLE_RELAY_ACTION,
        }
    }

    pub fn to_action(&self, channel: &str) -> Action {
        let action = Action::new(self.name()).field("Channel", channel);
        match self {
            Self::PlayTone(digit) => action.field("Digit", digit.to_string()),
            Self::SendText(text) => action.field("Message", encode_text(text)),
            Self::EnableRelay => action.field("Options", RELAY_OPTIONS),
        }
    }
}

/// Sends actions for one channel and echoes accepted text.
pub struct Outbound {
    client: Arc<dyn ManagerClient>,
    console: Arc<Console>,
    channel: String,
}

impl Outbound {
    pub fn new(
        client: Arc<dyn ManagerClient>,
        console: Arc<Console>,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            client,
            console,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn enable_relay(&self) -> Result<()> {
        self.send(&OutboundAction::EnableRelay)
    }

    /// Sends `text` and, once accepted, echoes it under the local label.
    pub fn send_text(&self, text: &str) -> Result<()> {
        self.send(&OutboundAction::SendText(text.to_string()))?;
        self.console.local_text(text);
        Ok(())
    }

    pub fn send_tone(&self, digit: char) -> Result<()> {
        self.send(&OutboundAction::PlayTone(digit))
    }

    /// Plays every tone character of `digits` with `delay` between tones.
    ///
    /// Other characters are skipped. Stops at the first failure. Returns the
    /// number of tones played.
    pub fn dial(&self, digits: &str, delay: Duration) -> Result<usize> {
        let mut played = 0;
        for digit in digits.chars().filter(|ch| is_tone_char(*ch)) {
            if played > 0 && !delay.is_zero() {
                thread::sleep(delay);
            }
            self.send_tone(digit)?;
            played += 1;
        }
        debug!(channel = %self.channel, played, "dial sequence sent");
        Ok(played)
    }

    fn send(&self, outbound: &OutboundAction) -> Result<()> {
        let action = outbound.to_action(&self.channel);
        let response = self.client.send_action(&action).map_err(|err| {
            warn!(
                action = outbound.name(),
                channel = %self.channel,
                error = %err,
                "action not delivered"
            );
            RelayError::action_failed(outbound.name(), &self.channel, err.to_string())
        })?;

        if response.is_success() {
            return Ok(());
        }
        let reason = response.message().unwrap_or("rejected").to_string();
        warn!(action = outbound.name(), channel = %self.channel, %reason, "action rejected");
        Err(RelayError::action_failed(outbound.name(), &self.channel, reason))
    }
}
