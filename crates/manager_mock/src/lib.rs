//! Deterministic scripted implementation of the `manager_api` client contract.
//!
//! No sockets are involved: actions are recorded, answered from a small
//! script, and can be made to fail on demand. Intended for engine tests.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use manager_api::{Action, ActionResponse, ManagerClient, ManagerError, ManagerEvent};

pub use manager_api::LIST_CHANNELS_ACTION;

/// One channel row served by the scripted `CoreShowChannels` response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelFixture {
    pub channel: String,
    pub duration: String,
    pub caller_id: String,
    pub connected_line: String,
}

impl ChannelFixture {
    #[must_use]
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            duration: "00:00:01".to_string(),
            caller_id: String::new(),
            connected_line: String::new(),
        }
    }

    #[must_use]
    pub fn with_caller(
        mut self,
        caller_id: impl Into<String>,
        connected_line: impl Into<String>,
    ) -> Self {
        self.caller_id = caller_id.into();
        self.connected_line = connected_line.into();
        self
    }

    fn to_event(&self) -> ManagerEvent {
        ManagerEvent::from_pairs([
            ("Event", "CoreShowChannel"),
            ("Channel", self.channel.as_str()),
            ("Duration", self.duration.as_str()),
            ("CallerIDNum", self.caller_id.as_str()),
            ("ConnectedLineNum", self.connected_line.as_str()),
        ])
    }
}

/// How a scripted action should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    /// Answer `Response: Error`.
    Rejected,
    /// Return `ManagerError::Disconnected`.
    ConnectionDropped,
}

#[derive(Debug, Clone, Copy)]
struct FailureRule {
    successes_left: usize,
    mode: FailureMode,
}

/// An action as it reached the scripted client.
#[derive(Debug, Clone)]
pub struct SentAction {
    pub action: Action,
    pub at: Instant,
}

#[derive(Debug, Default)]
struct ScriptState {
    channels: Vec<ChannelFixture>,
    failures: HashMap<String, FailureRule>,
    sent: Vec<SentAction>,
    disconnect_calls: usize,
}

/// Scripted manager client used by relay engine tests.
#[derive(Debug, Default)]
pub struct ScriptedManager {
    state: Mutex<ScriptState>,
}

impl ScriptedManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_channels(channels: Vec<ChannelFixture>) -> Self {
        let manager = Self::new();
        manager.set_channels(channels);
        manager
    }

    /// Replaces the channel set served by later listings.
    pub fn set_channels(&self, channels: Vec<ChannelFixture>) {
        lock_unpoisoned(&self.state).channels = channels;
    }

    /// Every future `name` action is answered with `Response: Error`.
    pub fn reject_action(&self, name: &str) {
        self.reject_action_after(name, 0);
    }

    /// `name` succeeds `successes` more times, then is rejected.
    pub fn reject_action_after(&self, name: &str, successes: usize) {
        self.install_rule(name, successes, FailureMode::Rejected);
    }

    /// Every future `name` action fails as if the connection dropped.
    pub fn drop_connection_on(&self, name: &str) {
        self.install_rule(name, 0, FailureMode::ConnectionDropped);
    }

    fn install_rule(&self, name: &str, successes_left: usize, mode: FailureMode) {
        lock_unpoisoned(&self.state).failures.insert(
            name.to_ascii_lowercase(),
            FailureRule {
                successes_left,
                mode,
            },
        );
    }

    /// All recorded actions in arrival order.
    pub fn sent(&self) -> Vec<SentAction> {
        lock_unpoisoned(&self.state).sent.clone()
    }

    /// Recorded actions with the given name.
    pub fn sent_named(&self, name: &str) -> Vec<Action> {
        lock_unpoisoned(&self.state)
            .sent
            .iter()
            .filter(|sent| sent.action.name().eq_ignore_ascii_case(name))
            .map(|sent| sent.action.clone())
            .collect()
    }

    /// `field` of every recorded `name` action, in order.
    pub fn sent_values(&self, name: &str, field: &str) -> Vec<String> {
        self.sent_named(name)
            .iter()
            .map(|action| action.get(field).unwrap_or("").to_string())
            .collect()
    }

    pub fn disconnect_calls(&self) -> usize {
        lock_unpoisoned(&self.state).disconnect_calls
    }

    fn listing(channels: &[ChannelFixture]) -> ActionResponse {
        let mut events = Vec::with_capacity(channels.len() + 2);
        events.push(ManagerEvent::from_pairs([
            ("Response", "Success"),
            ("EventList", "start"),
            ("Message", "Channels will follow"),
        ]));
        events.extend(channels.iter().map(ChannelFixture::to_event));
        let count = channels.len().to_string();
        events.push(ManagerEvent::from_pairs([
            ("Event", "CoreShowChannelsComplete"),
            ("EventList", "Complete"),
            ("ListItems", count.as_str()),
        ]));
        ActionResponse::new(events)
    }
}

impl ManagerClient for ScriptedManager {
    fn send_action(&self, action: &Action) -> Result<ActionResponse, ManagerError> {
        let mut state = lock_unpoisoned(&self.state);
        state.sent.push(SentAction {
            action: action.clone(),
            at: Instant::now(),
        });

        if let Some(rule) = state.failures.get_mut(&action.name().to_ascii_lowercase()) {
            if rule.successes_left == 0 {
                return match rule.mode {
                    FailureMode::Rejected => Ok(ActionResponse::error("Scripted failure")),
                    FailureMode::ConnectionDropped => Err(ManagerError::Disconnected),
                };
            }
            rule.successes_left -= 1;
        }

        if action.name().eq_ignore_ascii_case(LIST_CHANNELS_ACTION) {
            return Ok(Self::listing(&state.channels));
        }
        Ok(ActionResponse::success())
    }

    fn disconnect(&self) {
        lock_unpoisoned(&self.state).disconnect_calls += 1;
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
