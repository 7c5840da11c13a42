//! Minimal contract between the relay engine and a call-control manager client.
//!
//! This crate only defines the action/response/event shapes and the client
//! trait. Wire encoding, connection setup and login belong to concrete client
//! crates.

use std::fmt;

/// Field key carrying the event name on unsolicited and list events.
pub const EVENT_KEY: &str = "Event";
/// Field key carrying the outcome on action responses.
pub const RESPONSE_KEY: &str = "Response";
/// Action that lists the active channels as an event list.
pub const LIST_CHANNELS_ACTION: &str = "CoreShowChannels";

/// One outbound manager action: a name plus ordered `Key: Value` fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    name: String,
    fields: Vec<(String, String)>,
}

impl Action {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Returns the first value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        lookup(&self.fields, key)
    }
}

/// A block of `Key: Value` fields received from the manager.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagerEvent {
    fields: Vec<(String, String)>,
}

impl ManagerEvent {
    #[must_use]
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Builds an event from borrowed pairs; handy for fixtures.
    #[must_use]
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            fields: pairs
                .into_iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        }
    }

    /// Returns the first value for `key`, compared case-insensitively.
    pub fn get(&self, key: &str) -> Option<&str> {
        lookup(&self.fields, key)
    }

    /// Value of `key`, or the empty string when the field is absent.
    pub fn value(&self, key: &str) -> &str {
        self.get(key).unwrap_or("")
    }

    /// The `Event` name, if this block is an event.
    pub fn name(&self) -> Option<&str> {
        self.get(EVENT_KEY)
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn into_fields(self) -> Vec<(String, String)> {
        self.fields
    }
}

/// Everything the manager returned for one action.
///
/// `events[0]` is always the response block itself. Actions that produce an
/// event list append every list event in arrival order, ending with the
/// completion sentinel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionResponse {
    events: Vec<ManagerEvent>,
}

impl ActionResponse {
    #[must_use]
    pub fn new(events: Vec<ManagerEvent>) -> Self {
        Self { events }
    }

    /// Convenience constructor for a bare `Response: Success` block.
    #[must_use]
    pub fn success() -> Self {
        Self::new(vec![ManagerEvent::from_pairs([(RESPONSE_KEY, "Success")])])
    }

    /// Convenience constructor for a bare `Response: Error` block.
    #[must_use]
    pub fn error(message: &str) -> Self {
        Self::new(vec![ManagerEvent::from_pairs([
            (RESPONSE_KEY, "Error"),
            ("Message", message),
        ])])
    }

    pub fn is_success(&self) -> bool {
        self.events
            .first()
            .and_then(|head| head.get(RESPONSE_KEY))
            .is_some_and(|value| value.eq_ignore_ascii_case("success"))
    }

    /// The manager's `Message` on the response block, if any.
    pub fn message(&self) -> Option<&str> {
        self.events.first().and_then(|head| head.get("Message"))
    }

    /// Raw event sequence, response block first.
    pub fn events(&self) -> &[ManagerEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Out-of-band notices delivered on the client's notice queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerNotice {
    /// An unsolicited event.
    Event(ManagerEvent),
    /// The connection was dropped from the remote side.
    Disconnected { reason: String },
}

/// Error returned by a manager client while performing an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerError {
    /// The connection is gone; no action can complete.
    Disconnected,
    /// Local I/O failed while writing the action.
    Io(String),
    /// The manager replied with something that could not be understood.
    Protocol(String),
}

impl fmt::Display for ManagerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "manager connection closed"),
            Self::Io(message) => write!(f, "manager I/O error: {message}"),
            Self::Protocol(message) => write!(f, "manager protocol error: {message}"),
        }
    }
}

impl std::error::Error for ManagerError {}

impl From<std::io::Error> for ManagerError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

/// A connected, logged-in manager client.
///
/// Implementations must be shareable across the lifecycle thread (which sends
/// actions) and whatever thread owns the notice queue.
pub trait ManagerClient: Send + Sync {
    /// Sends one action and blocks until its full response has arrived.
    fn send_action(&self, action: &Action) -> Result<ActionResponse, ManagerError>;

    /// Closes the connection. Safe to call more than once.
    fn disconnect(&self);
}

fn lookup<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(key))
        .map(|(_, value)| value.as_str())
}
