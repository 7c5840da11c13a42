//! Inbound side: decoding text events from the active channel onto the console.

use std::borrow::Cow;
use std::io;
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use manager_api::{ManagerEvent, ManagerNotice};
use tracing::{debug, trace, warn};

use crate::core::output::Console;
use crate::outbound::{SPACE_PLACEHOLDER, WIRE_NEWLINE};
use crate::session::{Session, ShutdownReason, ShutdownSignal};

pub const TEXT_EVENT: &str = "TddRxMsg";
/// Events that add, remove or change channels.
pub const TOPOLOGY_EVENTS: [&str; 3] = ["Newchannel", "Hangup", "DeviceStateChange"];
pub const FORCED_DISCONNECT_NOTICE: &str = "\nManager connection was forcibly closed...\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Text,
    Topology,
    Other,
}

impl EventKind {
    pub fn of(event: &ManagerEvent) -> Self {
        match event.name() {
            Some(name) if name.eq_ignore_ascii_case(TEXT_EVENT) => Self::Text,
            Some(name) if TOPOLOGY_EVENTS.iter().any(|kind| kind.eq_ignore_ascii_case(name)) => {
                Self::Topology
            }
            _ => Self::Other,
        }
    }
}

/// A text event, borrowed from the manager event it came in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundTextEvent<'a> {
    pub channel_id: &'a str,
    pub payload: &'a str,
}

impl<'a> InboundTextEvent<'a> {
    pub fn from_event(event: &'a ManagerEvent) -> Option<Self> {
        (EventKind::of(event) == EventKind::Text).then(|| Self {
            channel_id: event.value("Channel"),
            payload: event.value("Message"),
        })
    }
}

/// Display form of a received payload.
pub fn decode_payload(payload: &str) -> Cow<'_, str> {
    if payload == WIRE_NEWLINE {
        return Cow::Borrowed("\n");
    }
    if payload.contains(SPACE_PLACEHOLDER) {
        Cow::Owned(payload.replace(SPACE_PLACEHOLDER, " "))
    } else {
        Cow::Borrowed(payload)
    }
}

/// What happened to one notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDisposition {
    Displayed,
    TopologyChanged,
    Ignored,
    Disconnected,
}

/// Routes manager notices to the console and the session.
#[derive(Clone)]
pub struct EventRelay {
    session: Arc<Session>,
    console: Arc<Console>,
    shutdown: Arc<ShutdownSignal>,
}

impl EventRelay {
    pub fn new(
        session: Arc<Session>,
        console: Arc<Console>,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        Self {
            session,
            console,
            shutdown,
        }
    }

    pub fn handle_event(&self, event: &ManagerEvent) -> RelayDisposition {
        match EventKind::of(event) {
            EventKind::Topology => {
                self.session.mark_topology_changed();
                RelayDisposition::TopologyChanged
            }
            EventKind::Other => RelayDisposition::Ignored,
            EventKind::Text => {
                let Some(text) = InboundTextEvent::from_event(event) else {
                    return RelayDisposition::Ignored;
                };
                let payload = decode_payload(text.payload);
                // Printed under the session lock so a reselection cannot slip in
                // between the channel check and the output.
                let shown = self
                    .session
                    .when_active_on(text.channel_id, || self.console.remote_text(&payload));
                if shown.is_none() {
                    trace!(channel = text.channel_id, "text for inactive channel dropped");
                    return RelayDisposition::Ignored;
                }
                RelayDisposition::Displayed
            }
        }
    }

    pub fn handle_notice(&self, notice: &ManagerNotice) -> RelayDisposition {
        match notice {
            ManagerNotice::Event(event) => self.handle_event(event),
            ManagerNotice::Disconnected { reason } => {
                warn!(%reason, "manager connection forcibly closed");
                self.console.print(FORCED_DISCONNECT_NOTICE);
                self.shutdown.trigger(ShutdownReason::ConnectionLost);
                RelayDisposition::Disconnected
            }
        }
    }

    /// Drains `notices` on a dedicated thread until the queue closes or the
    /// connection drops.
    pub fn spawn(self, notices: Receiver<ManagerNotice>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("event-relay".to_string())
            .spawn(move || {
                for notice in notices {
                    if self.handle_notice(&notice) == RelayDisposition::Disconnected {
                        break;
                    }
                }
                debug!("event relay stopped");
            })
    }
}
