//! Channel directory: listing active channels and resolving a typed index.

use std::fmt::Write as _;
use std::time::{Duration, Instant};

use manager_api::{Action, ActionResponse, ManagerClient, LIST_CHANNELS_ACTION};
use tracing::{debug, warn};

use crate::core::output::Console;
use crate::core::terminal::{read_line, LineInput, Terminal};
use crate::error::{RelayError, Result};
use crate::session::{Session, ShutdownReason, ShutdownSignal};

pub const PROMPT: &str = "=> Channel No.: ";
pub const BANNER: &str = "*** AsTTYSpy ***\n";
const TARGET_HINT: &str = "Target channel number should be the non-TTY side of the call\n\
i.e. the channel with which the TTY user is currently bridged\n";

/// One row of a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    /// 1-based, only meaningful within the listing that produced it.
    pub index: usize,
    pub channel_id: String,
    pub duration: String,
    pub caller_id: String,
    pub called_number: String,
}

/// Snapshot of the active channels at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelListing {
    channels: Vec<ChannelDescriptor>,
}

impl ChannelListing {
    /// Builds a listing from a raw `CoreShowChannels` event sequence.
    ///
    /// The first entry is the response header and the last is the completion
    /// sentinel; neither is a channel.
    pub fn from_response(response: &ActionResponse) -> Self {
        let events = response.events();
        let rows = if events.len() > 2 {
            &events[1..events.len() - 1]
        } else {
            &[]
        };
        let channels = rows
            .iter()
            .enumerate()
            .map(|(offset, event)| ChannelDescriptor {
                index: offset + 1,
                channel_id: event.value("Channel").to_string(),
                duration: event.value("Duration").to_string(),
                caller_id: event.value("CallerIDNum").to_string(),
                called_number: event.value("ConnectedLineNum").to_string(),
            })
            .collect();
        Self { channels }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Looks up a 1-based display index.
    pub fn get(&self, index: usize) -> Option<&ChannelDescriptor> {
        index.checked_sub(1).and_then(|slot| self.channels.get(slot))
    }

    pub fn channels(&self) -> &[ChannelDescriptor] {
        &self.channels
    }

    pub fn render(&self) -> String {
        let mut out = format!("Channels: {}\n", self.len());
        let _ = writeln!(
            out,
            "{:>4} | {:<40} | {:>8} | {:>15} | {:>15}",
            "#", "Channel", "Duration", "Caller ID", "Called No."
        );
        for row in &self.channels {
            let _ = writeln!(
                out,
                "{:>4} | {:<40} | {:>8} | {:>15} | {:>15}",
                row.index, row.channel_id, row.duration, row.caller_id, row.called_number
            );
        }
        out
    }
}

/// Queries the manager for the active channels.
pub fn list_channels(client: &dyn ManagerClient) -> Result<ChannelListing> {
    let response = client
        .send_action(&Action::new(LIST_CHANNELS_ACTION))
        .map_err(|err| RelayError::DirectoryUnavailable {
            reason: err.to_string(),
        })?;
    if !response.is_success() {
        return Err(RelayError::DirectoryUnavailable {
            reason: response.message().unwrap_or("rejected").to_string(),
        });
    }
    let listing = ChannelListing::from_response(&response);
    debug!(channels = listing.len(), "channel listing fetched");
    Ok(listing)
}

/// What a line typed at the channel prompt means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Channel(String),
    Invalid(String),
    Refresh,
    Quit,
}

pub fn select_channel(input: &str, listing: &ChannelListing) -> Selection {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Selection::Refresh;
    }
    if trimmed.eq_ignore_ascii_case("q") {
        return Selection::Quit;
    }
    trimmed
        .parse::<usize>()
        .ok()
        .and_then(|index| listing.get(index))
        .map_or_else(
            || Selection::Invalid(trimmed.to_string()),
            |row| Selection::Channel(row.channel_id.clone()),
        )
}

/// How the channel prompt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    Selected(String),
    Quit,
    Interrupted,
}

/// Interactive selection loop: list, prompt, and re-list on demand or on
/// topology changes.
pub struct ChannelPrompt<'a> {
    client: &'a dyn ManagerClient,
    console: &'a Console,
    session: &'a Session,
    shutdown: &'a ShutdownSignal,
    refresh_interval: Option<Duration>,
    wait: Duration,
    tick: Duration,
}

impl<'a> ChannelPrompt<'a> {
    pub fn new(
        client: &'a dyn ManagerClient,
        console: &'a Console,
        session: &'a Session,
        shutdown: &'a ShutdownSignal,
    ) -> Self {
        Self {
            client,
            console,
            session,
            shutdown,
            refresh_interval: None,
            wait: Duration::from_secs(1),
            tick: Duration::from_millis(100),
        }
    }

    pub fn with_refresh_interval(mut self, interval: Option<Duration>) -> Self {
        self.refresh_interval = interval;
        self
    }

    /// Bounded wait for input between refresh checks.
    pub fn with_wait(mut self, wait: Duration) -> Self {
        self.wait = wait;
        self
    }

    /// Poll slice while a line is being typed.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn run<T: Terminal + ?Sized>(&self, terminal: &mut T) -> Result<PromptOutcome> {
        let mut listing = self.draw(None)?;
        let mut drawn_at = Instant::now();

        loop {
            if let Some(outcome) = self.shutdown_outcome()? {
                return Ok(outcome);
            }

            let periodic = self
                .refresh_interval
                .is_some_and(|interval| drawn_at.elapsed() >= interval);
            if self.session.take_topology_changed() || periodic {
                listing = self.draw(None)?;
                drawn_at = Instant::now();
                continue;
            }

            if !terminal.poll_input(self.wait)? {
                continue;
            }

            // Something was typed; wait for the rest of the line.
            let line = match read_line(terminal, self.tick, || self.shutdown.is_triggered())? {
                LineInput::Line(line) => line,
                LineInput::EndOfInput => return Ok(PromptOutcome::Quit),
                LineInput::Cancelled => continue,
            };

            match select_channel(&line, &listing) {
                Selection::Channel(channel) => {
                    debug!(%channel, "channel selected");
                    return Ok(PromptOutcome::Selected(channel));
                }
                Selection::Quit => return Ok(PromptOutcome::Quit),
                Selection::Refresh => listing = self.draw(None)?,
                Selection::Invalid(input) => {
                    warn!(%input, "invalid channel number");
                    listing = self.draw(Some(&input))?;
                }
            }
            drawn_at = Instant::now();
        }
    }

    fn draw(&self, invalid: Option<&str>) -> Result<ChannelListing> {
        // Consumed before the query so events racing it still trigger a redraw.
        self.session.take_topology_changed();
        self.console.clear_screen();
        self.console.print(&format!("{BANNER}{TARGET_HINT}"));
        let listing = list_channels(self.client).inspect_err(|err| {
            self.console.print("Failed to get channel list\n");
            warn!(error = %err, "channel listing failed");
        })?;

        let mut screen = listing.render();
        if let Some(input) = invalid {
            let _ = writeln!(screen, "Invalid channel number: {input}");
        }
        screen.push_str(PROMPT);
        self.console.print(&screen);
        Ok(listing)
    }

    fn shutdown_outcome(&self) -> Result<Option<PromptOutcome>> {
        match self.shutdown.reason() {
            None => Ok(None),
            Some(ShutdownReason::Interrupted) => Ok(Some(PromptOutcome::Interrupted)),
            Some(ShutdownReason::ConnectionLost) => Err(RelayError::ConnectionLost),
        }
    }
}

#[cfg(test)]
mod tests {
    use manager_api::{ActionResponse, ManagerEvent};
    use manager_mock::{ChannelFixture, ScriptedManager};
    use pretty_assertions::assert_eq;

    use super::{list_channels, select_channel, ChannelListing, Selection, LIST_CHANNELS_ACTION};
    use crate::error::RelayError;

    fn listing_of(count: usize) -> ChannelListing {
        let channels = (1..=count)
            .map(|n| ChannelFixture::new(format!("SIP/{n}00-000{n}")))
            .collect();
        list_channels(&ScriptedManager::with_channels(channels)).unwrap()
    }

    #[test]
    fn header_and_sentinel_are_not_channels() {
        let raw = ActionResponse::new(vec![
            ManagerEvent::from_pairs([("Response", "Success"), ("EventList", "start")]),
            ManagerEvent::from_pairs([("Event", "CoreShowChannel"), ("Channel", "SIP/a-1")]),
            ManagerEvent::from_pairs([("Event", "CoreShowChannel"), ("Channel", "SIP/b-2")]),
            ManagerEvent::from_pairs([("Event", "CoreShowChannel"), ("Channel", "SIP/c-3")]),
            ManagerEvent::from_pairs([("Event", "CoreShowChannelsComplete")]),
        ]);
        let listing = ChannelListing::from_response(&raw);
        assert_eq!(listing.len(), raw.len() - 2);
        let indices: Vec<usize> = listing.channels().iter().map(|row| row.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(listing.get(3).map(|row| row.channel_id.as_str()), Some("SIP/c-3"));
        assert_eq!(listing.get(0), None);
    }

    #[test]
    fn short_responses_yield_empty_listing() {
        let only_header = ActionResponse::new(vec![ManagerEvent::from_pairs([(
            "Response", "Success",
        )])]);
        assert!(ChannelListing::from_response(&only_header).is_empty());
        assert!(ChannelListing::from_response(&ActionResponse::new(Vec::new())).is_empty());
    }

    #[test]
    fn render_lists_rows_in_display_order() {
        let manager = ScriptedManager::with_channels(vec![
            ChannelFixture::new("SIP/100-0001").with_caller("100", "5551212"),
        ]);
        let rendered = list_channels(&manager).unwrap().render();
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "Channels: 1");
        assert!(lines[1].contains("Caller ID"));
        assert!(lines[2].trim_start().starts_with("1 | SIP/100-0001"));
        assert!(lines[2].ends_with("5551212"));
    }

    #[test]
    fn quit_and_refresh_ignore_listing_size() {
        let empty = ChannelListing::default();
        assert_eq!(select_channel("q\n", &empty), Selection::Quit);
        assert_eq!(select_channel("Q\n", &listing_of(3)), Selection::Quit);
        assert_eq!(select_channel("\n", &empty), Selection::Refresh);
    }

    #[test]
    fn only_displayed_indices_resolve() {
        // Raw size N = 5 for three channels.
        let listing = listing_of(3);
        assert_eq!(
            select_channel("1\n", &listing),
            Selection::Channel("SIP/100-0001".to_string())
        );
        assert_eq!(
            select_channel(" 3 \n", &listing),
            Selection::Channel("SIP/300-0003".to_string())
        );
        assert_eq!(select_channel("0\n", &listing), Selection::Invalid("0".into()));
        assert_eq!(select_channel("4\n", &listing), Selection::Invalid("4".into()));
        assert_eq!(select_channel("two\n", &listing), Selection::Invalid("two".into()));
        assert_eq!(select_channel("-1\n", &listing), Selection::Invalid("-1".into()));
    }

    #[test]
    fn failed_listing_is_directory_unavailable() {
        let manager = ScriptedManager::new();
        manager.reject_action(LIST_CHANNELS_ACTION);
        assert!(matches!(
            list_channels(&manager),
            Err(RelayError::DirectoryUnavailable { .. })
        ));

        let manager = ScriptedManager::new();
        manager.drop_connection_on(LIST_CHANNELS_ACTION);
        assert!(matches!(
            list_channels(&manager),
            Err(RelayError::DirectoryUnavailable { .. })
        ));
    }
}
