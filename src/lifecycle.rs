//! Top-level session loop: select, enable, relay, then reselect or tear down.

use std::sync::Arc;

use manager_api::ManagerClient;
use tracing::{info, warn};

use crate::config::SessionOptions;
use crate::core::output::Console;
use crate::core::terminal::{Terminal, TerminalGuard, TerminalMode};
use crate::directory::{ChannelPrompt, PromptOutcome, BANNER};
use crate::error::Result;
use crate::input::{InputLoop, InputOutcome, COMMAND_MENU};
use crate::outbound::Outbound;
use crate::relay::EventRelay;
use crate::session::{Session, ShutdownSignal};

/// How a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    Quit,
    EndOfInput,
    Interrupted,
}

pub struct RelaySession<T: Terminal> {
    client: Arc<dyn ManagerClient>,
    terminal: TerminalGuard<T>,
    console: Arc<Console>,
    session: Arc<Session>,
    shutdown: Arc<ShutdownSignal>,
    options: SessionOptions,
}

impl<T: Terminal> RelaySession<T> {
    pub fn new(
        client: Arc<dyn ManagerClient>,
        terminal: T,
        console: Arc<Console>,
        options: SessionOptions,
    ) -> Self {
        Self {
            client,
            terminal: TerminalGuard::new(terminal),
            console,
            session: Arc::new(Session::new()),
            shutdown: Arc::new(ShutdownSignal::new()),
            options,
        }
    }

    pub fn session(&self) -> Arc<Session> {
        Arc::clone(&self.session)
    }

    /// Flag observed by every wait in the session; set it to stop the loop.
    pub fn shutdown(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.shutdown)
    }

    /// Relay sharing this session's state, ready to be spawned on the notice queue.
    pub fn event_relay(&self) -> EventRelay {
        EventRelay::new(
            Arc::clone(&self.session),
            Arc::clone(&self.console),
            Arc::clone(&self.shutdown),
        )
    }

    /// Runs selection and relay cycles until the session ends, then
    /// disconnects and restores the terminal on every path.
    pub fn run(mut self) -> Result<SessionEnd> {
        let result = self.run_cycles();

        self.session.end();
        if let Err(err) = self.terminal.restore() {
            warn!(error = %err, "failed to restore terminal");
        }
        self.client.disconnect();

        match &result {
            Ok(end) => info!(?end, "session ended"),
            Err(err) => warn!(error = %err, "session failed"),
        }
        result
    }

    fn run_cycles(&mut self) -> Result<SessionEnd> {
        let mut preselected = self.options.channel.take();

        loop {
            self.session.begin_selection();
            self.terminal.set_mode(TerminalMode::Unbuffered)?;

            let channel = match preselected.take() {
                Some(channel) => channel,
                None => match self.prompt()? {
                    PromptOutcome::Selected(channel) => channel,
                    PromptOutcome::Quit => return Ok(SessionEnd::Quit),
                    PromptOutcome::Interrupted => return Ok(SessionEnd::Interrupted),
                },
            };

            let outbound = Outbound::new(
                Arc::clone(&self.client),
                Arc::clone(&self.console),
                channel.as_str(),
            );
            if let Err(err) = outbound.enable_relay() {
                self.console
                    .print(&format!("Failed to enable TTY on channel {channel}\n"));
                return Err(err);
            }
            info!(%channel, "relay enabled");

            self.console.clear_screen();
            self.console.print(&format!("{BANNER}{COMMAND_MENU}"));
            self.console.reset_turn();
            self.terminal.set_mode(TerminalMode::Raw)?;
            self.session.activate(&channel);

            let outcome = InputLoop::new(&self.console, &outbound, &self.shutdown)
                .with_tick(self.options.input_tick)
                .with_dial_delay(self.options.dial_delay)
                .run(&mut *self.terminal)?;

            match outcome {
                InputOutcome::Reselect => {
                    info!(%channel, "leaving channel for reselection");
                }
                InputOutcome::Quit => return Ok(SessionEnd::Quit),
                InputOutcome::EndOfInput => return Ok(SessionEnd::EndOfInput),
                InputOutcome::Interrupted => return Ok(SessionEnd::Interrupted),
            }
        }
    }

    fn prompt(&mut self) -> Result<PromptOutcome> {
        ChannelPrompt::new(
            self.client.as_ref(),
            &self.console,
            &self.session,
            &self.shutdown,
        )
        .with_refresh_interval(self.options.refresh_interval)
        .with_wait(self.options.prompt_wait)
        .with_tick(self.options.input_tick)
        .run(&mut *self.terminal)
    }
}
