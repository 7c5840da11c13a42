//! Keystroke handling for an active relay.
//!
//! [`InputMachine`] is the escape-prefixed command automaton and does no I/O.
//! [`InputLoop`] drives it from the terminal and carries out what it decides.

use std::time::Duration;

use tracing::{debug, info};

use crate::core::output::Console;
use crate::core::terminal::{read_line, LineInput, Terminal, TerminalMode};
use crate::error::{RelayError, Result};
use crate::outbound::{is_tone_char, Outbound, GREETING};
use crate::session::{ShutdownReason, ShutdownSignal};

pub const KEY_ESCAPE: u8 = 0x1b;

pub const COMMAND_MENU: &str = "ESC + [H] Help [Q] Quit [D] DTMF Mode [1] Dial Number [2] Hangup [4] Send Greeting [8] Clear Screen\n";
pub const DIAL_PROMPT: &str = "\nNBR: ";
pub const DISCONNECTED_NOTICE: &str = "\n*** CALL DISCONNECTED ***\n";

/// Commands reachable as `ESC` followed by one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Quit,
    Help,
    ToggleDtmf,
    Dial,
    Reselect,
    Greeting,
    ClearScreen,
}

impl KeyCommand {
    pub fn from_key(key: u8) -> Option<Self> {
        match key {
            b'q' | b'Q' => Some(Self::Quit),
            b'h' | b'H' => Some(Self::Help),
            b'd' | b'D' => Some(Self::ToggleDtmf),
            b'1' => Some(Self::Dial),
            b'2' => Some(Self::Reselect),
            b'4' => Some(Self::Greeting),
            b'8' => Some(Self::ClearScreen),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputState {
    #[default]
    Normal,
    EscapePending,
}

/// What a single key asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Ignore,
    Text(char),
    Tone(char),
    Command(KeyCommand),
}

#[derive(Debug, Default)]
pub struct InputMachine {
    state: InputState,
    dtmf_mode: bool,
}

impl InputMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn dtmf_mode(&self) -> bool {
        self.dtmf_mode
    }

    pub fn feed(&mut self, key: u8) -> KeyAction {
        match self.state {
            InputState::EscapePending => {
                if key == KEY_ESCAPE {
                    return KeyAction::Ignore;
                }
                self.state = InputState::Normal;
                match KeyCommand::from_key(key) {
                    Some(KeyCommand::ToggleDtmf) => {
                        self.dtmf_mode = !self.dtmf_mode;
                        KeyAction::Command(KeyCommand::ToggleDtmf)
                    }
                    Some(command) => KeyAction::Command(command),
                    None => KeyAction::Ignore,
                }
            }
            InputState::Normal => {
                if key == KEY_ESCAPE {
                    self.state = InputState::EscapePending;
                    return KeyAction::Ignore;
                }
                if !key.is_ascii() {
                    return KeyAction::Ignore;
                }
                let ch = char::from(key);
                if self.dtmf_mode && is_tone_char(ch) {
                    KeyAction::Tone(ch)
                } else {
                    KeyAction::Text(ch)
                }
            }
        }
    }
}

/// How the keystroke loop ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputOutcome {
    Quit,
    Reselect,
    EndOfInput,
    Interrupted,
}

pub struct InputLoop<'a> {
    console: &'a Console,
    outbound: &'a Outbound,
    shutdown: &'a ShutdownSignal,
    machine: InputMachine,
    tick: Duration,
    dial_delay: Duration,
}

impl<'a> InputLoop<'a> {
    pub fn new(console: &'a Console, outbound: &'a Outbound, shutdown: &'a ShutdownSignal) -> Self {
        Self {
            console,
            outbound,
            shutdown,
            machine: InputMachine::new(),
            tick: Duration::from_millis(100),
            dial_delay: Duration::from_millis(100),
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_dial_delay(mut self, delay: Duration) -> Self {
        self.dial_delay = delay;
        self
    }

    /// Runs until a command, end of input, or shutdown ends the relay.
    ///
    /// A failed outbound action ends the loop with `ActionFailed`; a dropped
    /// manager connection ends it with `ConnectionLost`.
    pub fn run<T: Terminal + ?Sized>(&mut self, terminal: &mut T) -> Result<InputOutcome> {
        loop {
            match self.shutdown.reason() {
                Some(ShutdownReason::Interrupted) => return Ok(InputOutcome::Interrupted),
                Some(ShutdownReason::ConnectionLost) => return Err(RelayError::ConnectionLost),
                None => {}
            }

            if !terminal.poll_input(self.tick)? {
                continue;
            }
            let Some(key) = terminal.read_byte()? else {
                info!(channel = self.outbound.channel(), "terminal reached end of input");
                return Ok(InputOutcome::EndOfInput);
            };

            match self.machine.feed(key) {
                KeyAction::Ignore => {}
                KeyAction::Text(ch) => {
                    let mut buf = [0u8; 4];
                    self.deliver(self.outbound.send_text(ch.encode_utf8(&mut buf)))?;
                }
                KeyAction::Tone(digit) => self.deliver(self.outbound.send_tone(digit))?,
                KeyAction::Command(command) => {
                    if let Some(outcome) = self.command(command, terminal)? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    fn command<T: Terminal + ?Sized>(
        &mut self,
        command: KeyCommand,
        terminal: &mut T,
    ) -> Result<Option<InputOutcome>> {
        debug!(?command, "escape command");
        match command {
            KeyCommand::Quit => return Ok(Some(InputOutcome::Quit)),
            KeyCommand::Reselect => return Ok(Some(InputOutcome::Reselect)),
            KeyCommand::Help => self.console.print(&format!("\n{COMMAND_MENU}")),
            KeyCommand::ToggleDtmf => {
                info!(dtmf_mode = self.machine.dtmf_mode(), "DTMF mode toggled");
            }
            KeyCommand::Greeting => self.deliver(self.outbound.send_text(GREETING))?,
            KeyCommand::ClearScreen => self.console.clear_screen(),
            KeyCommand::Dial => return self.dial(terminal),
        }
        Ok(None)
    }

    fn dial<T: Terminal + ?Sized>(&mut self, terminal: &mut T) -> Result<Option<InputOutcome>> {
        self.console.print(DIAL_PROMPT);

        terminal.set_mode(TerminalMode::Cooked)?;
        let line = read_line(terminal, self.tick, || self.shutdown.is_triggered());
        terminal.set_mode(TerminalMode::Raw)?;

        match line? {
            LineInput::Line(digits) => {
                self.deliver(self.outbound.dial(&digits, self.dial_delay).map(|_| ()))?;
                Ok(None)
            }
            LineInput::EndOfInput => Ok(Some(InputOutcome::EndOfInput)),
            // The loop reports the shutdown reason on its next turn.
            LineInput::Cancelled => Ok(None),
        }
    }

    fn deliver(&self, result: Result<()>) -> Result<()> {
        if let Err(err) = result {
            if matches!(err, RelayError::ActionFailed { .. }) {
                self.console.print(DISCONNECTED_NOTICE);
            }
            return Err(err);
        }
        Ok(())
    }
}
