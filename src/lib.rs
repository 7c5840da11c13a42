//! Virtual TDD/TTY relay for Asterisk.
//!
//! Keystrokes typed on the local terminal are sent as baudot text to a live
//! channel, and text decoded on that channel streams back to the terminal.
//!
//! Invariant: single output gate. Only [`Console`] writes to the terminal, and
//! it owns the turn indicator.
//!
//! # Public API Overview
//! - Drive a whole session with [`RelaySession`] over any [`Terminal`] and
//!   [`manager_api::ManagerClient`].
//! - Spawn the inbound side with [`EventRelay`] on the client's notice queue.
//! - Use the pieces directly: [`InputMachine`] for the escape command
//!   automaton, [`select_channel`] for prompt input, [`decode_payload`] and
//!   [`encode_text`] for the wire conventions.

pub mod config;
pub mod core;
pub mod directory;
pub mod error;
pub mod input;
pub mod lifecycle;
pub mod logging;
pub mod outbound;
pub mod platform;
pub mod relay;
pub mod session;

pub use crate::config::{EnvConfig, SessionOptions};
pub use crate::core::output::{Console, Turn};
pub use crate::core::terminal::{Terminal, TerminalGuard, TerminalMode};
pub use crate::directory::{
    list_channels, select_channel, ChannelDescriptor, ChannelListing, ChannelPrompt,
    PromptOutcome, Selection,
};
pub use crate::error::RelayError;
pub use crate::input::{InputLoop, InputMachine, InputOutcome, KeyAction, KeyCommand};
pub use crate::lifecycle::{RelaySession, SessionEnd};
pub use crate::outbound::{encode_text, is_tone_char, Outbound, OutboundAction};
#[cfg(unix)]
pub use crate::platform::process_terminal::ProcessTerminal;
pub use crate::relay::{decode_payload, EventKind, EventRelay, InboundTextEvent};
pub use crate::session::{Phase, Session, ShutdownReason, ShutdownSignal};
