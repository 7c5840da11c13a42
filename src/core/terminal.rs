//! Terminal trait, restore guard and poll-driven line reads.

use std::io;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Bytes of a line kept by [`read_line`]; the remainder is discarded.
pub const MAX_LINE_BYTES: usize = 256;

/// Line discipline applied to the controlling terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalMode {
    /// Attributes saved before the first mode change.
    Cooked,
    /// Canonical mode off: keystrokes arrive one at a time and are still echoed.
    Unbuffered,
    /// Canonical mode and echo off: the relay echoes explicitly.
    Raw,
}

/// Minimal terminal interface for the relay.
pub trait Terminal: Send {
    /// Switch line discipline. The first call saves the original attributes.
    fn set_mode(&mut self, mode: TerminalMode) -> io::Result<()>;

    /// Put back the saved attributes. Only the first call after a mode change
    /// has any effect.
    fn restore(&mut self) -> io::Result<()>;

    /// Wait up to `timeout` for input. `Ok(true)` means a read will not block.
    fn poll_input(&mut self, timeout: Duration) -> io::Result<bool>;

    /// Read one byte. `Ok(None)` at end of input.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
}

/// RAII guard that restores the terminal on drop.
pub struct TerminalGuard<T: Terminal> {
    terminal: T,
}

impl<T: Terminal> TerminalGuard<T> {
    pub fn new(terminal: T) -> Self {
        Self { terminal }
    }
}

impl<T: Terminal> Deref for TerminalGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.terminal
    }
}

impl<T: Terminal> DerefMut for TerminalGuard<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.terminal
    }
}

impl<T: Terminal> Drop for TerminalGuard<T> {
    fn drop(&mut self) {
        let _ = self.terminal.restore();
    }
}

/// Result of a cancellable line read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineInput {
    /// The bytes read, including the trailing `\n` when one arrived.
    Line(String),
    EndOfInput,
    Cancelled,
}

/// Reads bytes up to and including `\n`, polling in `tick` slices so that
/// `cancelled` is observed while the user is idle.
///
/// At most `MAX_LINE_BYTES` are kept. A longer line is consumed through its
/// `\n` so the overflow never reaches the next reader.
pub fn read_line<T, F>(terminal: &mut T, tick: Duration, cancelled: F) -> io::Result<LineInput>
where
    T: Terminal + ?Sized,
    F: Fn() -> bool,
{
    let mut bytes = Vec::new();
    loop {
        if cancelled() {
            return Ok(LineInput::Cancelled);
        }
        if !terminal.poll_input(tick)? {
            continue;
        }

        match terminal.read_byte()? {
            None if bytes.is_empty() => return Ok(LineInput::EndOfInput),
            None => break,
            // Past the limit the rest of the line is read and discarded.
            Some(byte) if bytes.len() >= MAX_LINE_BYTES => {
                if byte == b'\n' {
                    break;
                }
            }
            Some(byte) => {
                bytes.push(byte);
                if byte == b'\n' {
                    break;
                }
            }
        }
    }

    Ok(LineInput::Line(String::from_utf8_lossy(&bytes).into_owned()))
}
