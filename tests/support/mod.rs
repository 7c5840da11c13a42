#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tdd_relay::{Terminal, TerminalMode};

/// Everything the engine did to the scripted terminal.
#[derive(Debug)]
pub struct TerminalTrace {
    pub input: VecDeque<u8>,
    /// Once the queue runs dry, report end of input instead of idling.
    pub eof: bool,
    pub modes: Vec<TerminalMode>,
    pub current: TerminalMode,
    /// Set by the first mode change, like saving the original attributes.
    pub saved: bool,
    pub restored: bool,
    pub restore_calls: usize,
    pub effective_restores: usize,
}

impl Default for TerminalTrace {
    fn default() -> Self {
        Self {
            input: VecDeque::new(),
            eof: true,
            modes: Vec::new(),
            current: TerminalMode::Cooked,
            saved: false,
            restored: false,
            restore_calls: 0,
            effective_restores: 0,
        }
    }
}

pub struct ScriptedTerminal {
    state: Arc<Mutex<TerminalTrace>>,
}

impl ScriptedTerminal {
    /// Terminal that yields `input` and then reports end of input.
    pub fn new(input: &[u8]) -> (Self, Arc<Mutex<TerminalTrace>>) {
        Self::build(input, true)
    }

    /// Terminal that idles once `input` is consumed; feed more with [`push_input`].
    pub fn open(input: &[u8]) -> (Self, Arc<Mutex<TerminalTrace>>) {
        Self::build(input, false)
    }

    fn build(input: &[u8], eof: bool) -> (Self, Arc<Mutex<TerminalTrace>>) {
        let state = Arc::new(Mutex::new(TerminalTrace {
            input: input.iter().copied().collect(),
            eof,
            ..TerminalTrace::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            state,
        )
    }
}

impl Terminal for ScriptedTerminal {
    fn set_mode(&mut self, mode: TerminalMode) -> io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.saved = true;
        state.restored = false;
        state.current = mode;
        state.modes.push(mode);
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        let mut state = lock_unpoisoned(&self.state);
        state.restore_calls += 1;
        if state.saved && !state.restored {
            state.restored = true;
            state.current = TerminalMode::Cooked;
            state.effective_restores += 1;
        }
        Ok(())
    }

    fn poll_input(&mut self, timeout: Duration) -> io::Result<bool> {
        {
            let state = lock_unpoisoned(&self.state);
            if !state.input.is_empty() || state.eof {
                return Ok(true);
            }
        }
        thread::sleep(timeout.min(Duration::from_millis(2)));
        Ok(false)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(lock_unpoisoned(&self.state).input.pop_front())
    }
}

pub fn push_input(state: &Arc<Mutex<TerminalTrace>>, bytes: &[u8]) {
    lock_unpoisoned(state).input.extend(bytes.iter().copied());
}

pub fn close_input(state: &Arc<Mutex<TerminalTrace>>) {
    lock_unpoisoned(state).eof = true;
}

/// Shared in-memory stdout.
#[derive(Clone, Default)]
pub struct Capture(Arc<Mutex<Vec<u8>>>);

impl Capture {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&lock_unpoisoned(&self.0)).into_owned()
    }
}

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        lock_unpoisoned(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Polls `condition` until it holds, panicking after `timeout`.
pub fn wait_until(timeout: Duration, what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(2));
    }
}

pub fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
