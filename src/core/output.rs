//! Shared output sink and the turn indicator.
//!
//! Invariant: all terminal writes go through [`Console`], and a turn label is
//! written under the same lock as the first chunk of text that follows it.

use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Printed when the floor passes to the local typist.
pub const LOCAL_LABEL: &str = "\nCA : ";
/// Printed when the floor passes to the remote TTY party.
pub const REMOTE_LABEL: &str = "\nTTY: ";
pub const CLEAR_SCREEN: &str = "\x1b[1;1H\x1b[2J";

/// Which party has the floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Turn {
    #[default]
    Unset,
    Local,
    Remote,
}

struct ConsoleState {
    out: Box<dyn Write + Send>,
    turn: Turn,
    write_failed: bool,
}

impl ConsoleState {
    fn emit(&mut self, label: Option<&str>, text: &str) {
        let result = label
            .map_or(Ok(()), |label| self.out.write_all(label.as_bytes()))
            .and_then(|()| self.out.write_all(text.as_bytes()))
            .and_then(|()| self.out.flush());
        if let Err(err) = result {
            // Log once; a closed stdout should not flood the log.
            if !self.write_failed {
                warn!(error = %err, "terminal write failed");
                self.write_failed = true;
            }
        }
    }
}

/// Terminal output gate shared by the input loop and the event relay.
pub struct Console {
    state: Mutex<ConsoleState>,
}

impl Console {
    pub fn new(out: impl Write + Send + 'static) -> Self {
        Self {
            state: Mutex::new(ConsoleState {
                out: Box::new(out),
                turn: Turn::Unset,
                write_failed: false,
            }),
        }
    }

    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }

    /// Writes `text` and flushes without touching the turn.
    pub fn print(&self, text: &str) {
        self.lock().emit(None, text);
    }

    /// Echoes text the local user sent, labelling a change of turn.
    pub fn local_text(&self, typed: &str) {
        let mut state = self.lock();
        let label = (state.turn != Turn::Local).then_some(LOCAL_LABEL);
        state.turn = Turn::Local;
        state.emit(label, typed);
    }

    /// Shows text received from the remote party, labelling a change of turn.
    ///
    /// Coming from `Unset` there was no previous speaker, so no label is shown.
    pub fn remote_text(&self, text: &str) {
        let mut state = self.lock();
        let label = (state.turn == Turn::Local).then_some(REMOTE_LABEL);
        state.turn = Turn::Remote;
        state.emit(label, text);
    }

    pub fn clear_screen(&self) {
        self.print(CLEAR_SCREEN);
    }

    pub fn turn(&self) -> Turn {
        self.lock().turn
    }

    pub fn reset_turn(&self) {
        self.lock().turn = Turn::Unset;
    }

    fn lock(&self) -> MutexGuard<'_, ConsoleState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use pretty_assertions::assert_eq;

    use super::{Console, Turn, LOCAL_LABEL, REMOTE_LABEL};

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn labels_only_appear_on_turn_changes() {
        let capture = Capture::default();
        let console = Console::new(capture.clone());

        console.local_text("H");
        console.local_text("I");
        console.remote_text("HEL");
        console.remote_text("LO");
        console.local_text("!");

        assert_eq!(
            capture.text(),
            format!("{LOCAL_LABEL}HI{REMOTE_LABEL}HELLO{LOCAL_LABEL}!")
        );
        assert_eq!(console.turn(), Turn::Local);
    }

    #[test]
    fn remote_first_has_no_label_and_reset_forgets_the_floor() {
        let capture = Capture::default();
        let console = Console::new(capture.clone());

        console.remote_text("GA");
        assert_eq!(capture.text(), "GA");

        console.local_text("OK");
        console.reset_turn();
        assert_eq!(console.turn(), Turn::Unset);
        console.remote_text("X");
        assert_eq!(capture.text(), format!("GA{LOCAL_LABEL}OKX"));
    }

    #[test]
    fn print_leaves_turn_untouched() {
        let capture = Capture::default();
        let console = Console::new(capture.clone());
        console.local_text("A");
        console.print("\nmenu\n");
        console.local_text("B");
        assert_eq!(capture.text(), format!("{LOCAL_LABEL}A\nmenu\nB"));
    }
}
