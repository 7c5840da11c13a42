//! termios-backed terminal for the controlling TTY, plus signal and panic hooks.

use std::io;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, MutexGuard,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[cfg(unix)]
use libc::{self, c_int};
#[cfg(unix)]
use signal_hook::iterator::Signals;
use tracing::{debug, warn};

use crate::core::terminal::{Terminal, TerminalMode};

#[cfg(unix)]
fn poll_readable(fd: c_int, timeout_ms: i32) -> io::Result<bool> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    loop {
        let result = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        // Hang-up counts as readable: the next read reports end of input.
        let ready = libc::POLLIN | libc::POLLHUP | libc::POLLERR;
        return Ok(result > 0 && (fds.revents & ready) != 0);
    }
}

#[cfg(unix)]
fn get_termios(fd: c_int) -> io::Result<libc::termios> {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(termios)
}

#[cfg(unix)]
fn set_termios(fd: c_int, termios: &libc::termios) -> io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(unix)]
fn attributes_for(original: &libc::termios, mode: TerminalMode) -> libc::termios {
    let mut attrs = *original;
    match mode {
        TerminalMode::Cooked => {}
        TerminalMode::Unbuffered => {
            attrs.c_lflag &= !libc::ICANON;
        }
        TerminalMode::Raw => {
            attrs.c_lflag &= !(libc::ICANON | libc::ECHO);
        }
    }
    if mode != TerminalMode::Cooked {
        attrs.c_cc[libc::VMIN] = 1;
        attrs.c_cc[libc::VTIME] = 0;
    }
    attrs
}

#[cfg(unix)]
#[derive(Default)]
struct SavedAttributes {
    original: Option<libc::termios>,
    restored: bool,
}

#[cfg(unix)]
fn lock_saved(saved: &Mutex<SavedAttributes>) -> MutexGuard<'_, SavedAttributes> {
    match saved.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Cloneable handle that puts the saved attributes back from any thread.
///
/// Used by the panic hook and by teardown; whichever runs first wins.
#[cfg(unix)]
#[derive(Clone)]
pub struct RestoreHandle {
    fd: c_int,
    saved: Arc<Mutex<SavedAttributes>>,
}

#[cfg(unix)]
impl RestoreHandle {
    /// Returns `Ok(true)` when attributes were written, `Ok(false)` when there
    /// was nothing to restore.
    pub fn restore(&self) -> io::Result<bool> {
        let mut saved = lock_saved(&self.saved);
        if saved.restored {
            return Ok(false);
        }
        let Some(original) = saved.original.as_ref() else {
            return Ok(false);
        };
        set_termios(self.fd, original)?;
        saved.restored = true;
        Ok(true)
    }
}

#[cfg(unix)]
pub struct ProcessTerminal {
    fd: c_int,
    saved: Arc<Mutex<SavedAttributes>>,
    mode: Option<TerminalMode>,
}

#[cfg(unix)]
impl ProcessTerminal {
    /// Terminal on standard input.
    pub fn new() -> Self {
        Self::from_fd(libc::STDIN_FILENO)
    }

    /// Terminal on an arbitrary TTY descriptor. The descriptor is not closed.
    pub fn from_fd(fd: c_int) -> Self {
        Self {
            fd,
            saved: Arc::new(Mutex::new(SavedAttributes::default())),
            mode: None,
        }
    }

    pub fn restore_handle(&self) -> RestoreHandle {
        RestoreHandle {
            fd: self.fd,
            saved: Arc::clone(&self.saved),
        }
    }

    /// Mode last applied through [`Terminal::set_mode`].
    pub fn mode(&self) -> Option<TerminalMode> {
        self.mode
    }

    fn original(&self) -> io::Result<libc::termios> {
        let mut saved = lock_saved(&self.saved);
        if let Some(original) = saved.original {
            return Ok(original);
        }
        let original = get_termios(self.fd)?;
        saved.original = Some(original);
        Ok(original)
    }
}

#[cfg(unix)]
impl Default for ProcessTerminal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
impl Terminal for ProcessTerminal {
    fn set_mode(&mut self, mode: TerminalMode) -> io::Result<()> {
        let original = self.original()?;
        set_termios(self.fd, &attributes_for(&original, mode))?;
        lock_saved(&self.saved).restored = false;
        self.mode = Some(mode);
        debug!(?mode, "terminal mode applied");
        Ok(())
    }

    fn restore(&mut self) -> io::Result<()> {
        if self.restore_handle().restore()? {
            self.mode = Some(TerminalMode::Cooked);
            debug!("terminal attributes restored");
        }
        Ok(())
    }

    fn poll_input(&mut self, timeout: Duration) -> io::Result<bool> {
        let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        poll_readable(self.fd, timeout_ms)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = 0u8;
        loop {
            let read_len = unsafe { libc::read(self.fd, (&mut byte as *mut u8).cast(), 1) };
            if read_len < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::Interrupted {
                    continue;
                }
                return Err(err);
            }
            return Ok((read_len == 1).then_some(byte));
        }
    }
}

/// Signal handler guard for interrupt hooks.
#[cfg(unix)]
pub struct SignalHookGuard {
    handle: signal_hook::iterator::Handle,
    thread: Option<JoinHandle<()>>,
}

#[cfg(unix)]
impl Drop for SignalHookGuard {
    fn drop(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

/// Runs `on_signal` from an ordinary thread whenever SIGINT or SIGTERM arrives.
///
/// Nothing runs in signal context; the callback is expected to flag shutdown
/// and let the main loop clean up.
#[cfg(unix)]
pub fn install_signal_handlers<F>(on_signal: F) -> io::Result<SignalHookGuard>
where
    F: Fn(c_int) + Send + 'static,
{
    let mut signals = Signals::new([libc::SIGINT, libc::SIGTERM])?;
    let handle = signals.handle();

    let thread = thread::Builder::new()
        .name("signal-hook".to_string())
        .spawn(move || {
            for signal in signals.forever() {
                warn!(signal, "interrupt received");
                on_signal(signal);
            }
        })?;

    Ok(SignalHookGuard {
        handle,
        thread: Some(thread),
    })
}

/// Panic hook guard; dropping it disarms the cleanup.
pub struct PanicHookGuard {
    armed: Arc<AtomicBool>,
}

impl Drop for PanicHookGuard {
    fn drop(&mut self) {
        self.armed.store(false, Ordering::SeqCst);
    }
}

/// Install a panic hook that runs `cleanup` once, then delegates to the previous hook.
pub fn install_panic_hook<F>(cleanup: F) -> PanicHookGuard
where
    F: Fn() + Send + Sync + 'static,
{
    let armed = Arc::new(AtomicBool::new(true));
    let armed_for_hook = Arc::clone(&armed);
    let previous = std::panic::take_hook();

    std::panic::set_hook(Box::new(move |info| {
        if armed_for_hook.swap(false, Ordering::SeqCst) {
            cleanup();
        }
        previous(info);
    }));

    PanicHookGuard { armed }
}

#[cfg(all(test, unix))]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, OnceLock};
    use std::time::Duration;

    use libc::{self, c_int};

    use super::{get_termios, install_panic_hook, ProcessTerminal};
    use crate::core::terminal::{Terminal, TerminalMode};

    struct Pty {
        master: c_int,
        slave: c_int,
    }

    impl Drop for Pty {
        fn drop(&mut self) {
            unsafe {
                libc::close(self.master);
                libc::close(self.slave);
            }
        }
    }

    fn open_pty() -> Pty {
        let mut master: c_int = 0;
        let mut slave: c_int = 0;
        let result = unsafe {
            libc::openpty(
                &mut master,
                &mut slave,
                std::ptr::null_mut(),
                std::ptr::null_mut(),
                std::ptr::null_mut(),
            )
        };
        assert_eq!(result, 0, "openpty failed");
        Pty { master, slave }
    }

    fn write_master(pty: &Pty, data: &[u8]) {
        let written = unsafe { libc::write(pty.master, data.as_ptr().cast(), data.len()) };
        assert_eq!(written, data.len() as isize, "write to pty master failed");
    }

    fn lflag(fd: c_int) -> libc::tcflag_t {
        get_termios(fd).expect("tcgetattr").c_lflag
    }

    fn panic_hook_test_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    #[test]
    fn modes_toggle_canonical_and_echo_and_restore_puts_original_back() {
        let pty = open_pty();
        let original = lflag(pty.slave);
        assert_ne!(original & libc::ICANON, 0, "pty should start canonical");

        let mut terminal = ProcessTerminal::from_fd(pty.slave);

        terminal.set_mode(TerminalMode::Unbuffered).expect("unbuffered");
        let unbuffered = lflag(pty.slave);
        assert_eq!(unbuffered & libc::ICANON, 0);
        assert_eq!(unbuffered & libc::ECHO, original & libc::ECHO);
        assert_eq!(unbuffered & libc::ISIG, original & libc::ISIG);

        terminal.set_mode(TerminalMode::Raw).expect("raw");
        let raw = lflag(pty.slave);
        assert_eq!(raw & (libc::ICANON | libc::ECHO), 0);

        terminal.restore().expect("restore");
        assert_eq!(lflag(pty.slave), original);
        assert_eq!(terminal.mode(), Some(TerminalMode::Cooked));
    }

    #[test]
    fn restore_is_effective_once_and_shared_with_handles() {
        let pty = open_pty();
        let original = lflag(pty.slave);
        let mut terminal = ProcessTerminal::from_fd(pty.slave);
        let handle = terminal.restore_handle();

        assert!(!handle.restore().expect("nothing saved yet"));

        terminal.set_mode(TerminalMode::Raw).expect("raw");
        assert!(handle.restore().expect("first restore"));
        assert_eq!(lflag(pty.slave), original);
        assert!(!handle.restore().expect("second restore"));
        terminal.restore().expect("terminal restore after handle");
        assert_eq!(lflag(pty.slave), original);
    }

    #[test]
    fn reads_single_bytes_once_polled_readable() {
        let pty = open_pty();
        let mut terminal = ProcessTerminal::from_fd(pty.slave);
        terminal.set_mode(TerminalMode::Raw).expect("raw");

        assert!(!terminal
            .poll_input(Duration::from_millis(10))
            .expect("poll idle"));

        write_master(&pty, b"hi");
        assert!(terminal
            .poll_input(Duration::from_millis(500))
            .expect("poll ready"));
        assert_eq!(terminal.read_byte().expect("first byte"), Some(b'h'));
        assert_eq!(terminal.read_byte().expect("second byte"), Some(b'i'));

        terminal.restore().expect("restore");
    }

    #[test]
    fn panic_hook_runs_cleanup_once_and_guard_disarms() {
        let _guard = panic_hook_test_lock()
            .lock()
            .expect("panic hook test lock poisoned");

        let original = std::panic::take_hook();
        std::panic::set_hook(Box::new(|_| {}));

        let cleanups = Arc::new(AtomicUsize::new(0));
        let hook_guard = install_panic_hook({
            let cleanups = Arc::clone(&cleanups);
            move || {
                cleanups.fetch_add(1, Ordering::SeqCst);
            }
        });

        let _ = std::panic::catch_unwind(|| panic!("first"));
        let _ = std::panic::catch_unwind(|| panic!("second"));
        assert_eq!(cleanups.load(Ordering::SeqCst), 1);

        drop(hook_guard);
        std::panic::set_hook(original);
    }
}
