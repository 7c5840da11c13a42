//! Per-process session state shared by the lifecycle loop and the event relay.

use std::sync::{
    atomic::{AtomicBool, AtomicU8, Ordering},
    Mutex, MutexGuard,
};

/// Where the lifecycle currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Selecting,
    Active,
}

#[derive(Debug, Default)]
struct SessionState {
    phase: Phase,
    channel: Option<String>,
}

/// Active channel and phase, plus the topology-changed flag.
///
/// Phase and channel are always read and written together so the relay never
/// pairs an `Active` phase with a stale channel.
#[derive(Debug, Default)]
pub struct Session {
    state: Mutex<SessionState>,
    topology_changed: AtomicBool,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops the current channel and enters `Selecting` in one step.
    pub fn begin_selection(&self) {
        let mut state = self.lock();
        state.channel = None;
        state.phase = Phase::Selecting;
    }

    pub fn activate(&self, channel: &str) {
        let mut state = self.lock();
        state.channel = Some(channel.to_string());
        state.phase = Phase::Active;
    }

    pub fn end(&self) {
        let mut state = self.lock();
        state.channel = None;
        state.phase = Phase::Idle;
    }

    /// True only while relaying on exactly `channel`.
    pub fn is_active_on(&self, channel: &str) -> bool {
        let state = self.lock();
        state.phase == Phase::Active && state.channel.as_deref() == Some(channel)
    }

    /// Runs `f` only while relaying on `channel`, holding the state lock so a
    /// reselection cannot complete until `f` returns.
    pub fn when_active_on<R>(&self, channel: &str, f: impl FnOnce() -> R) -> Option<R> {
        let state = self.lock();
        (state.phase == Phase::Active && state.channel.as_deref() == Some(channel)).then(f)
    }

    pub fn is_active(&self) -> bool {
        self.lock().phase == Phase::Active
    }

    pub fn active_channel(&self) -> Option<String> {
        let state = self.lock();
        match state.phase {
            Phase::Active => state.channel.clone(),
            Phase::Idle | Phase::Selecting => None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    pub fn mark_topology_changed(&self) {
        self.topology_changed.store(true, Ordering::SeqCst);
    }

    /// Returns whether the topology changed since the last call, clearing the flag.
    pub fn take_topology_changed(&self) -> bool {
        self.topology_changed.swap(false, Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Why a shutdown was requested from outside the main loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT or SIGTERM.
    Interrupted,
    /// The manager connection dropped underneath us.
    ConnectionLost,
}

const NOT_TRIGGERED: u8 = 0;
const INTERRUPTED: u8 = 1;
const CONNECTION_LOST: u8 = 2;

/// Cancellation flag set from the signal thread or the relay thread.
///
/// The first trigger wins; later triggers do not change the reason.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    state: AtomicU8,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self, reason: ShutdownReason) {
        let code = match reason {
            ShutdownReason::Interrupted => INTERRUPTED,
            ShutdownReason::ConnectionLost => CONNECTION_LOST,
        };
        let _ = self
            .state
            .compare_exchange(NOT_TRIGGERED, code, Ordering::SeqCst, Ordering::SeqCst);
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        match self.state.load(Ordering::SeqCst) {
            INTERRUPTED => Some(ShutdownReason::Interrupted),
            CONNECTION_LOST => Some(ShutdownReason::ConnectionLost),
            _ => None,
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.state.load(Ordering::SeqCst) != NOT_TRIGGERED
    }
}
