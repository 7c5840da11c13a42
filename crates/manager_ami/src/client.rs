use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use manager_api::{
    Action, ActionResponse, ManagerClient, ManagerError, ManagerEvent, ManagerNotice, RESPONSE_KEY,
};
use tracing::{debug, info, warn};

use crate::config::AmiConfig;
use crate::error::AmiError;
use crate::frame::{encode_action, read_block};

const BANNER_MARKER: &str = "Call Manager";

type Reply = Sender<Result<ActionResponse, ManagerError>>;

struct PendingAction {
    events: Vec<ManagerEvent>,
    listing: bool,
    reply: Reply,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<String, PendingAction>>,
    connected: AtomicBool,
    closing: AtomicBool,
}

impl Shared {
    /// Routes one inbound block either to the action waiting on its `ActionID`
    /// or to the notice queue.
    fn route(&self, event: ManagerEvent, notices: &Sender<ManagerNotice>) {
        if let Some(action_id) = event.get("ActionID").map(str::to_owned) {
            let mut pending = lock_unpoisoned(&self.pending);
            if let Some(entry) = pending.get_mut(&action_id) {
                let is_response = event.get(RESPONSE_KEY).is_some();
                let list_marker = event.get("EventList").map(str::to_ascii_lowercase);
                entry.events.push(event);

                let done = match (is_response, list_marker.as_deref()) {
                    (true, Some("start")) => {
                        entry.listing = true;
                        false
                    }
                    (true, _) => !entry.listing,
                    (false, Some("complete")) => entry.listing,
                    (false, _) => false,
                };

                if done {
                    if let Some(entry) = pending.remove(&action_id) {
                        let _ = entry.reply.send(Ok(ActionResponse::new(entry.events)));
                    }
                }
                return;
            }
        }

        let _ = notices.send(ManagerNotice::Event(event));
    }

    fn fail_pending(&self) {
        let mut pending = lock_unpoisoned(&self.pending);
        for (_, entry) in pending.drain() {
            let _ = entry.reply.send(Err(ManagerError::Disconnected));
        }
    }
}

/// AMI connection with a background reader thread.
///
/// Unsolicited events and remote disconnects are delivered on the notice
/// receiver returned by [`AmiClient::connect`].
pub struct AmiClient {
    writer: Mutex<TcpStream>,
    shared: Arc<Shared>,
    next_action_id: AtomicU64,
    reader_thread: Mutex<Option<JoinHandle<()>>>,
}

impl AmiClient {
    /// Opens the TCP connection, validates the greeting and starts the reader.
    pub fn connect(config: &AmiConfig) -> Result<(Self, Receiver<ManagerNotice>), AmiError> {
        let addr = config.address();
        let stream = connect_stream(&addr, config)?;
        let mut reader = BufReader::new(stream.try_clone()?);

        let mut banner = String::new();
        reader.read_line(&mut banner)?;
        let banner = banner.trim_end().to_string();
        if !banner.contains(BANNER_MARKER) {
            return Err(AmiError::Banner { addr, banner });
        }
        info!(%addr, %banner, "connected to manager");

        let shared = Arc::new(Shared::default());
        shared.connected.store(true, Ordering::SeqCst);

        let (notice_tx, notice_rx) = mpsc::channel();
        let reader_thread = spawn_reader(reader, Arc::clone(&shared), notice_tx)?;

        Ok((
            Self {
                writer: Mutex::new(stream),
                shared,
                next_action_id: AtomicU64::new(1),
                reader_thread: Mutex::new(Some(reader_thread)),
            },
            notice_rx,
        ))
    }

    /// Logs in with events enabled.
    pub fn login(&self, username: &str, password: &str) -> Result<(), AmiError> {
        let action = Action::new("Login")
            .field("Username", username)
            .field("Secret", password)
            .field("Events", "on");
        let response = self.send_action(&action)?;
        if !response.is_success() {
            return Err(AmiError::LoginRejected {
                username: username.to_string(),
                message: response.message().unwrap_or("no reason given").to_string(),
            });
        }
        info!(username, "manager login accepted");
        Ok(())
    }

    fn write_frame(&self, frame: &str) -> std::io::Result<()> {
        let mut writer = lock_unpoisoned(&self.writer);
        writer.write_all(frame.as_bytes())?;
        writer.flush()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }
}

impl ManagerClient for AmiClient {
    fn send_action(&self, action: &Action) -> Result<ActionResponse, ManagerError> {
        if !self.is_connected() {
            return Err(ManagerError::Disconnected);
        }

        let action_id = self.next_action_id.fetch_add(1, Ordering::SeqCst).to_string();
        let (reply_tx, reply_rx) = mpsc::channel();
        lock_unpoisoned(&self.shared.pending).insert(
            action_id.clone(),
            PendingAction {
                events: Vec::new(),
                listing: false,
                reply: reply_tx,
            },
        );
        // The reader may have drained the pending map between the check above and the insert.
        if !self.is_connected() {
            lock_unpoisoned(&self.shared.pending).remove(&action_id);
            return Err(ManagerError::Disconnected);
        }

        debug!(action = action.name(), %action_id, "sending manager action");
        let frame = encode_action(action, &action_id);
        if let Err(err) = self.write_frame(&frame) {
            lock_unpoisoned(&self.shared.pending).remove(&action_id);
            return Err(ManagerError::from(err));
        }

        reply_rx.recv().unwrap_or(Err(ManagerError::Disconnected))
    }

    fn disconnect(&self) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        {
            let mut writer = lock_unpoisoned(&self.writer);
            if self.is_connected() {
                let logoff = encode_action(&Action::new("Logoff"), "logoff");
                let _ = writer.write_all(logoff.as_bytes());
            }
            let _ = writer.shutdown(Shutdown::Both);
        }

        if let Some(handle) = lock_unpoisoned(&self.reader_thread).take() {
            let _ = handle.join();
        }
        info!("manager connection closed");
    }
}

impl Drop for AmiClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn connect_stream(addr: &str, config: &AmiConfig) -> Result<TcpStream, AmiError> {
    let candidates = addr
        .to_socket_addrs()
        .map_err(|source| AmiError::connect(addr, source))?;

    let mut last_error = None;
    for candidate in candidates {
        match TcpStream::connect_timeout(&candidate, config.connect_timeout) {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Ok(stream);
            }
            Err(err) => last_error = Some(err),
        }
    }

    Err(AmiError::connect(
        addr,
        last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "address did not resolve")
        }),
    ))
}

fn spawn_reader(
    mut reader: BufReader<TcpStream>,
    shared: Arc<Shared>,
    notices: Sender<ManagerNotice>,
) -> Result<JoinHandle<()>, AmiError> {
    let handle = thread::Builder::new()
        .name("ami-reader".to_string())
        .spawn(move || {
            let reason = loop {
                match read_block(&mut reader) {
                    Ok(Some(fields)) => shared.route(ManagerEvent::new(fields), &notices),
                    Ok(None) => break "connection closed by manager".to_string(),
                    Err(err) => break err.to_string(),
                }
            };

            shared.connected.store(false, Ordering::SeqCst);
            shared.fail_pending();

            if shared.closing.load(Ordering::SeqCst) {
                debug!("manager reader stopped after local disconnect");
            } else {
                warn!(%reason, "manager connection lost");
                let _ = notices.send(ManagerNotice::Disconnected { reason });
            }
        })?;
    Ok(handle)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
