//! Host-facing handle for one remote component.
//!
//! [`HalRemoteComponent`] is configured once, then driven by the `ready`
//! flag: a rising edge spawns the session worker, a falling edge tears it
//! down. The worker owns the [`Session`] and runs its event loop; the host
//! observes connection state through the shared status snapshot and pin
//! values through the pins it supplied.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::warn;

use crate::pin::HalPin;
use crate::session::state::{ConnectionState, ErrorKind, Status};
use crate::session::{Session, SessionEvent};
use crate::transport::zmq::ZmqTransport;
use crate::transport::{Transport, TransportEvent};

/// Worker wait bound when no heartbeat is armed.
const IDLE_WAIT: Duration = Duration::from_millis(100);

/// Remote component configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Command-channel endpoint (request/reply style).
    pub command_uri: String,
    /// Update-channel endpoint (publish/subscribe).
    pub update_uri: String,
    /// Component name; the subscription topic and the pin name prefix.
    pub name: String,
    /// Command-channel ping period in milliseconds; 0 disables it.
    pub heartbeat_period_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            command_uri: String::new(),
            update_uri: String::new(),
            name: "default".into(),
            heartbeat_period_ms: 3000,
        }
    }
}

/// Rejected configurations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("command uri is not set")]
    MissingCommandUri,
    #[error("update uri is not set")]
    MissingUpdateUri,
    #[error("component name is empty")]
    EmptyName,
}

impl Config {
    /// Checks that the configuration can be started.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_uri.is_empty() {
            return Err(ConfigError::MissingCommandUri);
        }
        if self.update_uri.is_empty() {
            return Err(ConfigError::MissingUpdateUri);
        }
        if self.name.is_empty() {
            return Err(ConfigError::EmptyName);
        }
        Ok(())
    }
}

struct Worker {
    events: Sender<SessionEvent>,
    handle: JoinHandle<()>,
}

/// One remote component: a set of pins bound to a remote service.
pub struct HalRemoteComponent {
    config: Config,
    pins: Vec<Arc<HalPin>>,
    status: Arc<Mutex<Status>>,
    worker: Option<Worker>,
}

impl HalRemoteComponent {
    /// Creates an inert component. Pins with an empty name or
    /// `enabled == false` are accepted here but never registered.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] for unusable configurations.
    pub fn new(config: Config, pins: Vec<Arc<HalPin>>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            pins,
            status: Arc::new(Mutex::new(Status::default())),
            worker: None,
        })
    }

    /// Sets the ready flag. A rising edge starts the session; a falling
    /// edge tears it down. Repeated writes of the same value are no-ops.
    pub fn set_ready(&mut self, ready: bool) {
        if ready {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Whether the session worker is running.
    #[must_use]
    pub fn ready(&self) -> bool {
        self.worker.is_some()
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.status.lock().state
    }

    /// Active error classification.
    #[must_use]
    pub fn error(&self) -> ErrorKind {
        self.status.lock().error
    }

    /// Human-readable description of the active error.
    #[must_use]
    pub fn error_string(&self) -> String {
        self.status.lock().error_string.clone()
    }

    /// Full status snapshot.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status.lock().clone()
    }

    /// The pins supplied at construction.
    #[must_use]
    pub fn pins(&self) -> &[Arc<HalPin>] {
        &self.pins
    }

    fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }

        let (events_tx, events_rx) = mpsc::channel();
        let transport_tx = events_tx.clone();
        let transport = match ZmqTransport::new(
            &self.config.command_uri,
            &self.config.update_uri,
            move |event| {
                let event = match event {
                    TransportEvent::Command(payload) => SessionEvent::CommandFrame(payload),
                    TransportEvent::Update { topic, payload } => {
                        SessionEvent::UpdateFrame { topic, payload }
                    }
                    TransportEvent::Error(message) => SessionEvent::SocketError(message),
                };
                let _ = transport_tx.send(event);
            },
        ) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(name = %self.config.name, error = %e, "failed to start transport");
                *self.status.lock() = Status {
                    state: ConnectionState::Error,
                    error: ErrorKind::Socket,
                    error_string: e.to_string(),
                };
                return;
            }
        };

        let session = Session::new(
            &self.config.name,
            Duration::from_millis(self.config.heartbeat_period_ms),
            self.pins.clone(),
            transport,
            events_tx.clone(),
            Arc::clone(&self.status),
        );

        let spawned = thread::Builder::new()
            .name(format!("halremote-{}", self.config.name))
            .spawn(move || run_session(session, events_rx));
        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker {
                    events: events_tx,
                    handle,
                });
            }
            Err(e) => {
                warn!(name = %self.config.name, error = %e, "failed to spawn session worker");
                *self.status.lock() = Status {
                    state: ConnectionState::Error,
                    error: ErrorKind::Socket,
                    error_string: e.to_string(),
                };
            }
        }
    }

    fn stop(&mut self) {
        let Some(worker) = self.worker.take() else {
            return;
        };
        let _ = worker.events.send(SessionEvent::Stop);
        if worker.handle.join().is_err() {
            warn!(name = %self.config.name, "session worker panicked");
        }
    }
}

impl Drop for HalRemoteComponent {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Session worker loop: fire due heartbeats, then wait for the next event
/// no longer than the nearest deadline.
fn run_session<T: Transport>(mut session: Session<T>, events: Receiver<SessionEvent>) {
    session.start(Instant::now());

    loop {
        let now = Instant::now();
        session.poll_timers(now);

        let wait = session
            .next_deadline()
            .map_or(IDLE_WAIT, |deadline| deadline.saturating_duration_since(now));

        match events.recv_timeout(wait) {
            Ok(SessionEvent::Stop) => break,
            Ok(event) => session.dispatch(event, Instant::now()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    session.dispatch(SessionEvent::Stop, Instant::now());
}
