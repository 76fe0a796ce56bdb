//! ZeroMQ transport: DEALER command channel + SUB update channel.
//!
//! Both sockets live on one worker thread. The session side hands commands
//! over an op queue; the worker applies them between short polls and pushes
//! inbound frames out through the event callback. Keeping the sockets on a
//! single thread satisfies ZeroMQ's one-thread-per-socket rule without
//! locking.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Transport, TransportError, TransportEvent};

/// Poll interval while connected; bounds op-queue latency.
const POLL_INTERVAL_MS: i64 = 10;

/// Op-queue wait while no sockets are open.
const IDLE_WAIT: Duration = Duration::from_millis(100);

enum SocketOp {
    Connect { identity: String },
    Disconnect,
    SendCommand(Vec<u8>),
    Subscribe(Vec<u8>),
    Unsubscribe(Vec<u8>),
    Shutdown,
}

/// Session-side handle to the socket worker.
pub struct ZmqTransport {
    ops: Sender<SocketOp>,
    worker: Option<JoinHandle<()>>,
}

impl ZmqTransport {
    /// Spawns the socket worker. Sockets are opened lazily on
    /// [`Transport::connect`]; inbound frames and socket failures are
    /// delivered through `on_event`.
    ///
    /// # Errors
    ///
    /// Returns an error if the worker thread cannot be spawned.
    pub fn new(
        command_uri: impl Into<String>,
        update_uri: impl Into<String>,
        on_event: impl Fn(TransportEvent) + Send + 'static,
    ) -> Result<Self, TransportError> {
        let (ops_tx, ops_rx) = mpsc::channel();
        let worker = SocketWorker {
            command_uri: command_uri.into(),
            update_uri: update_uri.into(),
            context: zmq::Context::new(),
            sockets: None,
            ops: ops_rx,
            on_event: Box::new(on_event),
        };
        let handle = thread::Builder::new()
            .name("halremote-zmq".into())
            .spawn(move || worker.run())
            .map_err(|e| TransportError::Socket(e.to_string()))?;
        Ok(Self {
            ops: ops_tx,
            worker: Some(handle),
        })
    }

    fn send_op(&self, op: SocketOp) -> Result<(), TransportError> {
        self.ops.send(op).map_err(|_| TransportError::ChannelClosed)
    }
}

impl Transport for ZmqTransport {
    fn connect(&mut self, identity: &str) -> Result<(), TransportError> {
        self.send_op(SocketOp::Connect {
            identity: identity.to_string(),
        })
    }

    fn disconnect(&mut self) {
        // Best-effort; a dead worker already has no sockets to close.
        let _ = self.send_op(SocketOp::Disconnect);
    }

    fn send_command(&mut self, frame: &[u8]) -> Result<(), TransportError> {
        self.send_op(SocketOp::SendCommand(frame.to_vec()))
    }

    fn subscribe(&mut self, topic: &[u8]) -> Result<(), TransportError> {
        self.send_op(SocketOp::Subscribe(topic.to_vec()))
    }

    fn unsubscribe(&mut self, topic: &[u8]) -> Result<(), TransportError> {
        self.send_op(SocketOp::Unsubscribe(topic.to_vec()))
    }
}

impl Drop for ZmqTransport {
    fn drop(&mut self) {
        let _ = self.ops.send(SocketOp::Shutdown);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

struct Sockets {
    command: zmq::Socket,
    update: zmq::Socket,
}

struct SocketWorker {
    command_uri: String,
    update_uri: String,
    context: zmq::Context,
    sockets: Option<Sockets>,
    ops: Receiver<SocketOp>,
    on_event: Box<dyn Fn(TransportEvent) + Send>,
}

impl SocketWorker {
    fn run(mut self) {
        loop {
            // Apply pending ops first (cold path).
            loop {
                match self.ops.try_recv() {
                    Ok(SocketOp::Shutdown) | Err(TryRecvError::Disconnected) => return,
                    Ok(op) => self.apply(op),
                    Err(TryRecvError::Empty) => break,
                }
            }

            if self.sockets.is_some() {
                if let Err(e) = self.poll_sockets() {
                    warn!(error = %e, "socket poll failed");
                    (self.on_event)(TransportEvent::Error(e.to_string()));
                    self.sockets = None;
                }
            } else {
                // Nothing to poll; park on the op queue instead of spinning.
                match self.ops.recv_timeout(IDLE_WAIT) {
                    Ok(SocketOp::Shutdown) | Err(RecvTimeoutError::Disconnected) => return,
                    Ok(op) => self.apply(op),
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        }
    }

    fn apply(&mut self, op: SocketOp) {
        match op {
            SocketOp::Connect { identity } => {
                if let Err(e) = self.open_sockets(&identity) {
                    warn!(error = %e, "failed to open sockets");
                    self.sockets = None;
                    (self.on_event)(TransportEvent::Error(e.to_string()));
                } else {
                    info!(
                        command_uri = %self.command_uri,
                        update_uri = %self.update_uri,
                        identity = %identity,
                        "sockets connected"
                    );
                }
            }
            SocketOp::Disconnect => {
                // Linger is 0, so dropping discards queued output.
                if self.sockets.take().is_some() {
                    debug!("sockets disconnected");
                }
            }
            SocketOp::SendCommand(frame) => {
                let Some(sockets) = self.sockets.as_ref() else {
                    warn!("dropping command frame, not connected");
                    return;
                };
                if let Err(e) = sockets.command.send(frame.as_slice(), zmq::DONTWAIT) {
                    warn!(error = %e, "command send failed");
                    (self.on_event)(TransportEvent::Error(e.to_string()));
                    self.sockets = None;
                }
            }
            SocketOp::Subscribe(topic) => {
                if let Some(sockets) = self.sockets.as_ref()
                    && let Err(e) = sockets.update.set_subscribe(&topic)
                {
                    (self.on_event)(TransportEvent::Error(e.to_string()));
                }
            }
            SocketOp::Unsubscribe(topic) => {
                if let Some(sockets) = self.sockets.as_ref()
                    && let Err(e) = sockets.update.set_unsubscribe(&topic)
                {
                    (self.on_event)(TransportEvent::Error(e.to_string()));
                }
            }
            SocketOp::Shutdown => unreachable!("handled by the run loop"),
        }
    }

    fn open_sockets(&mut self, identity: &str) -> Result<(), zmq::Error> {
        let command = self.context.socket(zmq::DEALER)?;
        command.set_linger(0)?;
        command.set_identity(identity.as_bytes())?;
        command.connect(&self.command_uri)?;

        let update = self.context.socket(zmq::SUB)?;
        update.set_linger(0)?;
        update.connect(&self.update_uri)?;

        self.sockets = Some(Sockets { command, update });
        Ok(())
    }

    fn poll_sockets(&mut self) -> Result<(), zmq::Error> {
        let Some(sockets) = self.sockets.as_ref() else {
            return Ok(());
        };

        let (command_ready, update_ready) = {
            let mut items = [
                sockets.command.as_poll_item(zmq::POLLIN),
                sockets.update.as_poll_item(zmq::POLLIN),
            ];
            zmq::poll(&mut items, POLL_INTERVAL_MS)?;
            (items[0].is_readable(), items[1].is_readable())
        };

        if command_ready {
            loop {
                match sockets.command.recv_multipart(zmq::DONTWAIT) {
                    Ok(parts) => {
                        let payload = parts.into_iter().next().unwrap_or_default();
                        (self.on_event)(TransportEvent::Command(payload));
                    }
                    Err(zmq::Error::EAGAIN) => break,
                    Err(e) => return Err(e),
                }
            }
        }

        if update_ready {
            loop {
                match sockets.update.recv_multipart(zmq::DONTWAIT) {
                    Ok(parts) => {
                        let mut parts = parts.into_iter();
                        let first = parts.next().unwrap_or_default();
                        let (topic, payload) = match parts.next() {
                            Some(payload) => (first, payload),
                            // Single-part message: no topic frame.
                            None => (Vec::new(), first),
                        };
                        (self.on_event)(TransportEvent::Update { topic, payload });
                    }
                    Err(zmq::Error::EAGAIN) => break,
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(())
    }
}
