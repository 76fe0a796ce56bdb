//! Transport adapter between the session and its two channels.
//!
//! The session consumes a narrow command surface ([`Transport`]); inbound
//! traffic flows the other way as [`TransportEvent`]s delivered by the
//! transport's poller thread. Tests substitute recording implementations;
//! production uses [`zmq::ZmqTransport`].

pub mod zmq;

use thiserror::Error;

/// Commands the session issues against its sockets.
///
/// `connect` opens both channels; the command channel carries serialized
/// frames, the update channel is subscription-only (its traffic arrives as
/// events). Implementations must make `disconnect` idempotent and must
/// discard pending output on disconnect.
pub trait Transport: Send {
    /// Opens the command and update channels. `identity` names this client
    /// on the command channel so the server can tell reconnects apart.
    ///
    /// # Errors
    ///
    /// Returns an error if the channels cannot be opened.
    fn connect(&mut self, identity: &str) -> Result<(), TransportError>;

    /// Closes both channels, dropping queued output.
    fn disconnect(&mut self);

    /// Sends one frame payload on the command channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame cannot be handed to the channel.
    fn send_command(&mut self, frame: &[u8]) -> Result<(), TransportError>;

    /// Starts receiving update-channel frames published under `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription cannot be issued.
    fn subscribe(&mut self, topic: &[u8]) -> Result<(), TransportError>;

    /// Stops receiving update-channel frames for `topic`.
    ///
    /// # Errors
    ///
    /// Returns an error if the unsubscription cannot be issued.
    fn unsubscribe(&mut self, topic: &[u8]) -> Result<(), TransportError>;
}

/// Inbound traffic and failures, delivered by the transport's poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One frame payload received on the command channel.
    Command(Vec<u8>),
    /// One two-part frame received on the update channel.
    Update { topic: Vec<u8>, payload: Vec<u8> },
    /// The transport failed; the session treats this as fatal.
    Error(String),
}

/// Transport-level failures.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport's worker thread is gone.
    #[error("transport worker is gone")]
    ChannelClosed,
    /// Socket-level failure.
    #[error("socket error: {0}")]
    Socket(String),
}
