//! Session state vocabulary and the host-visible status snapshot.

/// User-visible connection lifecycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started, or torn down.
    #[default]
    Disconnected,
    /// Sockets open, bind in flight.
    Connecting,
    /// Bind confirmed and first update received; pin changes flow.
    Connected,
    /// A latched error; see [`ErrorKind`].
    Error,
}

/// Liveness of one channel, tracked independently per channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ChannelState {
    #[default]
    Down,
    Trying,
    Up,
}

/// Classification of the active error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorKind {
    /// No active error.
    #[default]
    None,
    /// The server rejected the bind.
    Bind,
    /// The server rejected a pin change.
    PinChange,
    /// Server-side protocol error reported on the update channel.
    Command,
    /// A heartbeat declared its channel dead.
    Timeout,
    /// Local transport failure; fatal until restarted.
    Socket,
}

/// Snapshot of the session's observable state, shared with the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    pub state: ConnectionState,
    pub error: ErrorKind,
    pub error_string: String,
}
