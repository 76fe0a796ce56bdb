//! Remote component session: lifecycle, protocol engine, and liveness.
//!
//! A session binds one local component (its registered pins) to the remote
//! service over two channels: a command channel (bind, pin sets, pings) and
//! a subscription channel (full and incremental value updates). All state
//! lives on one thread; sockets and timers feed it [`SessionEvent`]s through
//! the single [`Session::dispatch`] entry point.
//!
//! Liveness is tracked per channel. The command channel is request/reply, so
//! it is probed with pings and declared dead when an acknowledgement is
//! missing at the next tick. The subscription channel has no replies; it is
//! declared dead by silence alone, with every inbound frame deferring the
//! deadline. A command-channel timeout is the only error the session
//! recovers from on its own: a late acknowledgement re-enters the connected
//! state and re-subscribes to force a fresh snapshot.

pub mod heartbeat;
pub mod state;

use std::sync::Arc;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::pin::registry::PinRegistry;
use crate::pin::{HalPin, ValueSource};
use crate::protocol::{self, Container, MessageType};
use crate::transport::Transport;
use heartbeat::Heartbeat;
use state::{ChannelState, ConnectionState, ErrorKind, Status};

/// Everything the session reacts to: inbound frames, timer ticks, and host
/// commands.
#[derive(Debug)]
pub enum SessionEvent {
    /// One frame payload received on the command channel.
    CommandFrame(Vec<u8>),
    /// One frame received on the update channel.
    UpdateFrame { topic: Vec<u8>, payload: Vec<u8> },
    /// The command heartbeat fired.
    CommandTick,
    /// The subscribe heartbeat fired.
    SubscribeTick,
    /// A registered pin was written locally.
    LocalPinChange(String),
    /// The transport failed; fatal for the session.
    SocketError(String),
    /// Tear the session down.
    Stop,
}

/// Client-side session for one remote component.
pub struct Session<T: Transport> {
    name: String,
    heartbeat_period: Duration,
    transport: T,
    pin_source: Vec<Arc<HalPin>>,
    registry: PinRegistry,
    events: Sender<SessionEvent>,
    status: Arc<Mutex<Status>>,

    connection_state: ConnectionState,
    command_state: ChannelState,
    subscribe_state: ChannelState,
    error: ErrorKind,
    error_string: String,
    command_heartbeat: Heartbeat,
    subscribe_heartbeat: Heartbeat,
    command_ping_outstanding: bool,
    running: bool,
}

impl<T: Transport> Session<T> {
    /// Creates an inert session. Nothing happens until [`Session::start`].
    ///
    /// `events` must be the sending side of the queue whose receiving side
    /// feeds [`Session::dispatch`]; pin watchers push
    /// [`SessionEvent::LocalPinChange`] into it. `heartbeat_period` is the
    /// command-channel ping interval; zero disables it.
    pub fn new(
        name: impl Into<String>,
        heartbeat_period: Duration,
        pin_source: Vec<Arc<HalPin>>,
        transport: T,
        events: Sender<SessionEvent>,
        status: Arc<Mutex<Status>>,
    ) -> Self {
        let session = Self {
            name: name.into(),
            heartbeat_period,
            transport,
            pin_source,
            registry: PinRegistry::new(),
            events,
            status,
            connection_state: ConnectionState::Disconnected,
            command_state: ChannelState::Down,
            subscribe_state: ChannelState::Down,
            error: ErrorKind::None,
            error_string: String::new(),
            command_heartbeat: Heartbeat::new(),
            subscribe_heartbeat: Heartbeat::new(),
            command_ping_outstanding: false,
            running: false,
        };
        session.push_status();
        session
    }

    /// Opens the channels, registers the pins, and emits the bind frame.
    pub fn start(&mut self, now: Instant) {
        if self.running {
            return;
        }
        self.running = true;
        info!(name = %self.name, "starting session");

        self.command_state = ChannelState::Trying;
        self.update_state(ConnectionState::Connecting, now);

        let identity = format!("{}-{}", self.name, std::process::id());
        if let Err(e) = self.transport.connect(&identity) {
            self.socket_error(e.to_string(), now);
            return;
        }

        self.add_pins();
        let frame = self.bind_frame();
        debug!(name = %self.name, pins = self.registry.len(), "binding component");
        self.send_frame(&frame, now);
    }

    /// Full teardown: stops heartbeats, closes channels, drops pin
    /// registrations, and clears any error. Idempotent; emits nothing.
    pub fn stop(&mut self, now: Instant) {
        if !self.running {
            return;
        }
        self.running = false;
        info!(name = %self.name, "stopping session");

        self.command_heartbeat.stop();
        self.subscribe_heartbeat.stop();
        self.command_state = ChannelState::Down;
        self.subscribe_state = ChannelState::Down;
        self.transport.disconnect();
        // Unsync before the registry drops its pin references.
        self.registry.mark_all_unsynced();
        self.registry.clear();
        self.update_state(ConnectionState::Disconnected, now);
        self.update_error(ErrorKind::None, "");
    }

    /// Routes one event. Events arriving on a stopped session are dropped,
    /// so a torn-down session never changes state or emits frames.
    pub fn dispatch(&mut self, event: SessionEvent, now: Instant) {
        if !self.running {
            return;
        }
        match event {
            SessionEvent::CommandFrame(payload) => self.handle_command_frame(&payload, now),
            SessionEvent::UpdateFrame { topic: _, payload } => {
                self.handle_update_frame(&payload, now);
            }
            SessionEvent::CommandTick => self.handle_command_tick(now),
            SessionEvent::SubscribeTick => self.handle_subscribe_tick(now),
            SessionEvent::LocalPinChange(pin) => self.handle_local_pin_change(&pin, now),
            SessionEvent::SocketError(message) => self.socket_error(message, now),
            SessionEvent::Stop => self.stop(now),
        }
    }

    /// Fires any due heartbeat. The worker calls this before blocking on
    /// the event queue.
    pub fn poll_timers(&mut self, now: Instant) {
        if self.command_heartbeat.poll(now) {
            self.handle_command_tick(now);
        }
        if self.subscribe_heartbeat.poll(now) {
            self.handle_subscribe_tick(now);
        }
    }

    /// Nearest heartbeat deadline; the worker's wait bound.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (
            self.command_heartbeat.deadline(),
            self.subscribe_heartbeat.deadline(),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection_state
    }

    #[must_use]
    pub fn command_channel_state(&self) -> ChannelState {
        self.command_state
    }

    #[must_use]
    pub fn subscribe_channel_state(&self) -> ChannelState {
        self.subscribe_state
    }

    #[must_use]
    pub fn error(&self) -> ErrorKind {
        self.error
    }

    #[must_use]
    pub fn error_string(&self) -> &str {
        &self.error_string
    }

    // ---- inbound: command channel ----

    fn handle_command_frame(&mut self, payload: &[u8], now: Instant) {
        let container = match protocol::decode(payload) {
            Ok(c) => c,
            Err(e) => {
                warn!(name = %self.name, error = %e, "undecodable command-channel frame");
                return;
            }
        };

        match container.message_type() {
            Some(MessageType::PingAcknowledge) => {
                self.command_state = ChannelState::Up;
                self.command_ping_outstanding = false;
                if self.connection_state == ConnectionState::Error
                    && self.error == ErrorKind::Timeout
                {
                    info!(name = %self.name, "command channel recovered from timeout");
                    self.update_error(ErrorKind::None, "");
                    self.update_state(ConnectionState::Connected, now);
                    // Re-subscribing forces a fresh full update.
                    self.subscribe(now);
                }
            }
            Some(MessageType::HalrcompBindConfirm) => {
                info!(name = %self.name, "bind confirmed");
                self.command_state = ChannelState::Up;
                if self.subscribe_state == ChannelState::Up {
                    // The snapshot won the race; both channels are up now.
                    self.update_error(ErrorKind::None, "");
                    self.update_state(ConnectionState::Connected, now);
                }
                self.subscribe(now);
            }
            Some(MessageType::HalrcompBindReject) => {
                self.command_state = ChannelState::Down;
                self.update_error(ErrorKind::Bind, join_notes(&container.note));
                self.update_state(ConnectionState::Error, now);
            }
            Some(MessageType::HalrcompSetReject) => {
                self.command_state = ChannelState::Down;
                self.update_error(ErrorKind::PinChange, join_notes(&container.note));
                self.update_state(ConnectionState::Error, now);
            }
            other => {
                debug!(name = %self.name, r#type = ?other, "unhandled command-channel message");
            }
        }
    }

    // ---- inbound: update channel ----

    fn handle_update_frame(&mut self, payload: &[u8], now: Instant) {
        let container = match protocol::decode(payload) {
            Ok(c) => c,
            Err(e) => {
                warn!(name = %self.name, error = %e, "undecodable update-channel frame");
                return;
            }
        };

        match container.message_type() {
            Some(MessageType::HalrcompFullUpdate) => self.apply_full_update(&container, now),
            Some(MessageType::HalrcompIncrementalUpdate) => {
                self.apply_incremental_update(&container, now);
            }
            Some(MessageType::Ping) => self.subscribe_heartbeat.refresh(now),
            Some(MessageType::HalrcommandError) => {
                self.subscribe_state = ChannelState::Down;
                self.update_error(ErrorKind::Command, join_notes(&container.note));
                self.update_state(ConnectionState::Error, now);
            }
            other => {
                debug!(name = %self.name, r#type = ?other, "unhandled update-channel message");
            }
        }
    }

    fn apply_full_update(&mut self, container: &Container, now: Instant) {
        debug!(name = %self.name, "full update");
        for comp in &container.comp {
            for remote in &comp.pin {
                let Some(remote_name) = remote.name.as_deref() else {
                    warn!(name = %self.name, "unnamed pin in full update, ignoring");
                    continue;
                };
                // Remote names are qualified "<component>.<pin>".
                let local_name = remote_name
                    .split_once('.')
                    .map_or(remote_name, |(_, rest)| rest);
                let Some(pin) = self.registry.lookup_by_name(local_name) else {
                    warn!(name = %self.name, pin = %remote_name, "full update for unknown pin, ignoring");
                    continue;
                };
                let Some(handle) = remote.handle else {
                    warn!(name = %self.name, pin = %remote_name, "full update without a handle, ignoring");
                    continue;
                };
                self.registry.bind_handle(local_name, handle);
                if let Err(message) = apply_pin_update(remote, &pin) {
                    self.update_error(ErrorKind::Command, message);
                    self.update_state(ConnectionState::Error, now);
                    return;
                }
            }
            if self.subscribe_state != ChannelState::Up {
                self.subscribe_state = ChannelState::Up;
                self.connect_when_both_up(now);
            }
        }

        if let Some(pparams) = &container.pparams {
            self.start_subscribe_heartbeat(pparams.keepalive_timer.unwrap_or(0), now);
        }
    }

    fn apply_incremental_update(&mut self, container: &Container, now: Instant) {
        for remote in &container.pin {
            let Some(handle) = remote.handle else {
                warn!(name = %self.name, "incremental update without a handle, ignoring");
                continue;
            };
            let Some(pin) = self.registry.lookup_by_handle(handle) else {
                warn!(name = %self.name, handle, "incremental update for unknown handle, ignoring");
                continue;
            };
            if let Err(message) = apply_pin_update(remote, &pin) {
                self.update_error(ErrorKind::Command, message);
                self.update_state(ConnectionState::Error, now);
                return;
            }
        }

        if self.subscribe_state != ChannelState::Up {
            self.subscribe_state = ChannelState::Up;
            self.connect_when_both_up(now);
        }

        self.subscribe_heartbeat.refresh(now);
    }

    // ---- heartbeat ticks ----

    fn handle_command_tick(&mut self, now: Instant) {
        if self.command_ping_outstanding {
            warn!(name = %self.name, "command service timed out");
            self.command_state = ChannelState::Trying;
            self.unsubscribe(now);
            self.update_error(ErrorKind::Timeout, "command service timed out");
            self.update_state(ConnectionState::Error, now);
        }
        self.send_ping(now);
        self.command_ping_outstanding = true;
    }

    fn handle_subscribe_tick(&mut self, now: Instant) {
        // Publish/subscribe has no replies: silence for one keepalive
        // period is the timeout, no outstanding-probe bookkeeping.
        warn!(name = %self.name, "update service timed out");
        self.command_state = ChannelState::Trying;
        self.unsubscribe(now);
        self.update_error(ErrorKind::Timeout, "update service timed out");
        self.update_state(ConnectionState::Error, now);
        // Recovery probe; a late acknowledgement re-enters Connected.
        self.send_ping(now);
    }

    // ---- outbound ----

    fn handle_local_pin_change(&mut self, pin_name: &str, now: Instant) {
        if self.connection_state != ConnectionState::Connected {
            return;
        }
        let Some(pin) = self.registry.lookup_by_name(pin_name) else {
            debug!(name = %self.name, pin = %pin_name, "change on unregistered pin, ignoring");
            return;
        };
        if !pin.direction().is_output() {
            return;
        }
        let Some(handle) = pin.handle() else {
            warn!(name = %self.name, pin = %pin_name, "output pin changed before a handle was assigned");
            return;
        };

        debug!(name = %self.name, pin = %pin_name, value = ?pin.value(), "forwarding pin change");
        let frame = self.set_frame(&pin, handle);
        self.send_frame(&frame, now);
    }

    fn set_frame(&self, pin: &Arc<HalPin>, handle: u32) -> Container {
        let mut container = Container::of_type(MessageType::HalrcompSet);
        let mut entry = protocol::Pin {
            handle: Some(handle),
            name: Some(self.remote_name(pin.name())),
            r#type: Some(protocol::ValueType::from(pin.pin_type()) as i32),
            ..protocol::Pin::default()
        };
        entry.set_value(pin.value());
        container.pin.push(entry);
        container
    }

    fn bind_frame(&self) -> Container {
        let mut container = Container::of_type(MessageType::HalrcompBind);
        let mut comp = protocol::Component {
            name: Some(self.name.clone()),
            pin: Vec::new(),
        };
        for pin in self.registry.iter_pins() {
            let mut entry = protocol::Pin {
                name: Some(self.remote_name(pin.name())),
                r#type: Some(protocol::ValueType::from(pin.pin_type()) as i32),
                dir: Some(protocol::HalPinDirection::from(pin.direction()) as i32),
                ..protocol::Pin::default()
            };
            entry.set_value(pin.value());
            comp.pin.push(entry);
        }
        container.comp.push(comp);
        container
    }

    fn send_ping(&mut self, now: Instant) {
        let frame = Container::of_type(MessageType::Ping);
        self.send_frame(&frame, now);
    }

    fn send_frame(&mut self, frame: &Container, now: Instant) {
        let payload = protocol::encode(frame);
        if let Err(e) = self.transport.send_command(&payload) {
            self.socket_error(e.to_string(), now);
        }
    }

    // ---- plumbing ----

    fn add_pins(&mut self) {
        for pin in &self.pin_source {
            let events = self.events.clone();
            self.registry.add(pin, move |name, source| {
                // Remote-origin writes must not loop back into the encoder.
                if source == ValueSource::Local {
                    let _ = events.send(SessionEvent::LocalPinChange(name.to_string()));
                }
            });
        }
    }

    fn subscribe(&mut self, now: Instant) {
        self.subscribe_state = ChannelState::Trying;
        let topic = self.name.clone();
        if let Err(e) = self.transport.subscribe(topic.as_bytes()) {
            self.socket_error(e.to_string(), now);
        }
    }

    fn unsubscribe(&mut self, now: Instant) {
        self.subscribe_state = ChannelState::Down;
        let topic = self.name.clone();
        if let Err(e) = self.transport.unsubscribe(topic.as_bytes()) {
            self.socket_error(e.to_string(), now);
        }
    }

    /// Enters the connected state once the bind is confirmed and the first
    /// update has arrived, whichever came last.
    fn connect_when_both_up(&mut self, now: Instant) {
        if self.command_state == ChannelState::Up {
            self.update_error(ErrorKind::None, "");
            self.update_state(ConnectionState::Connected, now);
        }
    }

    fn start_subscribe_heartbeat(&mut self, interval_ms: u32, now: Instant) {
        self.subscribe_heartbeat
            .set_period((interval_ms > 0).then(|| Duration::from_millis(interval_ms.into())));
        self.subscribe_heartbeat.start(now);
    }

    fn socket_error(&mut self, message: String, now: Instant) {
        self.update_error(ErrorKind::Socket, message);
        self.update_state(ConnectionState::Error, now);
    }

    fn update_state(&mut self, state: ConnectionState, now: Instant) {
        if state == self.connection_state {
            return;
        }
        if self.connection_state == ConnectionState::Connected {
            // Leaving Connected: values are stale until the next snapshot.
            self.registry.mark_all_unsynced();
        }
        debug!(
            name = %self.name,
            from = ?self.connection_state,
            to = ?state,
            "connection state changed"
        );
        self.connection_state = state;

        if state == ConnectionState::Connected {
            self.command_ping_outstanding = false;
            self.command_heartbeat
                .set_period((!self.heartbeat_period.is_zero()).then_some(self.heartbeat_period));
            self.command_heartbeat.start(now);
        } else {
            self.command_heartbeat.stop();
            self.subscribe_heartbeat.stop();
        }
        self.push_status();
    }

    fn update_error(&mut self, error: ErrorKind, message: impl Into<String>) {
        self.error = error;
        self.error_string = message.into();
        if self.error != ErrorKind::None {
            warn!(name = %self.name, error = ?self.error, message = %self.error_string, "session error");
        }
        self.push_status();
    }

    fn push_status(&self) {
        *self.status.lock() = Status {
            state: self.connection_state,
            error: self.error,
            error_string: self.error_string.clone(),
        };
    }

    fn remote_name(&self, local: &str) -> String {
        format!("{}.{}", self.name, local)
    }
}

fn apply_pin_update(remote: &protocol::Pin, pin: &Arc<HalPin>) -> Result<(), String> {
    let Some(value) = remote.value() else {
        warn!(pin = %pin.name(), "pin update carries no value, ignoring");
        return Ok(());
    };
    pin.update_from_remote(value)
        .map_err(|e| format!("update value type mismatch: {e}"))
}

fn join_notes(notes: &[String]) -> String {
    notes.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc::{self, Receiver};

    use crate::pin::{PinDirection, PinType, PinValue};
    use crate::protocol::{HalPinDirection, ValueType};
    use crate::transport::TransportError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Connect(String),
        Disconnect,
        Send(Vec<u8>),
        Subscribe(Vec<u8>),
        Unsubscribe(Vec<u8>),
    }

    #[derive(Default)]
    struct RecordingTransport {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_sends: Arc<Mutex<bool>>,
    }

    impl Transport for RecordingTransport {
        fn connect(&mut self, identity: &str) -> Result<(), TransportError> {
            self.calls.lock().push(Call::Connect(identity.to_string()));
            Ok(())
        }

        fn disconnect(&mut self) {
            self.calls.lock().push(Call::Disconnect);
        }

        fn send_command(&mut self, frame: &[u8]) -> Result<(), TransportError> {
            if *self.fail_sends.lock() {
                return Err(TransportError::Socket("send refused".into()));
            }
            self.calls.lock().push(Call::Send(frame.to_vec()));
            Ok(())
        }

        fn subscribe(&mut self, topic: &[u8]) -> Result<(), TransportError> {
            self.calls.lock().push(Call::Subscribe(topic.to_vec()));
            Ok(())
        }

        fn unsubscribe(&mut self, topic: &[u8]) -> Result<(), TransportError> {
            self.calls.lock().push(Call::Unsubscribe(topic.to_vec()));
            Ok(())
        }
    }

    struct Harness {
        session: Session<RecordingTransport>,
        calls: Arc<Mutex<Vec<Call>>>,
        fail_sends: Arc<Mutex<bool>>,
        events: Receiver<SessionEvent>,
        out1: Arc<HalPin>,
        in1: Arc<HalPin>,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let out1 = Arc::new(HalPin::new("out1", PinType::Float, PinDirection::Out));
            let in1 = Arc::new(HalPin::new("in1", PinType::Bit, PinDirection::In));
            let calls = Arc::new(Mutex::new(Vec::new()));
            let fail_sends = Arc::new(Mutex::new(false));
            let transport = RecordingTransport {
                calls: Arc::clone(&calls),
                fail_sends: Arc::clone(&fail_sends),
            };
            let (tx, rx) = mpsc::channel();
            let session = Session::new(
                "c",
                Duration::from_millis(1000),
                vec![Arc::clone(&out1), Arc::clone(&in1)],
                transport,
                tx,
                Arc::new(Mutex::new(Status::default())),
            );
            Self {
                session,
                calls,
                fail_sends,
                events: rx,
                out1,
                in1,
                now: Instant::now(),
            }
        }

        /// Feeds queued pin-change events into the session.
        fn pump(&mut self) {
            while let Ok(event) = self.events.try_recv() {
                self.session.dispatch(event, self.now);
            }
        }

        fn sent_frames(&self) -> Vec<Container> {
            self.calls
                .lock()
                .iter()
                .filter_map(|call| match call {
                    Call::Send(payload) => Some(protocol::decode(payload).unwrap()),
                    _ => None,
                })
                .collect()
        }

        fn dispatch_command(&mut self, frame: &Container) {
            self.session
                .dispatch(SessionEvent::CommandFrame(protocol::encode(frame)), self.now);
        }

        fn dispatch_update(&mut self, frame: &Container) {
            self.session.dispatch(
                SessionEvent::UpdateFrame {
                    topic: b"c".to_vec(),
                    payload: protocol::encode(frame),
                },
                self.now,
            );
        }

        /// Runs the session through bind, confirm, and the first full
        /// update (handles 7/8, values 1.5/true, keepalive 500 ms).
        fn connect(&mut self) {
            self.session.start(self.now);
            self.dispatch_command(&Container::of_type(MessageType::HalrcompBindConfirm));
            self.dispatch_update(&full_update());
            assert_eq!(self.session.connection_state(), ConnectionState::Connected);
        }
    }

    fn remote_pin(name: &str, handle: u32, value: PinValue) -> protocol::Pin {
        let mut pin = protocol::Pin {
            name: Some(name.to_string()),
            handle: Some(handle),
            ..protocol::Pin::default()
        };
        pin.set_value(value);
        pin
    }

    fn full_update() -> Container {
        let mut frame = Container::of_type(MessageType::HalrcompFullUpdate);
        frame.comp.push(protocol::Component {
            name: Some("c".into()),
            pin: vec![
                remote_pin("c.out1", 7, PinValue::Float(1.5)),
                remote_pin("c.in1", 8, PinValue::Bit(true)),
            ],
        });
        frame.pparams = Some(protocol::ProtocolParameters {
            keepalive_timer: Some(500),
        });
        frame
    }

    fn incremental_update(handle: u32, value: PinValue) -> Container {
        let mut frame = Container::of_type(MessageType::HalrcompIncrementalUpdate);
        let mut pin = protocol::Pin {
            handle: Some(handle),
            ..protocol::Pin::default()
        };
        pin.set_value(value);
        frame.pin.push(pin);
        frame
    }

    fn reject(ty: MessageType, notes: &[&str]) -> Container {
        let mut frame = Container::of_type(ty);
        frame.note = notes.iter().map(|s| s.to_string()).collect();
        frame
    }

    #[test]
    fn happy_path_binds_subscribes_and_connects() {
        let mut h = Harness::new();
        h.session.start(h.now);

        // Sockets opened with a pid-qualified identity, then one bind frame.
        {
            let calls = h.calls.lock();
            let Call::Connect(identity) = &calls[0] else {
                panic!("expected connect, got {calls:?}");
            };
            assert!(identity.starts_with("c-"));
        }
        let frames = h.sent_frames();
        assert_eq!(frames.len(), 1);
        let bind = &frames[0];
        assert_eq!(bind.message_type(), Some(MessageType::HalrcompBind));
        let comp = &bind.comp[0];
        assert_eq!(comp.name.as_deref(), Some("c"));
        assert_eq!(comp.pin.len(), 2);
        assert_eq!(comp.pin[0].name.as_deref(), Some("c.out1"));
        assert_eq!(comp.pin[0].r#type, Some(ValueType::Float as i32));
        assert_eq!(comp.pin[0].dir, Some(HalPinDirection::Out as i32));
        assert_eq!(comp.pin[0].value(), Some(PinValue::Float(0.0)));
        assert_eq!(comp.pin[1].name.as_deref(), Some("c.in1"));
        assert_eq!(comp.pin[1].r#type, Some(ValueType::Bit as i32));
        assert_eq!(comp.pin[1].dir, Some(HalPinDirection::In as i32));
        assert_eq!(comp.pin[1].value(), Some(PinValue::Bit(false)));
        assert_eq!(h.session.connection_state(), ConnectionState::Connecting);
        assert_eq!(h.session.command_channel_state(), ChannelState::Trying);

        // Bind confirm triggers the subscription on the component topic.
        h.dispatch_command(&Container::of_type(MessageType::HalrcompBindConfirm));
        assert_eq!(h.session.command_channel_state(), ChannelState::Up);
        assert!(h.calls.lock().contains(&Call::Subscribe(b"c".to_vec())));
        assert_eq!(h.session.subscribe_channel_state(), ChannelState::Trying);

        // Full update assigns handles, applies values, and connects.
        h.dispatch_update(&full_update());
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
        assert_eq!(h.session.subscribe_channel_state(), ChannelState::Up);
        assert_eq!(h.session.error(), ErrorKind::None);
        assert_eq!(h.out1.value(), PinValue::Float(1.5));
        assert_eq!(h.in1.value(), PinValue::Bit(true));
        assert!(h.out1.synced());
        assert!(h.in1.synced());
        assert_eq!(h.out1.handle(), Some(7));
        assert_eq!(h.in1.handle(), Some(8));

        // Both heartbeats armed: command at the configured period, the
        // subscribe side at the server-nominated keepalive.
        assert_eq!(
            h.session.command_heartbeat.deadline(),
            Some(h.now + Duration::from_millis(1000))
        );
        assert_eq!(
            h.session.subscribe_heartbeat.deadline(),
            Some(h.now + Duration::from_millis(500))
        );
    }

    #[test]
    fn full_update_before_bind_confirm_connects_on_confirm() {
        let mut h = Harness::new();
        h.session.start(h.now);

        // Channels are independent; the snapshot may win the race. Values
        // apply immediately, but Connected needs the bind confirmed too.
        h.dispatch_update(&full_update());
        assert_eq!(h.session.subscribe_channel_state(), ChannelState::Up);
        assert_eq!(h.session.connection_state(), ConnectionState::Connecting);
        assert_eq!(h.out1.value(), PinValue::Float(1.5));

        h.dispatch_command(&Container::of_type(MessageType::HalrcompBindConfirm));
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn local_output_change_emits_one_set_frame() {
        let mut h = Harness::new();
        h.connect();
        let frames_before = h.sent_frames().len();

        h.out1.set_value(PinValue::Float(2.25)).unwrap();
        h.pump();

        let frames = h.sent_frames();
        assert_eq!(frames.len(), frames_before + 1);
        let set = frames.last().unwrap();
        assert_eq!(set.message_type(), Some(MessageType::HalrcompSet));
        assert_eq!(set.pin.len(), 1);
        assert_eq!(set.pin[0].handle, Some(7));
        assert_eq!(set.pin[0].name.as_deref(), Some("c.out1"));
        assert_eq!(set.pin[0].halfloat, Some(2.25));
    }

    #[test]
    fn local_input_change_is_ignored() {
        let mut h = Harness::new();
        h.connect();
        let frames_before = h.sent_frames().len();

        h.in1.set_value(PinValue::Bit(false)).unwrap();
        h.pump();

        assert_eq!(h.sent_frames().len(), frames_before);
    }

    #[test]
    fn no_set_frames_while_not_connected() {
        let mut h = Harness::new();
        h.session.start(h.now);
        let frames_before = h.sent_frames().len();

        h.out1.set_value(PinValue::Float(9.0)).unwrap();
        h.pump();

        assert_eq!(h.sent_frames().len(), frames_before);
    }

    #[test]
    fn command_timeout_and_recovery() {
        let mut h = Harness::new();
        h.connect();

        // First tick sends a ping and leaves it outstanding.
        h.session.dispatch(SessionEvent::CommandTick, h.now);
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
        assert_eq!(
            h.sent_frames().last().unwrap().message_type(),
            Some(MessageType::Ping)
        );

        // Second tick with no acknowledgement declares the timeout.
        h.session.dispatch(SessionEvent::CommandTick, h.now);
        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert_eq!(h.session.error(), ErrorKind::Timeout);
        assert_eq!(h.session.command_channel_state(), ChannelState::Trying);
        assert!(h.calls.lock().contains(&Call::Unsubscribe(b"c".to_vec())));
        // Leaving Connected marks values stale.
        assert!(!h.out1.synced());

        // A late acknowledgement recovers and re-subscribes.
        let subscribes_before = h
            .calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Subscribe(_)))
            .count();
        h.dispatch_command(&Container::of_type(MessageType::PingAcknowledge));
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
        assert_eq!(h.session.error(), ErrorKind::None);
        assert_eq!(h.session.command_channel_state(), ChannelState::Up);
        let subscribes_after = h
            .calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Subscribe(_)))
            .count();
        assert_eq!(subscribes_after, subscribes_before + 1);
    }

    #[test]
    fn subscribe_timeout_errors_and_probes() {
        let mut h = Harness::new();
        h.connect();

        h.session.dispatch(SessionEvent::SubscribeTick, h.now);

        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert_eq!(h.session.error(), ErrorKind::Timeout);
        assert_eq!(h.session.subscribe_channel_state(), ChannelState::Down);
        assert!(h.calls.lock().contains(&Call::Unsubscribe(b"c".to_vec())));
        assert_eq!(
            h.sent_frames().last().unwrap().message_type(),
            Some(MessageType::Ping)
        );
    }

    #[test]
    fn bind_reject_latches_and_restart_rebinds() {
        let mut h = Harness::new();
        h.session.start(h.now);
        h.dispatch_command(&reject(
            MessageType::HalrcompBindReject,
            &["shape mismatch", "pin 'out1' unknown"],
        ));

        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert_eq!(h.session.error(), ErrorKind::Bind);
        assert!(h.session.error_string().contains("shape mismatch"));
        assert!(h.session.error_string().contains("pin 'out1' unknown"));
        assert_eq!(h.session.command_channel_state(), ChannelState::Down);

        // Bind errors latch: an acknowledgement does not recover them.
        h.dispatch_command(&Container::of_type(MessageType::PingAcknowledge));
        assert_eq!(h.session.connection_state(), ConnectionState::Error);

        // Toggling the session re-attempts from scratch.
        h.session.stop(h.now);
        assert_eq!(h.session.error(), ErrorKind::None);
        h.session.start(h.now);
        let frames = h.sent_frames();
        assert_eq!(
            frames.last().unwrap().message_type(),
            Some(MessageType::HalrcompBind)
        );
        assert_eq!(h.session.connection_state(), ConnectionState::Connecting);
    }

    #[test]
    fn set_reject_maps_to_pin_change_error() {
        let mut h = Harness::new();
        h.connect();
        h.dispatch_command(&reject(MessageType::HalrcompSetReject, &["value out of range"]));
        assert_eq!(h.session.error(), ErrorKind::PinChange);
        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert_eq!(h.session.command_channel_state(), ChannelState::Down);
    }

    #[test]
    fn incremental_update_overrides_full_update_value() {
        let mut h = Harness::new();
        h.connect();

        h.dispatch_update(&incremental_update(7, PinValue::Float(3.5)));
        assert_eq!(h.out1.value(), PinValue::Float(3.5));
        assert!(h.out1.synced());
    }

    #[test]
    fn inbound_update_traffic_defers_the_subscribe_deadline() {
        let mut h = Harness::new();
        h.connect();

        let later = h.now + Duration::from_millis(200);
        h.now = later;
        h.dispatch_update(&incremental_update(7, PinValue::Float(2.0)));
        assert_eq!(
            h.session.subscribe_heartbeat.deadline(),
            Some(later + Duration::from_millis(500))
        );

        let even_later = later + Duration::from_millis(200);
        h.now = even_later;
        h.dispatch_update(&Container::of_type(MessageType::Ping));
        assert_eq!(
            h.session.subscribe_heartbeat.deadline(),
            Some(even_later + Duration::from_millis(500))
        );
    }

    #[test]
    fn update_channel_error_latches() {
        let mut h = Harness::new();
        h.connect();

        h.dispatch_update(&reject(MessageType::HalrcommandError, &["no such component"]));
        assert_eq!(h.session.error(), ErrorKind::Command);
        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert_eq!(h.session.subscribe_channel_state(), ChannelState::Down);

        // Only timeouts recover on acknowledgement.
        h.dispatch_command(&Container::of_type(MessageType::PingAcknowledge));
        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert_eq!(h.session.error(), ErrorKind::Command);
    }

    #[test]
    fn mismatched_value_type_is_a_command_error() {
        let mut h = Harness::new();
        h.connect();

        // Handle 7 is a float pin; a bit value is a protocol fault.
        h.dispatch_update(&incremental_update(7, PinValue::Bit(true)));
        assert_eq!(h.session.error(), ErrorKind::Command);
        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert_eq!(h.out1.value(), PinValue::Float(1.5));
    }

    #[test]
    fn unknown_pin_in_full_update_is_skipped() {
        let mut h = Harness::new();
        h.session.start(h.now);
        h.dispatch_command(&Container::of_type(MessageType::HalrcompBindConfirm));

        let mut frame = full_update();
        frame.comp[0]
            .pin
            .push(remote_pin("c.ghost", 99, PinValue::U32(1)));
        h.dispatch_update(&frame);

        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
        assert_eq!(h.out1.value(), PinValue::Float(1.5));
        assert!(h.session.registry.lookup_by_handle(99).is_none());
    }

    #[test]
    fn unknown_handle_in_incremental_update_is_skipped() {
        let mut h = Harness::new();
        h.connect();
        h.dispatch_update(&incremental_update(42, PinValue::Float(1.0)));
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
    }

    #[test]
    fn unknown_message_types_change_nothing() {
        let mut h = Harness::new();
        h.connect();
        let mut frame = Container::of_type(MessageType::Ping);
        frame.r#type = 4242;
        h.dispatch_command(&frame.clone());
        h.dispatch_update(&frame);
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);
        assert_eq!(h.session.error(), ErrorKind::None);
    }

    #[test]
    fn stop_tears_down_idempotently_and_silently() {
        let mut h = Harness::new();
        h.connect();

        h.session.stop(h.now);
        assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
        assert_eq!(h.session.error(), ErrorKind::None);
        assert!(h.calls.lock().contains(&Call::Disconnect));
        assert_eq!(h.out1.watcher_count(), 0);
        assert!(!h.session.command_heartbeat.is_running());
        assert!(!h.session.subscribe_heartbeat.is_running());
        // Leaving Connected marks values stale.
        assert!(!h.out1.synced());

        // A second stop and any further events are inert.
        let calls_before = h.calls.lock().len();
        h.session.stop(h.now);
        h.session.dispatch(SessionEvent::CommandTick, h.now);
        h.session.dispatch(
            SessionEvent::CommandFrame(protocol::encode(&Container::of_type(
                MessageType::PingAcknowledge,
            ))),
            h.now,
        );
        assert_eq!(h.calls.lock().len(), calls_before);
        assert_eq!(h.session.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn send_failure_is_a_fatal_socket_error() {
        let mut h = Harness::new();
        h.connect();

        *h.fail_sends.lock() = true;
        h.session.dispatch(SessionEvent::CommandTick, h.now);

        assert_eq!(h.session.error(), ErrorKind::Socket);
        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert!(h.session.error_string().contains("send refused"));
    }

    #[test]
    fn next_deadline_is_the_nearest_heartbeat() {
        let mut h = Harness::new();
        assert_eq!(h.session.next_deadline(), None);
        h.connect();
        // Keepalive (500 ms) is nearer than the command period (1000 ms).
        assert_eq!(
            h.session.next_deadline(),
            Some(h.now + Duration::from_millis(500))
        );
    }

    #[test]
    fn poll_timers_fires_due_heartbeats() {
        let mut h = Harness::new();
        h.connect();

        // Nothing due yet.
        h.session.poll_timers(h.now);
        assert_eq!(h.session.connection_state(), ConnectionState::Connected);

        // Past the keepalive deadline the subscribe side times out.
        h.session.poll_timers(h.now + Duration::from_millis(600));
        assert_eq!(h.session.connection_state(), ConnectionState::Error);
        assert_eq!(h.session.error(), ErrorKind::Timeout);
    }
}
