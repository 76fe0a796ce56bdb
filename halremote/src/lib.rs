//! Client for remote HAL components.
//!
//! A remote HAL component is a named set of typed, directional pins exposed
//! by a real-time control daemon. This crate implements the client half of
//! the protocol: it binds the local pin shape to the daemon over a command
//! channel, subscribes to authoritative values on an update channel, and
//! forwards local output-pin changes back. Two independent heartbeats watch
//! the channels; command-channel timeouts recover transparently.
//!
//! ```no_run
//! use std::sync::Arc;
//! use halremote::{Config, HalPin, HalRemoteComponent, PinDirection, PinType};
//!
//! let speed = Arc::new(HalPin::new("speed", PinType::Float, PinDirection::Out));
//! let estop = Arc::new(HalPin::new("estop", PinType::Bit, PinDirection::In));
//!
//! let mut component = HalRemoteComponent::new(
//!     Config {
//!         command_uri: "tcp://192.168.1.2:5001".into(),
//!         update_uri: "tcp://192.168.1.2:5002".into(),
//!         name: "mill".into(),
//!         ..Config::default()
//!     },
//!     vec![Arc::clone(&speed), Arc::clone(&estop)],
//! )?;
//! component.set_ready(true);
//! # Ok::<(), halremote::ConfigError>(())
//! ```

pub mod component;
pub mod pin;
pub mod protocol;
pub mod session;
pub mod transport;

pub use component::{Config, ConfigError, HalRemoteComponent};
pub use pin::{HalPin, PinDirection, PinError, PinType, PinValue, ValueSource};
pub use session::state::{ChannelState, ConnectionState, ErrorKind, Status};

/// Initialize the tracing subscriber with timestamps.
///
/// Call this at the start of tests or binaries to enable trace output.
/// Honors `RUST_LOG`; defaults to `halremote=debug`.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("halremote=debug"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .init();
}
