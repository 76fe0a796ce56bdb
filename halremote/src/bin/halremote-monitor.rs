//! Remote component monitor.
//!
//! Binds a component with pins declared on the command line, then logs
//! connection-state and pin-value changes until interrupted.
//!
//! # Usage
//!
//! ```sh
//! halremote-monitor --command tcp://192.168.1.2:5001 \
//!     --update tcp://192.168.1.2:5002 \
//!     --name mill \
//!     --pin speed:float:out --pin estop:bit:in
//! ```

use std::sync::Arc;
use std::time::Duration;

use halremote::{
    Config, ConnectionState, HalPin, HalRemoteComponent, PinDirection, PinType, ValueSource,
};

fn main() {
    halremote::init_tracing();
    if let Err(e) = run() {
        eprintln!("halremote-monitor: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    let (config, pins) = parse_args(&args)?;

    for pin in &pins {
        let watched = Arc::clone(pin);
        pin.watch(move |name, source| {
            if source == ValueSource::Remote {
                println!("{name} = {:?}", watched.value());
            }
        });
    }

    let mut component = HalRemoteComponent::new(config, pins).map_err(|e| e.to_string())?;
    component.set_ready(true);

    let mut last_state = ConnectionState::Disconnected;
    loop {
        let state = component.connection_state();
        if state != last_state {
            match state {
                ConnectionState::Error => {
                    println!("state: {state:?} ({})", component.error_string());
                }
                _ => println!("state: {state:?}"),
            }
            last_state = state;
        }
        std::thread::sleep(Duration::from_millis(200));
    }
}

fn parse_args(args: &[String]) -> Result<(Config, Vec<Arc<HalPin>>), String> {
    let mut config = Config::default();
    let mut pins = Vec::new();

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        let value = args
            .get(i + 1)
            .ok_or_else(|| format!("{flag} requires a value"))?;
        match flag {
            "--command" => config.command_uri = value.clone(),
            "--update" => config.update_uri = value.clone(),
            "--name" => config.name = value.clone(),
            "--heartbeat" => {
                config.heartbeat_period_ms = value
                    .parse()
                    .map_err(|_| format!("invalid heartbeat period '{value}'"))?;
            }
            "--pin" => pins.push(parse_pin(value)?),
            other => return Err(format!("unknown flag '{other}'")),
        }
        i += 2;
    }

    if pins.is_empty() {
        return Err("at least one --pin is required".into());
    }
    Ok((config, pins))
}

/// Parses a `name:type:direction` pin declaration.
fn parse_pin(spec: &str) -> Result<Arc<HalPin>, String> {
    let mut parts = spec.split(':');
    let (Some(name), Some(ty), Some(dir), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(format!("invalid pin spec '{spec}', expected name:type:dir"));
    };

    let ty = match ty {
        "float" => PinType::Float,
        "bit" => PinType::Bit,
        "s32" => PinType::S32,
        "u32" => PinType::U32,
        other => return Err(format!("unknown pin type '{other}'")),
    };
    let dir = match dir {
        "in" => PinDirection::In,
        "out" => PinDirection::Out,
        "io" => PinDirection::InOut,
        other => return Err(format!("unknown pin direction '{other}'")),
    };
    Ok(Arc::new(HalPin::new(name, ty, dir)))
}
