//! Local pin descriptors: typed, directional signal values with change
//! notification.
//!
//! A [`HalPin`] is the local end of one remote signal. Identity (name, type,
//! direction) is fixed at construction; the value, the synced flag, and the
//! server-assigned handle are mutable and shared between the host thread and
//! the session thread.

pub mod registry;

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

/// Value types a pin can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinType {
    Float,
    Bit,
    S32,
    U32,
}

/// Data-flow direction of a pin, seen from the local component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinDirection {
    /// Remote writes, local reads.
    In,
    /// Local writes, remote reads.
    Out,
    /// Both sides write.
    InOut,
}

impl PinDirection {
    /// Whether local changes to a pin of this direction are forwarded to
    /// the remote.
    #[must_use]
    pub const fn is_output(self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// A pin value. The variant is fixed at pin construction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinValue {
    Float(f64),
    Bit(bool),
    S32(i32),
    U32(u32),
}

impl PinValue {
    /// The type this value belongs to.
    #[must_use]
    pub const fn pin_type(self) -> PinType {
        match self {
            Self::Float(_) => PinType::Float,
            Self::Bit(_) => PinType::Bit,
            Self::S32(_) => PinType::S32,
            Self::U32(_) => PinType::U32,
        }
    }

    /// Zero/false value for a pin type.
    #[must_use]
    pub const fn zero(ty: PinType) -> Self {
        match ty {
            PinType::Float => Self::Float(0.0),
            PinType::Bit => Self::Bit(false),
            PinType::S32 => Self::S32(0),
            PinType::U32 => Self::U32(0),
        }
    }
}

/// Origin of a pin write.
///
/// Watchers receive the source so remote-origin updates are observable
/// without being fed back into the outbound path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    /// Written by the host application.
    Local,
    /// Written by the session from a server update.
    Remote,
}

/// Errors raised by pin writes.
#[derive(Debug, Error)]
pub enum PinError {
    /// The written value's variant does not match the pin's declared type.
    #[error("pin '{pin}' is {expected:?}, rejected {value:?} write")]
    TypeMismatch {
        pin: String,
        expected: PinType,
        value: PinType,
    },
}

/// Token returned by [`HalPin::watch`], used to remove the watcher again.
pub type WatchId = u64;

type WatchFn = Box<dyn Fn(&str, ValueSource) + Send + Sync>;

struct PinState {
    value: PinValue,
    synced: bool,
    handle: Option<u32>,
}

/// The local end of one remote signal.
pub struct HalPin {
    name: String,
    pin_type: PinType,
    direction: PinDirection,
    enabled: bool,
    state: Mutex<PinState>,
    // Watchers are called with this lock held; callbacks must not call
    // watch()/unwatch() on the same pin.
    watchers: Mutex<Vec<(WatchId, WatchFn)>>,
    next_watch: AtomicU64,
}

impl HalPin {
    /// Creates an enabled pin holding the zero value of its type.
    #[must_use]
    pub fn new(name: impl Into<String>, pin_type: PinType, direction: PinDirection) -> Self {
        Self {
            name: name.into(),
            pin_type,
            direction,
            enabled: true,
            state: Mutex::new(PinState {
                value: PinValue::zero(pin_type),
                synced: false,
                handle: None,
            }),
            watchers: Mutex::new(Vec::new()),
            next_watch: AtomicU64::new(0),
        }
    }

    /// Sets the initial value (builder style, before the pin is shared).
    ///
    /// # Panics
    ///
    /// Panics if the value's variant does not match the pin type. This is a
    /// construction-time programming error, not a runtime condition.
    #[must_use]
    pub fn with_value(self, value: PinValue) -> Self {
        assert_eq!(
            value.pin_type(),
            self.pin_type,
            "initial value for pin '{}' has the wrong type",
            self.name
        );
        self.state.lock().value = value;
        self
    }

    /// Marks the pin enabled or disabled (builder style). Disabled pins are
    /// skipped by the registry and never reach the wire.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn pin_type(&self) -> PinType {
        self.pin_type
    }

    #[must_use]
    pub fn direction(&self) -> PinDirection {
        self.direction
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Current value.
    #[must_use]
    pub fn value(&self) -> PinValue {
        self.state.lock().value
    }

    /// Whether the value reflects a server update since the last (re)connect.
    #[must_use]
    pub fn synced(&self) -> bool {
        self.state.lock().synced
    }

    /// Server-assigned handle, present after the first full update.
    #[must_use]
    pub fn handle(&self) -> Option<u32> {
        self.state.lock().handle
    }

    /// Host-origin write. Clears the synced flag and notifies watchers with
    /// [`ValueSource::Local`] if the value changed.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::TypeMismatch`] if the value's variant does not
    /// match the declared pin type.
    pub fn set_value(&self, value: PinValue) -> Result<(), PinError> {
        self.check_type(value)?;
        let changed = {
            let mut state = self.state.lock();
            if state.value == value {
                false
            } else {
                state.value = value;
                state.synced = false;
                true
            }
        };
        if changed {
            self.notify(ValueSource::Local);
        }
        Ok(())
    }

    /// Session-origin write. Sets the synced flag and notifies watchers with
    /// [`ValueSource::Remote`] if the value changed.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::TypeMismatch`] if the value's variant does not
    /// match the declared pin type.
    pub fn update_from_remote(&self, value: PinValue) -> Result<(), PinError> {
        self.check_type(value)?;
        let changed = {
            let mut state = self.state.lock();
            state.synced = true;
            if state.value == value {
                false
            } else {
                state.value = value;
                true
            }
        };
        if changed {
            self.notify(ValueSource::Remote);
        }
        Ok(())
    }

    /// Registers a change watcher and returns its removal token.
    pub fn watch(&self, f: impl Fn(&str, ValueSource) + Send + Sync + 'static) -> WatchId {
        let id = self.next_watch.fetch_add(1, Ordering::Relaxed);
        self.watchers.lock().push((id, Box::new(f)));
        id
    }

    /// Removes a previously registered watcher. Unknown tokens are ignored.
    pub fn unwatch(&self, id: WatchId) {
        self.watchers.lock().retain(|(watch, _)| *watch != id);
    }

    /// Number of registered watchers.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.watchers.lock().len()
    }

    pub(crate) fn set_handle(&self, handle: u32) {
        self.state.lock().handle = Some(handle);
    }

    pub(crate) fn set_synced(&self, synced: bool) {
        self.state.lock().synced = synced;
    }

    fn check_type(&self, value: PinValue) -> Result<(), PinError> {
        if value.pin_type() == self.pin_type {
            Ok(())
        } else {
            Err(PinError::TypeMismatch {
                pin: self.name.clone(),
                expected: self.pin_type,
                value: value.pin_type(),
            })
        }
    }

    fn notify(&self, source: ValueSource) {
        for (_, f) in self.watchers.lock().iter() {
            f(&self.name, source);
        }
    }
}

impl std::fmt::Debug for HalPin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HalPin")
            .field("name", &self.name)
            .field("type", &self.pin_type)
            .field("direction", &self.direction)
            .field("enabled", &self.enabled)
            .field("value", &state.value)
            .field("synced", &state.synced)
            .field("handle", &state.handle)
            .finish()
    }
}
