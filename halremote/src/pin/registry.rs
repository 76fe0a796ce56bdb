//! Dual-indexed registry of the pins a session has bound.
//!
//! Pins are indexed by local name from session start, and additionally by
//! server-assigned handle once the first full update arrives. The registry
//! borrows the pins (weak references); the host owns them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use tracing::{debug, warn};

use super::{HalPin, ValueSource, WatchId};

struct Entry {
    pin: Weak<HalPin>,
    watch: WatchId,
}

/// Name- and handle-indexed set of registered pins.
#[derive(Default)]
pub struct PinRegistry {
    by_name: HashMap<String, Entry>,
    by_handle: HashMap<u32, Weak<HalPin>>,
    // Stable enumeration order for bind encoding.
    order: Vec<String>,
}

impl PinRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pin and subscribes `on_change` to its value notifications.
    ///
    /// Pins with an empty name or `enabled == false` are skipped. A second
    /// registration under an already-known name replaces the first (the old
    /// watcher is removed).
    pub fn add(
        &mut self,
        pin: &Arc<HalPin>,
        on_change: impl Fn(&str, ValueSource) + Send + Sync + 'static,
    ) {
        if pin.name().is_empty() || !pin.enabled() {
            debug!(pin = %pin.name(), "skipping empty-named or disabled pin");
            return;
        }

        let watch = pin.watch(on_change);
        let name = pin.name().to_string();
        if let Some(old) = self.by_name.insert(
            name.clone(),
            Entry {
                pin: Arc::downgrade(pin),
                watch,
            },
        ) {
            warn!(pin = %name, "pin registered twice, replacing");
            if let Some(old_pin) = old.pin.upgrade() {
                old_pin.unwatch(old.watch);
            }
        } else {
            self.order.push(name);
        }
    }

    /// Records the server-assigned handle for a named pin and indexes it.
    ///
    /// An unknown name means the server's view of the component disagrees
    /// with the local one; that is logged and skipped rather than treated
    /// as fatal.
    pub fn bind_handle(&mut self, name: &str, handle: u32) {
        match self.by_name.get(name) {
            Some(entry) => {
                if let Some(pin) = entry.pin.upgrade() {
                    pin.set_handle(handle);
                    self.by_handle.insert(handle, entry.pin.clone());
                }
            }
            None => warn!(pin = %name, handle, "handle for unknown pin, ignoring"),
        }
    }

    #[must_use]
    pub fn lookup_by_handle(&self, handle: u32) -> Option<Arc<HalPin>> {
        self.by_handle.get(&handle).and_then(Weak::upgrade)
    }

    #[must_use]
    pub fn lookup_by_name(&self, name: &str) -> Option<Arc<HalPin>> {
        self.by_name.get(name).and_then(|e| e.pin.upgrade())
    }

    /// Clears every pin's synced flag. Called whenever the session leaves
    /// the connected state so consumers can observe that values are stale.
    pub fn mark_all_unsynced(&self) {
        for entry in self.by_name.values() {
            if let Some(pin) = entry.pin.upgrade() {
                pin.set_synced(false);
            }
        }
    }

    /// Removes all registrations and their change watchers.
    pub fn clear(&mut self) {
        for entry in self.by_name.values() {
            if let Some(pin) = entry.pin.upgrade() {
                pin.unwatch(entry.watch);
            }
        }
        self.by_name.clear();
        self.by_handle.clear();
        self.order.clear();
    }

    /// Registered pins in registration order. Dropped pins are skipped.
    pub fn iter_pins(&self) -> impl Iterator<Item = Arc<HalPin>> + '_ {
        self.order
            .iter()
            .filter_map(|name| self.by_name.get(name))
            .filter_map(|entry| entry.pin.upgrade())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
