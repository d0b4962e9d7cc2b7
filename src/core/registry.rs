//! Tag → error bus registry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use super::{ErrorBus, ErrorBusHandle, DEFAULT_BUS_CAPACITY};

/// Append-only map from tag to its error bus.
///
/// Lookup and insertion share one lock scope, so two submitters racing on a
/// fresh tag always end up with the same bus. Buses are never removed.
#[derive(Debug)]
pub struct BusRegistry {
    bus_capacity: usize,
    buses: Mutex<HashMap<String, ErrorBusHandle>>,
}

impl BusRegistry {
    /// Create an empty registry whose buses buffer `bus_capacity` outcomes.
    pub fn new(bus_capacity: usize) -> Self {
        Self {
            bus_capacity,
            buses: Mutex::new(HashMap::new()),
        }
    }

    /// Return the bus for `tag`, creating it on first use.
    pub fn get_or_create(&self, tag: &str) -> ErrorBusHandle {
        let mut buses = self.buses.lock();
        if let Some(bus) = buses.get(tag) {
            return Arc::clone(bus);
        }
        let bus = Arc::new(ErrorBus::with_capacity(tag, self.bus_capacity));
        buses.insert(tag.to_owned(), Arc::clone(&bus));
        debug!(tag = tag, capacity = self.bus_capacity, "Created error bus");
        bus
    }

    /// Return the bus for `tag` if one exists.
    pub fn get(&self, tag: &str) -> Option<ErrorBusHandle> {
        self.buses.lock().get(tag).cloned()
    }

    /// All tags that have a bus, in no particular order.
    pub fn tags(&self) -> Vec<String> {
        self.buses.lock().keys().cloned().collect()
    }

    /// Number of registered buses.
    pub fn len(&self) -> usize {
        self.buses.lock().len()
    }

    /// Whether no bus has been created yet.
    pub fn is_empty(&self) -> bool {
        self.buses.lock().is_empty()
    }
}

impl Default for BusRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}
