use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::decode::{decode_locations, decode_thermostats};
use crate::protocol::{PATH_DEVICE_DATA, PATH_LOCATIONS};
use crate::transport::Transport;
use crate::types::{Location, Thermostat};
use crate::Result;

#[derive(Debug, Default)]
struct Snapshot {
    ticket: u64,
    locations: BTreeMap<String, Location>,
    thermostats: BTreeMap<String, Thermostat>,
}

/// Last polled state of every location and thermostat.
///
/// A refresh builds a complete new snapshot and swaps it in under the write
/// lock. Each refresh takes a ticket before it starts fetching; a refresh
/// that finishes after a later-started one has already been applied is
/// dropped. Readers always get owned copies.
pub(crate) struct DeviceCache {
    snapshot: RwLock<Arc<Snapshot>>,
    next_ticket: AtomicU64,
    min_interval: Duration,
    last_refresh: Mutex<Option<Instant>>,
}

impl DeviceCache {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            next_ticket: AtomicU64::new(1),
            min_interval,
            last_refresh: Mutex::new(None),
        }
    }

    /// Refresh from the remote service. Returns `false` when the call was
    /// throttled or its result was superseded by a newer refresh.
    pub async fn update(&self, transport: &Transport, no_throttle: bool) -> Result<bool> {
        {
            let mut last = self.last_refresh.lock().unwrap_or_else(PoisonError::into_inner);
            if !no_throttle
                && let Some(at) = *last
                && at.elapsed() < self.min_interval
            {
                trace!("update throttled");
                return Ok(false);
            }
            *last = Some(Instant::now());
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);

        // thermostats reference location ids
        let locations = decode_locations(&transport.get(PATH_LOCATIONS).await?)?;
        let thermostats = decode_thermostats(&transport.get(PATH_DEVICE_DATA).await?)?;

        let mut current = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        if current.ticket > ticket {
            debug!(ticket, applied = current.ticket, "discarding superseded refresh");
            return Ok(false);
        }
        info!(
            locations = locations.len(),
            thermostats = thermostats.len(),
            "cached device state"
        );
        *current = Arc::new(Snapshot {
            ticket,
            locations,
            thermostats,
        });
        Ok(true)
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn thermostat(&self, id: &str) -> Option<Thermostat> {
        self.current().thermostats.get(id).cloned()
    }

    pub fn thermostats(&self) -> BTreeMap<String, Thermostat> {
        self.current().thermostats.clone()
    }

    pub fn location(&self, id: &str) -> Option<Location> {
        self.current().locations.get(id).cloned()
    }

    pub fn locations(&self) -> BTreeMap<String, Location> {
        self.current().locations.clone()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.current().thermostats.contains_key(id)
    }

    #[cfg(test)]
    fn install(&self, thermostats: BTreeMap<String, Thermostat>) {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        *self.snapshot.write().unwrap() = Arc::new(Snapshot {
            ticket,
            locations: BTreeMap::new(),
            thermostats,
        });
    }
}
