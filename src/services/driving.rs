use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{ParkingLot, UserLocation};
use crate::services::availability::{self, Nearby};

/// Width of the per-tick jitter window, in degrees. Each axis moves by at
/// most half of this (±0.0005°) per tick.
const LOCATION_JITTER: f64 = 0.001;

#[derive(Debug, Clone, Serialize)]
pub struct DrivingSnapshot {
    pub active: bool,
    pub location: UserLocation,
    pub nearby: Nearby,
    pub refreshes: u64,
}

impl DrivingSnapshot {
    fn idle(location: UserLocation) -> Self {
        Self {
            active: false,
            location,
            nearby: availability::nearby(&[]),
            refreshes: 0,
        }
    }
}

/// Driving mode: while active, a background task re-ranks nearby lots and
/// nudges the simulated location every `interval`. Stopping or dropping
/// the handle cancels the task.
pub struct DrivingMode {
    interval: Duration,
    lots: Arc<Mutex<Vec<ParkingLot>>>,
    snapshot: Arc<watch::Sender<DrivingSnapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl DrivingMode {
    pub fn new(interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(DrivingSnapshot::idle(UserLocation::default()));
        Self {
            interval,
            lots: Arc::default(),
            snapshot: Arc::new(snapshot),
            task: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.snapshot.borrow().active
    }

    pub fn snapshot(&self) -> DrivingSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DrivingSnapshot> {
        self.snapshot.subscribe()
    }

    /// Replaces the lots the refresh ranks, e.g. after a new fetch.
    pub fn update_lots(&self, lots: Vec<ParkingLot>) {
        if let Ok(mut current) = self.lots.lock() {
            *current = lots;
        }
    }

    /// Starts the refresh loop. Returns false if it was already running.
    pub fn start(&self, lots: Vec<ParkingLot>) -> bool {
        let Ok(mut task) = self.task.lock() else {
            return false;
        };
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }

        self.update_lots(lots);
        let nearby = self.rank();
        self.snapshot.send_modify(|s| {
            s.active = true;
            s.nearby = nearby;
            s.refreshes = 0;
        });

        let lots = Arc::clone(&self.lots);
        let snapshot = Arc::clone(&self.snapshot);
        let interval = self.interval;

        *task = Some(tokio::spawn(async move {
            let mut rng = StdRng::from_entropy();
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            loop {
                ticker.tick().await;
                let nearby = {
                    let Ok(lots) = lots.lock() else { break };
                    availability::nearby(&lots)
                };
                let dlat = (rng.gen::<f64>() - 0.5) * LOCATION_JITTER;
                let dlng = (rng.gen::<f64>() - 0.5) * LOCATION_JITTER;
                snapshot.send_modify(|s| {
                    s.nearby = nearby;
                    s.location.lat += dlat;
                    s.location.lng += dlng;
                    s.refreshes += 1;
                });
            }
        }));

        tracing::info!(interval = ?self.interval, "driving mode started");
        true
    }

    /// Cancels the refresh loop. Returns false if it was not running.
    pub fn stop(&self) -> bool {
        let handle = self.task.lock().ok().and_then(|mut t| t.take());
        let Some(handle) = handle else {
            return false;
        };
        handle.abort();
        self.snapshot.send_modify(|s| s.active = false);
        tracing::info!("driving mode stopped");
        true
    }

    fn rank(&self) -> Nearby {
        match self.lots.lock() {
            Ok(lots) => availability::nearby(&lots),
            Err(_) => availability::nearby(&[]),
        }
    }
}

impl Drop for DrivingMode {
    fn drop(&mut self) {
        if let Ok(mut task) = self.task.lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

/// One driving mode per signed-in session, keyed by access token.
pub struct DrivingSessions {
    interval: Duration,
    modes: Mutex<HashMap<String, Arc<DrivingMode>>>,
}

impl DrivingSessions {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            modes: Mutex::new(HashMap::new()),
        }
    }

    fn modes(&self) -> MutexGuard<'_, HashMap<String, Arc<DrivingMode>>> {
        self.modes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The mode for `key`, created idle on first use.
    pub fn mode(&self, key: &str) -> Arc<DrivingMode> {
        let mut modes = self.modes();
        let mode = modes
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(DrivingMode::new(self.interval)));
        Arc::clone(mode)
    }

    /// Hands freshly fetched lots to every running mode.
    pub fn update_lots(&self, lots: &[ParkingLot]) {
        for mode in self.modes().values().filter(|m| m.is_active()) {
            mode.update_lots(lots.to_vec());
        }
    }

    /// Stops and forgets the mode for `key`. Returns false if there was none.
    pub fn end(&self, key: &str) -> bool {
        let removed = self.modes().remove(key);
        match removed {
            Some(mode) => {
                mode.stop();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.modes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
