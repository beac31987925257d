// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Location tracking
//!
//! A background watch task writes position fixes into a single shared
//! slot. The most recent fix always wins and no history is kept. A
//! source error (permission denied, hardware failure) stops the watch
//! and marks the feature unavailable without crashing anything; the
//! watch is retried only on the next explicit enable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::{debug, info, warn};

/// One geolocation fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Degrees north
    pub latitude: f64,
    /// Degrees east
    pub longitude: f64,
    /// Accuracy radius in meters
    pub accuracy: f64,
    /// When the fix was taken
    pub timestamp: DateTime<Utc>,
}

/// The shared most-recent-wins location slot
pub type SharedLocation = Arc<RwLock<Option<LocationSample>>>;

/// Create an empty location slot
pub fn shared_slot() -> SharedLocation {
    Arc::new(RwLock::new(None))
}

/// A source of position fixes
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Wait for and return the next fix
    async fn next_fix(&mut self) -> Result<LocationSample>;
}

/// Builds a fresh source for each watch session
pub type SourceFactory = Box<dyn Fn() -> Box<dyn LocationSource> + Send + Sync>;

/// Watches a location source and keeps the shared slot current
pub struct LocationTracker {
    slot: SharedLocation,
    enabled: Arc<AtomicBool>,
    watching: Arc<AtomicBool>,
    factory: Mutex<Option<SourceFactory>>,
    shutdown: broadcast::Sender<()>,
}

impl LocationTracker {
    /// Create a tracker over the shared slot. No watch runs until a
    /// source is set and `start` is called.
    pub fn new(slot: SharedLocation, enabled: bool, shutdown: broadcast::Sender<()>) -> Self {
        Self {
            slot,
            enabled: Arc::new(AtomicBool::new(enabled)),
            watching: Arc::new(AtomicBool::new(false)),
            factory: Mutex::new(None),
            shutdown,
        }
    }

    /// Install the source factory used for every watch session
    pub fn set_source(&self, factory: SourceFactory) {
        *self.factory.lock() = Some(factory);
    }

    /// Whether a watch task is currently running
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::SeqCst)
    }

    /// Spawn the watch task if enabled, a source exists, and no watch is
    /// already running
    pub fn start(&self) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        if self.watching.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut source = match self.factory.lock().as_ref() {
            Some(factory) => factory(),
            None => {
                self.watching.store(false, Ordering::SeqCst);
                warn!("No location source available; emergencies will carry no position");
                return;
            }
        };

        let slot = self.slot.clone();
        let enabled = self.enabled.clone();
        let watching = self.watching.clone();
        let mut shutdown = self.shutdown.subscribe();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    fix = source.next_fix() => match fix {
                        Ok(sample) => {
                            if enabled.load(Ordering::Relaxed) {
                                debug!(
                                    "Location updated: {:.4},{:.4} (±{:.0}m)",
                                    sample.latitude, sample.longitude, sample.accuracy
                                );
                                *slot.write() = Some(sample);
                            }
                        }
                        Err(e) => {
                            // Permission denied or hardware failure: the
                            // feature is unavailable until re-enabled
                            // explicitly.
                            warn!("Location watch error: {}; tracking stopped", e);
                            *slot.write() = None;
                            break;
                        }
                    },
                    _ = shutdown.recv() => break,
                }
            }
            watching.store(false, Ordering::SeqCst);
        });
    }

    /// Toggle location tracking. Disabling clears the current sample so
    /// a stale position is never attached to an emergency; enabling
    /// restarts the watch if it stopped on a source error.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        if enabled {
            self.start();
        } else {
            *self.slot.write() = None;
            info!("Location tracking disabled");
        }
    }
}

/// Random-walk position source for demo mode
pub struct SimulatedGps {
    rng: StdRng,
    latitude: f64,
    longitude: f64,
    interval: Duration,
}

impl SimulatedGps {
    /// Start near the given coordinates
    pub fn new(latitude: f64, longitude: f64, interval_ms: u64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            latitude,
            longitude,
            interval: Duration::from_millis(interval_ms),
        }
    }
}

#[async_trait]
impl LocationSource for SimulatedGps {
    async fn next_fix(&mut self) -> Result<LocationSample> {
        sleep(self.interval).await;
        self.latitude += self.rng.gen_range(-0.0005..0.0005);
        self.longitude += self.rng.gen_range(-0.0005..0.0005);
        Ok(LocationSample {
            latitude: self.latitude,
            longitude: self.longitude,
            accuracy: self.rng.gen_range(5.0..30.0),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(latitude: f64) -> LocationSample {
        LocationSample {
            latitude,
            longitude: 77.2,
            accuracy: 10.0,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_most_recent_fix_wins() {
        let slot = shared_slot();
        *slot.write() = Some(sample(28.6));
        *slot.write() = Some(sample(28.7));

        assert_eq!(slot.read().unwrap().latitude, 28.7);
    }

    #[test]
    fn test_disable_clears_sample() {
        let slot = shared_slot();
        *slot.write() = Some(sample(28.6));

        let (shutdown, _) = broadcast::channel(1);
        let tracker = LocationTracker::new(slot.clone(), true, shutdown);
        tracker.set_enabled(false);

        assert!(slot.read().is_none());
    }

    // Errors while the flag is set, then serves fixes.
    struct FlakySource {
        failing: Arc<AtomicBool>,
    }

    #[async_trait]
    impl LocationSource for FlakySource {
        async fn next_fix(&mut self) -> Result<LocationSample> {
            sleep(Duration::from_millis(5)).await;
            if self.failing.load(Ordering::SeqCst) {
                anyhow::bail!("permission denied");
            }
            Ok(sample(28.6))
        }
    }

    #[tokio::test]
    async fn test_source_error_stops_watch_until_reenabled() {
        let slot = shared_slot();
        let (shutdown, _keep) = broadcast::channel(1);
        let tracker = LocationTracker::new(slot.clone(), true, shutdown.clone());

        let failing = Arc::new(AtomicBool::new(true));
        let flag = failing.clone();
        tracker.set_source(Box::new(move || {
            Box::new(FlakySource {
                failing: flag.clone(),
            })
        }));

        tracker.start();
        sleep(Duration::from_millis(30)).await;

        // First fix errored: watch is down and stays down.
        assert!(!tracker.is_watching());
        assert!(slot.read().is_none());

        // Explicit re-enable after the permission problem clears.
        failing.store(false, Ordering::SeqCst);
        tracker.set_enabled(true);
        sleep(Duration::from_millis(30)).await;

        assert!(tracker.is_watching());
        assert!(slot.read().is_some());

        let _ = shutdown.send(());
    }

    #[tokio::test]
    async fn test_start_without_source_does_not_watch() {
        let (shutdown, _) = broadcast::channel(1);
        let tracker = LocationTracker::new(shared_slot(), true, shutdown);
        tracker.start();
        assert!(!tracker.is_watching());
    }
}
