// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Engine - wires stores, detectors, arbiter, and location into one unit

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::config::Config;
use crate::core::arbiter::{Arbiter, ArbiterCommand, LogHaptics, TelUriHandoff};
use crate::core::{EventBus, SystemState};
use crate::detectors::{
    DetectorHealth, DetectorKind, DetectorManager, HoldDetector, InputEvent, InputSimulator,
    KeyboardDetector, ShakeDetector, Trigger, TriggerSource, VoiceDetector,
};
use crate::location::{shared_slot, LocationTracker, SharedLocation, SimulatedGps};
use crate::notify::SmsSimulator;
use crate::store::{ContactsStore, EventLog, KvStore, SettingsStore};

/// The assembled emergency response engine
pub struct Engine {
    config: Config,
    bus: Arc<EventBus>,
    kv: Arc<KvStore>,
    settings: Arc<SettingsStore>,
    contacts: Arc<ContactsStore>,
    log: Arc<EventLog>,
    location: SharedLocation,
    tracker: Arc<LocationTracker>,
    arbiter: Arc<Arbiter>,
    commands: mpsc::Sender<ArbiterCommand>,
    detectors: Arc<DetectorManager>,
    state: Arc<parking_lot::RwLock<SystemState>>,
    shutdown: broadcast::Sender<()>,
}

impl Engine {
    /// Build an engine from configuration. Nothing runs until `start`.
    pub fn new(config: Config) -> Result<Self> {
        let kv = Arc::new(KvStore::open(&config.storage.path));
        let settings = Arc::new(SettingsStore::new(kv.clone()));
        let contacts = Arc::new(ContactsStore::new(kv.clone()));
        let log = Arc::new(EventLog::new(kv.clone(), config.arbiter.event_log_cap));

        let bus = Arc::new(EventBus::new(256));
        let (shutdown, _) = broadcast::channel(4);

        let location = shared_slot();
        let tracker = Arc::new(LocationTracker::new(
            location.clone(),
            settings.load().location_enabled,
            shutdown.clone(),
        ));

        let (arbiter, commands) = Arbiter::new(
            config.arbiter.clone(),
            bus.clone(),
            Arc::new(SmsSimulator),
            Arc::new(TelUriHandoff),
            Arc::new(LogHaptics),
            contacts.clone(),
            settings.clone(),
            log.clone(),
            location.clone(),
        );

        let detectors = Arc::new(DetectorManager::new(
            bus.clone(),
            commands.clone(),
            shutdown.clone(),
        ));

        Ok(Self {
            config,
            bus,
            kv,
            settings,
            contacts,
            log,
            location,
            tracker,
            arbiter,
            commands,
            detectors,
            state: Arc::new(parking_lot::RwLock::new(SystemState::default())),
            shutdown,
        })
    }

    /// Start every background task: arbiter, detectors, location watch,
    /// service-card forwarder, and (in demo mode) the input simulator.
    pub async fn start(&self) -> Result<()> {
        info!("Starting {} v{}...", self.config.app_name, self.config.version);

        if !self.kv.is_persistent() {
            warn!("Running with in-memory storage only; data will not survive restart");
        }
        if !self.kv.onboarding_seen() {
            info!("First run: add emergency contacts with `raksha contacts add`");
            self.kv.set_onboarding_seen();
        }

        tokio::spawn(self.arbiter.clone().run(self.shutdown.subscribe()));

        self.register_detectors().await?;

        // Hardware capabilities only exist in demo mode; a real GPS
        // source would slot in here the same way.
        if self.config.demo_mode {
            let interval = self.config.location.watch_interval_ms;
            self.tracker.set_source(Box::new(move || {
                Box::new(SimulatedGps::new(28.6139, 77.2090, interval))
            }));
        }
        self.tracker.start();

        self.spawn_service_card_forwarder();
        self.spawn_state_tracker();

        if self.config.demo_mode {
            let inputs = self.bus.input_sender();
            let shutdown = self.shutdown.subscribe();
            let simulator = InputSimulator::new(8);
            tokio::spawn(async move {
                simulator.run(inputs, shutdown).await;
            });
            info!("Demo mode: input simulator running");
        }

        self.state.write().running = true;
        info!(
            "Engine started with {} detectors listening",
            self.detectors.active_count().await
        );
        Ok(())
    }

    async fn register_detectors(&self) -> Result<()> {
        let settings = self.settings.load();
        let d = &self.config.detectors;

        // Button and keyboard input is always available; motion and
        // speech need device capabilities we only have in demo mode.
        let motion_capable = self.config.demo_mode;
        let speech_capable = self.config.demo_mode;

        self.detectors
            .register(Box::new(HoldDetector::new(d.hold_ms)), true)
            .await?;
        self.detectors
            .register(Box::new(KeyboardDetector::new()), true)
            .await?;
        self.detectors
            .register(
                Box::new(ShakeDetector::new(
                    d.shake_threshold,
                    d.shake_min_gap_ms,
                    d.shake_decay_ms,
                    d.shakes_to_trigger,
                    motion_capable,
                )),
                settings.shake_enabled,
            )
            .await?;
        self.detectors
            .register(
                Box::new(VoiceDetector::new(
                    d.voice_retry_short_ms,
                    d.voice_retry_long_ms,
                    d.voice_restart_ms,
                    d.voice_resume_ms,
                    speech_capable,
                )),
                settings.voice_enabled,
            )
            .await?;
        Ok(())
    }

    // Service-card taps arrive as raw input events; forward each one to
    // the arbiter as a trigger for the tapped number.
    fn spawn_service_card_forwarder(&self) {
        let bus = self.bus.clone();
        let mut inputs = self.bus.subscribe_inputs();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok(input) = inputs.recv() => {
                        if let InputEvent::ServiceCard { number } = input {
                            bus.publish_trigger(Trigger::new(&number, TriggerSource::ServiceButton));
                        }
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    fn spawn_state_tracker(&self) {
        let state = self.state.clone();
        let mut triggers = self.bus.subscribe_triggers();
        let mut emergencies = self.bus.subscribe_emergencies();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok(trigger) = triggers.recv() => {
                        let mut s = state.write();
                        s.total_triggers += 1;
                        s.last_trigger = Some(trigger.at);
                    }
                    Ok(_) = emergencies.recv() => {
                        state.write().total_emergencies += 1;
                    }
                    _ = shutdown.recv() => break,
                }
            }
        });
    }

    /// Signal every task to stop and wait for the detectors to finish
    pub async fn shutdown(&self) {
        info!("Shutting down engine...");
        self.state.write().running = false;
        let _ = self.shutdown.send(());
        self.detectors.join().await;
        info!("Engine stopped");
    }

    /// Status snapshot, including per-detector health
    pub async fn status(&self) -> (SystemState, Vec<DetectorHealth>) {
        let mut state = self.state.read().clone();
        state.detectors_active = self.detectors.active_count().await;
        (state, self.detectors.all_health().await)
    }

    /// Flip a detector toggle and persist the matching setting
    pub async fn set_detector_enabled(&self, kind: DetectorKind, enabled: bool) {
        self.detectors.set_enabled(kind, enabled).await;
        match kind {
            DetectorKind::Voice => {
                self.settings.update(|s| s.voice_enabled = enabled);
            }
            DetectorKind::Shake => {
                self.settings.update(|s| s.shake_enabled = enabled);
            }
            _ => {}
        }
    }

    /// Contacts store handle
    pub fn contacts(&self) -> Arc<ContactsStore> {
        self.contacts.clone()
    }

    /// Settings store handle
    pub fn settings(&self) -> Arc<SettingsStore> {
        self.settings.clone()
    }

    /// Emergency log handle
    pub fn events(&self) -> Arc<EventLog> {
        self.log.clone()
    }

    /// Confirm/cancel surface for a UI layer
    pub fn commands(&self) -> mpsc::Sender<ArbiterCommand> {
        self.commands.clone()
    }

    /// Event bus handle
    pub fn bus(&self) -> Arc<EventBus> {
        self.bus.clone()
    }

    /// Most recent location fix, if tracking is active
    pub fn last_location(&self) -> Option<crate::location::LocationSample> {
        *self.location.read()
    }

    /// Toggle location tracking
    pub fn set_location_enabled(&self, enabled: bool) {
        self.tracker.set_enabled(enabled);
        self.settings.update(|s| s.location_enabled = enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::DetectorStatus;

    fn demo_config() -> Config {
        let mut config = Config::default();
        config.demo_mode = true;
        config.storage.path = std::env::temp_dir()
            .join(format!("raksha-engine-{}", uuid::Uuid::new_v4()))
            .join("kv");
        config
    }

    #[tokio::test]
    async fn test_engine_starts_all_detectors_in_demo_mode() {
        let engine = Engine::new(demo_config()).unwrap();
        engine.start().await.unwrap();
        // Detector tasks publish their status asynchronously.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        let (state, health) = engine.status().await;
        assert!(state.running);
        assert_eq!(health.len(), 4);
        assert_eq!(state.detectors_active, 4);

        engine.shutdown().await;
        let (state, _) = engine.status().await;
        assert!(!state.running);
    }

    #[tokio::test]
    async fn test_motion_and_speech_unsupported_outside_demo_mode() {
        let mut config = demo_config();
        config.demo_mode = false;
        let engine = Engine::new(config).unwrap();
        engine.start().await.unwrap();

        let (_, health) = engine.status().await;
        let unsupported: Vec<_> = health
            .iter()
            .filter(|h| h.status == DetectorStatus::Unsupported)
            .map(|h| h.kind)
            .collect();
        assert!(unsupported.contains(&DetectorKind::Shake));
        assert!(unsupported.contains(&DetectorKind::Voice));

        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_service_card_tap_becomes_service_button_trigger() {
        let engine = Engine::new(demo_config()).unwrap();
        engine.start().await.unwrap();

        let mut triggers = engine.bus().subscribe_triggers();
        engine.bus().publish_input(InputEvent::ServiceCard {
            number: "1091".to_string(),
        });

        let trigger =
            tokio::time::timeout(std::time::Duration::from_secs(1), triggers.recv())
                .await
                .expect("forwarder timed out")
                .unwrap();
        assert_eq!(trigger.number, "1091");
        assert_eq!(trigger.source, TriggerSource::ServiceButton);

        engine.shutdown().await;
    }
}
