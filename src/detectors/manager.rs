// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Detector manager - registers detectors and runs each on its own task

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::{Detector, DetectorContext, DetectorHealth, DetectorKind, DetectorStatus};
use crate::core::arbiter::ArbiterCommand;
use crate::core::EventBus;

/// Manages all trigger detectors in the system
pub struct DetectorManager {
    bus: Arc<EventBus>,
    commands: mpsc::Sender<ArbiterCommand>,
    shutdown: broadcast::Sender<()>,
    health: RwLock<HashMap<String, Arc<parking_lot::RwLock<DetectorHealth>>>>,
    toggles: RwLock<HashMap<DetectorKind, Arc<AtomicBool>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DetectorManager {
    /// Create a manager wired to the event bus and arbiter command channel
    pub fn new(
        bus: Arc<EventBus>,
        commands: mpsc::Sender<ArbiterCommand>,
        shutdown: broadcast::Sender<()>,
    ) -> Self {
        Self {
            bus,
            commands,
            shutdown,
            health: RwLock::new(HashMap::new()),
            toggles: RwLock::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a detector and start it unless its input capability is
    /// absent on this device. Unsupported detectors stay registered so
    /// the status surface can show them, but never run.
    pub async fn register(&self, mut detector: Box<dyn Detector>, enabled: bool) -> Result<()> {
        let id = detector.id().to_string();
        let kind = detector.kind();

        let slot = Arc::new(parking_lot::RwLock::new(DetectorHealth::new(&id, kind)));
        self.health.write().await.insert(id.clone(), slot.clone());

        if !detector.supported() {
            slot.write().status = DetectorStatus::Unsupported;
            warn!("Detector {} ({:?}) unsupported on this device", id, kind);
            return Ok(());
        }

        let toggle = Arc::new(AtomicBool::new(enabled));
        self.toggles.write().await.insert(kind, toggle.clone());

        let ctx = DetectorContext {
            inputs: self.bus.subscribe_inputs(),
            triggers: self.bus.trigger_sender(),
            commands: self.commands.clone(),
            health: slot,
            enabled: toggle,
        };
        let shutdown = self.shutdown.subscribe();

        let task = tokio::spawn(async move {
            if let Err(e) = detector.run(ctx, shutdown).await {
                error!("Detector {} stopped with error: {}", detector.id(), e);
            }
        });
        self.tasks.lock().await.push(task);

        info!("Registered detector: {} ({:?})", id, kind);
        Ok(())
    }

    /// Flip a detector's settings toggle at runtime
    pub async fn set_enabled(&self, kind: DetectorKind, enabled: bool) {
        if let Some(toggle) = self.toggles.read().await.get(&kind) {
            toggle.store(enabled, Ordering::Relaxed);
        }
        let health = self.health.read().await;
        for slot in health.values() {
            let mut h = slot.write();
            if h.kind == kind && h.status != DetectorStatus::Unsupported {
                h.status = if enabled {
                    DetectorStatus::Listening
                } else {
                    DetectorStatus::Disabled
                };
            }
        }
        info!(
            "Detector {:?} {}",
            kind,
            if enabled { "enabled" } else { "disabled" }
        );
    }

    /// Snapshot of all detector health slots
    pub async fn all_health(&self) -> Vec<DetectorHealth> {
        let health = self.health.read().await;
        health.values().map(|slot| slot.read().clone()).collect()
    }

    /// Number of detectors currently listening
    pub async fn active_count(&self) -> usize {
        let health = self.health.read().await;
        health
            .values()
            .filter(|slot| slot.read().status == DetectorStatus::Listening)
            .count()
    }

    /// Wait for all detector tasks to finish after shutdown
    pub async fn join(&self) {
        let mut tasks = self.tasks.lock().await;
        for task in tasks.drain(..) {
            let _ = task.await;
        }
    }
}
