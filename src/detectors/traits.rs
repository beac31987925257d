// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Detector traits and common types

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::core::arbiter::ArbiterCommand;

/// Detector kinds supported by Raksha
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorKind {
    /// Press-and-hold on the SOS button
    Hold,
    /// Continuous speech-command classification
    Voice,
    /// Accelerometer shake counting
    Shake,
    /// Keyboard chord
    Keyboard,
}

/// Detector operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorStatus {
    /// The required input capability is absent on this device
    Unsupported,
    /// Turned off in settings
    Disabled,
    /// Waiting for input
    Listening,
    /// Recoverable error, retrying
    Error,
}

/// Human-readable label for where a trigger came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerSource {
    /// SOS button held for the full arm window
    Hold,
    /// Spoken emergency command
    Voice,
    /// Repeated device shakes
    Shake,
    /// Keyboard chord
    Keyboard,
    /// Direct tap on a service card
    ServiceButton,
    /// Programmatic or CLI trigger
    Manual,
}

impl TriggerSource {
    /// The label recorded in the emergency log and shown to the user
    pub fn label(&self) -> &'static str {
        match self {
            TriggerSource::Hold => "SOS Hold",
            TriggerSource::Voice => "Voice Command",
            TriggerSource::Shake => "Shake Detection",
            TriggerSource::Keyboard => "Keyboard Shortcut",
            TriggerSource::ServiceButton => "Service Button",
            TriggerSource::Manual => "Manual",
        }
    }
}

impl std::fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// An intent to start the emergency workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// Target emergency number
    pub number: String,
    /// Which detector produced this trigger
    pub source: TriggerSource,
    /// When the trigger was raised
    pub at: DateTime<Utc>,
}

impl Trigger {
    /// Create a trigger stamped with the current time
    pub fn new(number: &str, source: TriggerSource) -> Self {
        Self {
            number: number.to_string(),
            source,
            at: Utc::now(),
        }
    }
}

/// Kinds of speech-recognition failure, retried with different backoffs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecognitionError {
    /// The session timed out without hearing anything
    NoSpeech,
    /// Any other recognition failure
    Other(String),
}

/// Raw input events delivered to detectors over the event bus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InputEvent {
    /// SOS button pressed (mouse down / touch start)
    ButtonDown,
    /// SOS button released
    ButtonUp,
    /// A service card was tapped, carrying its target number
    ServiceCard {
        /// Emergency number printed on the card
        number: String,
    },
    /// A key press with modifier state
    Key {
        /// Control held
        ctrl: bool,
        /// Shift held
        shift: bool,
        /// Key name, e.g. "E" or "Escape"
        key: String,
    },
    /// One accelerometer sample (including gravity), per-axis m/s²
    Motion {
        /// x/y/z acceleration
        accel: [f64; 3],
    },
    /// A finalized speech-to-text utterance
    Transcript(String),
    /// Speech recognition failed
    RecognitionFailed(RecognitionError),
    /// The speech recognition session ended
    RecognitionEnded,
    /// A modal surface opened (shake detection is suppressed)
    ModalOpened,
    /// The modal surface closed
    ModalClosed,
    /// The app returned to the foreground
    Resume,
}

/// Per-detector health counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectorHealth {
    /// Detector identifier
    pub id: String,
    /// Detector kind
    pub kind: DetectorKind,
    /// Current status
    pub status: DetectorStatus,
    /// Triggers fired since startup
    pub triggers_fired: u64,
    /// Recoverable errors since startup
    pub error_count: u64,
    /// Most recent error message
    pub last_error: Option<String>,
}

impl DetectorHealth {
    pub(crate) fn new(id: &str, kind: DetectorKind) -> Self {
        Self {
            id: id.to_string(),
            kind,
            status: DetectorStatus::Disabled,
            triggers_fired: 0,
            error_count: 0,
            last_error: None,
        }
    }
}

/// Everything a running detector is allowed to touch: its input stream,
/// the trigger sender, the arbiter command sender for cancel paths, and
/// its own health slot. Detectors have no other view of the system.
pub struct DetectorContext {
    /// Raw input events
    pub inputs: broadcast::Receiver<InputEvent>,
    /// Where triggers go
    pub triggers: broadcast::Sender<Trigger>,
    /// Cancel/confirm requests toward the arbiter
    pub commands: mpsc::Sender<ArbiterCommand>,
    /// This detector's health slot
    pub health: Arc<RwLock<DetectorHealth>>,
    /// Settings toggle for this detector
    pub enabled: Arc<AtomicBool>,
}

impl DetectorContext {
    /// Whether the settings toggle for this detector is on
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Fire a trigger and bump the health counter
    pub fn fire(&self, number: &str, source: TriggerSource) {
        let trigger = Trigger::new(number, source);
        debug!("Detector trigger: {} ({})", trigger.number, trigger.source);
        let _ = self.triggers.send(trigger);
        self.health.write().triggers_fired += 1;
    }

    /// Ask the arbiter to cancel any in-flight confirmation
    pub async fn request_cancel(&self) {
        let _ = self.commands.send(ArbiterCommand::Cancel).await;
    }

    /// Update the published status
    pub fn set_status(&self, status: DetectorStatus) {
        self.health.write().status = status;
    }

    /// Record a recoverable error
    pub fn record_error(&self, message: &str) {
        let mut health = self.health.write();
        health.status = DetectorStatus::Error;
        health.error_count += 1;
        health.last_error = Some(message.to_string());
    }
}

/// Trait for all trigger detectors
#[async_trait]
pub trait Detector: Send + Sync {
    /// Unique identifier
    fn id(&self) -> &str;

    /// Detector kind
    fn kind(&self) -> DetectorKind;

    /// Whether the input capability this detector needs exists on this
    /// device. Unsupported detectors are registered but never started.
    fn supported(&self) -> bool {
        true
    }

    /// Consume input events until shutdown, firing triggers through the
    /// context. Runs on its own task.
    async fn run(
        &mut self,
        ctx: DetectorContext,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<()>;
}
