// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Core engine orchestration

pub mod arbiter;
pub mod engine;
pub mod event_bus;

pub use arbiter::{
    Arbiter, ArbiterCommand, ArbiterState, ConfirmFlow, Effect, Haptics, LogHaptics,
    TelUriHandoff, Telephony,
};
pub use engine::Engine;
pub use event_bus::{Event, EventBus, EventPayload, EventType};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::detectors::TriggerSource;
use crate::location::LocationSample;

/// One recorded emergency, as appended to the persistent log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmergencyEvent {
    /// Unique event id
    pub id: Uuid,
    /// The number that was (or would be) dialed
    pub number: String,
    /// Which detector or surface raised the trigger
    pub source: TriggerSource,
    /// When the trigger fired
    pub timestamp: DateTime<Utc>,
    /// Location snapshot at trigger time, if tracking was active
    pub location: Option<LocationSample>,
    /// How many contacts the alert was addressed to
    pub contacts_notified: usize,
}

impl EmergencyEvent {
    /// Record an emergency happening now
    pub fn new(
        number: &str,
        source: TriggerSource,
        location: Option<LocationSample>,
        contacts_notified: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            number: number.to_string(),
            source,
            timestamp: Utc::now(),
            location,
            contacts_notified,
        }
    }
}

/// Engine status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    /// Whether the engine loop is running
    pub running: bool,
    /// Detectors currently listening
    pub detectors_active: usize,
    /// Triggers raised since startup
    pub total_triggers: u64,
    /// Emergencies recorded since startup
    pub total_emergencies: u64,
    /// The most recent trigger, if any
    pub last_trigger: Option<DateTime<Utc>>,
}

impl Default for SystemState {
    fn default() -> Self {
        Self {
            running: false,
            detectors_active: 0,
            total_triggers: 0,
            total_emergencies: 0,
            last_trigger: None,
        }
    }
}
