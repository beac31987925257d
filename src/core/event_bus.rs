// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Event bus for inter-component communication

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::core::EmergencyEvent;
use crate::detectors::{InputEvent, Trigger};

/// Event types in the system
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventType {
    /// A trigger was raised
    Trigger,
    /// An emergency event was recorded
    Emergency,
    /// Human-readable status alert
    Alert,
    /// Component error
    Error,
}

/// Generic event wrapper
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic event id
    pub id: u64,
    /// Category
    pub event_type: EventType,
    /// When the event was published
    pub timestamp: DateTime<Utc>,
    /// Event data
    pub payload: EventPayload,
}

/// Payloads carried on the wrapped event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// A raised trigger
    Trigger(Trigger),
    /// A recorded emergency
    Emergency(EmergencyEvent),
    /// Status alert
    Alert {
        /// Severity label
        level: String,
        /// Message text
        message: String,
    },
    /// Component error
    Error {
        /// Error code
        code: u32,
        /// Message text
        message: String,
    },
}

/// Central event bus for pub/sub communication
pub struct EventBus {
    input_tx: broadcast::Sender<InputEvent>,
    trigger_tx: broadcast::Sender<Trigger>,
    emergency_tx: broadcast::Sender<EmergencyEvent>,
    event_tx: broadcast::Sender<Event>,
    event_counter: std::sync::atomic::AtomicU64,
}

impl EventBus {
    /// Create a bus with the given channel capacity
    pub fn new(capacity: usize) -> Self {
        let (input_tx, _) = broadcast::channel(capacity);
        let (trigger_tx, _) = broadcast::channel(capacity);
        let (emergency_tx, _) = broadcast::channel(capacity);
        let (event_tx, _) = broadcast::channel(capacity);

        Self {
            input_tx,
            trigger_tx,
            emergency_tx,
            event_tx,
            event_counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Publish a raw input event to the detectors
    pub fn publish_input(&self, input: InputEvent) {
        let _ = self.input_tx.send(input);
    }

    /// Publish a trigger toward the arbiter
    pub fn publish_trigger(&self, trigger: Trigger) {
        let _ = self.trigger_tx.send(trigger.clone());
        self.publish_event(EventType::Trigger, EventPayload::Trigger(trigger));
    }

    /// Publish a recorded emergency event
    pub fn publish_emergency(&self, event: EmergencyEvent) {
        let _ = self.emergency_tx.send(event.clone());
        self.publish_event(EventType::Emergency, EventPayload::Emergency(event));
    }

    /// Publish a status alert
    pub fn publish_alert(&self, level: &str, message: &str) {
        self.publish_event(
            EventType::Alert,
            EventPayload::Alert {
                level: level.to_string(),
                message: message.to_string(),
            },
        );
    }

    /// Publish a component error
    pub fn publish_error(&self, code: u32, message: &str) {
        self.publish_event(
            EventType::Error,
            EventPayload::Error {
                code,
                message: message.to_string(),
            },
        );
    }

    fn publish_event(&self, event_type: EventType, payload: EventPayload) {
        let id = self
            .event_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        let event = Event {
            id,
            event_type,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.event_tx.send(event);
    }

    /// Sender handle detectors fire triggers through
    pub fn trigger_sender(&self) -> broadcast::Sender<Trigger> {
        self.trigger_tx.clone()
    }

    /// Sender handle input devices publish through
    pub fn input_sender(&self) -> broadcast::Sender<InputEvent> {
        self.input_tx.clone()
    }

    /// Subscribe to raw input events
    pub fn subscribe_inputs(&self) -> broadcast::Receiver<InputEvent> {
        self.input_tx.subscribe()
    }

    /// Subscribe to triggers
    pub fn subscribe_triggers(&self) -> broadcast::Receiver<Trigger> {
        self.trigger_tx.subscribe()
    }

    /// Subscribe to emergency events
    pub fn subscribe_emergencies(&self) -> broadcast::Receiver<EmergencyEvent> {
        self.emergency_tx.subscribe()
    }

    /// Subscribe to the wrapped event stream
    pub fn subscribe_events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}
