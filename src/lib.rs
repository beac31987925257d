// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Raksha - Personal Safety Emergency Response Engine
//!
//! A cross-platform emergency response engine with:
//! - Four independent trigger detectors (hold, voice, shake, keyboard)
//! - A single confirmation/countdown arbiter in front of call placement
//! - Emergency-contact notification with location snapshots
//! - Offline-first asset caching
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Raksha Engine                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌────────────┐  │
//! │  │ Detector │→ │ Arbiter  │→ │ Notifier │→ │ Telephony  │  │
//! │  │ Manager  │  │          │  │          │  │ Hand-off   │  │
//! │  └──────────┘  └──────────┘  └──────────┘  └────────────┘  │
//! │       ↓             ↓             ↓                         │
//! │  ┌─────────────────────────────────────────────────────┐   │
//! │  │                    Event Bus                        │   │
//! │  └─────────────────────────────────────────────────────┘   │
//! │       ↓             ↓             ↓                         │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐                  │
//! │  │  Store   │  │ Location │  │ Offline  │                  │
//! │  │          │  │ Tracker  │  │ Cache    │                  │
//! │  └──────────┘  └──────────┘  └──────────┘                  │
//! └─────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod core;
pub mod detectors;
pub mod store;
pub mod location;
pub mod notify;
pub mod offline;
pub mod config;

// Re-exports for convenience
pub use crate::config::Config;
pub use crate::core::{EmergencyEvent, Engine, EventBus};
pub use crate::detectors::{Detector, DetectorManager, InputEvent, Trigger, TriggerSource};
pub use crate::location::LocationSample;
pub use crate::notify::{Notifier, SmsSimulator};
pub use crate::store::{Contact, KvStore, Relation, Settings};

/// Raksha version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Raksha name
pub const NAME: &str = "Raksha";

/// The general emergency number used by every detector that has no
/// service-specific target of its own.
pub const GENERAL_EMERGENCY: &str = "112";
