// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Persistent key-value storage
//!
//! String keys, JSON-serialized values, backed by sled. A persistence
//! failure (open error, quota, corruption) degrades the store to
//! in-memory for the session with a logged warning; it is never surfaced
//! as a blocking error, because nothing in storage may ever stand between
//! the user and an emergency call.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::core::EmergencyEvent;

const KEY_SETTINGS: &str = "settings";
const KEY_CONTACTS: &str = "contacts";
const KEY_EVENTS: &str = "events";
const KEY_ONBOARDING: &str = "onboarding";

/// Store-layer errors surfaced to callers
#[derive(Debug, Error)]
pub enum StoreError {
    /// A contact with this phone number already exists
    #[error("phone number {0} is already added")]
    DuplicatePhone(String),

    /// The phone number failed shape validation
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// Name or phone was empty
    #[error("contact name and phone are required")]
    MissingField,

    /// Remove index out of range
    #[error("no contact at index {0}")]
    NoSuchContact(usize),
}

/// Key-value store with write-through memory overlay
pub struct KvStore {
    db: Option<sled::Db>,
    mem: RwLock<HashMap<String, serde_json::Value>>,
}

impl KvStore {
    /// Open the store at `path`. Failure to open degrades to a
    /// memory-only session rather than erroring.
    pub fn open(path: &Path) -> Self {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }

        let db = match sled::open(path) {
            Ok(db) => {
                info!("Store opened at {:?}", path);
                Some(db)
            }
            Err(e) => {
                warn!("Store unavailable ({}); running in-memory this session", e);
                None
            }
        };

        Self {
            db,
            mem: RwLock::new(HashMap::new()),
        }
    }

    /// In-memory store for tests and ephemeral sessions
    pub fn temporary() -> Self {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| warn!("Temporary store unavailable ({})", e))
            .ok();
        Self {
            db,
            mem: RwLock::new(HashMap::new()),
        }
    }

    /// Whether writes are actually reaching disk
    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    /// Read and deserialize a value. A corrupt entry is logged and
    /// treated as absent.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if let Some(value) = self.mem.read().get(key) {
            return match serde_json::from_value(value.clone()) {
                Ok(v) => Some(v),
                Err(e) => {
                    warn!("Discarding corrupt entry for '{}': {}", key, e);
                    None
                }
            };
        }

        let db = self.db.as_ref()?;
        let bytes = match db.get(key) {
            Ok(Some(v)) => v,
            Ok(None) => return None,
            Err(e) => {
                warn!("Read failed for '{}': {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(value) => {
                self.mem.write().insert(key.to_string(), value.clone());
                match serde_json::from_value(value) {
                    Ok(v) => Some(v),
                    Err(e) => {
                        warn!("Discarding corrupt entry for '{}': {}", key, e);
                        None
                    }
                }
            }
            Err(e) => {
                warn!("Discarding corrupt entry for '{}': {}", key, e);
                None
            }
        }
    }

    /// Serialize and write a value. Disk failures degrade to the memory
    /// overlay with a warning.
    pub fn put<T: Serialize>(&self, key: &str, value: &T) {
        let json = match serde_json::to_value(value) {
            Ok(v) => v,
            Err(e) => {
                warn!("Failed to serialize '{}': {}", key, e);
                return;
            }
        };

        self.mem.write().insert(key.to_string(), json.clone());

        if let Some(db) = &self.db {
            let bytes = json.to_string().into_bytes();
            if let Err(e) = db.insert(key, bytes) {
                warn!("Write failed for '{}'; kept in-memory only: {}", key, e);
            }
        }
    }

    /// Whether the onboarding carousel has been seen
    pub fn onboarding_seen(&self) -> bool {
        self.get::<bool>(KEY_ONBOARDING).unwrap_or(false)
    }

    /// Mark onboarding as seen
    pub fn set_onboarding_seen(&self) {
        self.put(KEY_ONBOARDING, &true);
    }
}

/// User-facing settings, persisted on every change
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Voice command detection on/off
    pub voice_enabled: bool,
    /// Shake detection on/off
    pub shake_enabled: bool,
    /// Location sharing on/off
    pub location_enabled: bool,
    /// Speech recognition language tag
    pub language: String,
    /// UI theme
    pub theme: String,
    /// Name embedded in emergency messages
    pub user_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            voice_enabled: true,
            shake_enabled: true,
            location_enabled: true,
            language: "en-IN".to_string(),
            theme: "light".to_string(),
            user_name: "Raksha User".to_string(),
        }
    }
}

/// Settings store: load merged over defaults, save whole blob
pub struct SettingsStore {
    kv: Arc<KvStore>,
}

impl SettingsStore {
    /// Wrap a key-value store
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    /// Load settings; missing fields fall back to defaults
    pub fn load(&self) -> Settings {
        self.kv.get(KEY_SETTINGS).unwrap_or_default()
    }

    /// Persist the whole settings blob
    pub fn save(&self, settings: &Settings) {
        self.kv.put(KEY_SETTINGS, settings);
    }

    /// Load, mutate, save; returns the new settings
    pub fn update(&self, f: impl FnOnce(&mut Settings)) -> Settings {
        let mut settings = self.load();
        f(&mut settings);
        self.save(&settings);
        settings
    }
}

/// Relationship of an emergency contact to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Relation {
    /// Family member
    Family,
    /// Friend
    Friend,
    /// Colleague
    Colleague,
    /// Neighbor
    Neighbor,
    /// Anything else
    Other,
}

impl std::str::FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "family" => Ok(Relation::Family),
            "friend" => Ok(Relation::Friend),
            "colleague" => Ok(Relation::Colleague),
            "neighbor" => Ok(Relation::Neighbor),
            "other" => Ok(Relation::Other),
            other => Err(format!("unknown relation: {}", other)),
        }
    }
}

/// An emergency contact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Millisecond timestamp at creation, doubling as identifier
    pub id: i64,
    /// Display name
    pub name: String,
    /// Phone number in the shape it was entered
    pub phone: String,
    /// Relationship to the user
    pub relation: Relation,
    /// When the contact was added
    pub added_at: DateTime<Utc>,
}

// 10-15 characters of digits, spaces, dashes, parentheses, after an
// optional leading '+'.
fn valid_phone(phone: &str) -> bool {
    let rest = phone.strip_prefix('+').unwrap_or(phone);
    let len = rest.chars().count();
    (10..=15).contains(&len)
        && rest
            .chars()
            .all(|c| c.is_ascii_digit() || c == ' ' || c == '-' || c == '(' || c == ')')
}

/// Ordered, unbounded contact list with phone-number uniqueness
pub struct ContactsStore {
    kv: Arc<KvStore>,
}

impl ContactsStore {
    /// Wrap a key-value store
    pub fn new(kv: Arc<KvStore>) -> Self {
        Self { kv }
    }

    /// All contacts in insertion order
    pub fn list(&self) -> Vec<Contact> {
        self.kv.get(KEY_CONTACTS).unwrap_or_default()
    }

    /// Number of stored contacts
    pub fn count(&self) -> usize {
        self.list().len()
    }

    /// Validate and append a contact
    pub fn add(&self, name: &str, phone: &str, relation: Relation) -> Result<Contact, StoreError> {
        let name = name.trim();
        let phone = phone.trim();

        if name.is_empty() || phone.is_empty() {
            return Err(StoreError::MissingField);
        }
        if !valid_phone(phone) {
            return Err(StoreError::InvalidPhone(phone.to_string()));
        }

        let mut contacts = self.list();
        if contacts.iter().any(|c| c.phone == phone) {
            return Err(StoreError::DuplicatePhone(phone.to_string()));
        }

        let now = Utc::now();
        let contact = Contact {
            id: now.timestamp_millis(),
            name: name.to_string(),
            phone: phone.to_string(),
            relation,
            added_at: now,
        };
        contacts.push(contact.clone());
        self.kv.put(KEY_CONTACTS, &contacts);

        info!("Added emergency contact: {} ({})", contact.name, contact.phone);
        Ok(contact)
    }

    /// Remove the contact at `index`
    pub fn remove(&self, index: usize) -> Result<Contact, StoreError> {
        let mut contacts = self.list();
        if index >= contacts.len() {
            return Err(StoreError::NoSuchContact(index));
        }
        let removed = contacts.remove(index);
        self.kv.put(KEY_CONTACTS, &contacts);
        info!("Removed emergency contact: {}", removed.name);
        Ok(removed)
    }
}

/// Capped, newest-first emergency event log
pub struct EventLog {
    kv: Arc<KvStore>,
    cap: usize,
}

impl EventLog {
    /// Wrap a key-value store with the given retention cap
    pub fn new(kv: Arc<KvStore>, cap: usize) -> Self {
        Self { kv, cap }
    }

    /// Prepend an event, evicting the oldest beyond the cap
    pub fn append(&self, event: &EmergencyEvent) {
        let mut events: Vec<EmergencyEvent> = self.kv.get(KEY_EVENTS).unwrap_or_default();
        events.insert(0, event.clone());
        events.truncate(self.cap);
        self.kv.put(KEY_EVENTS, &events);
    }

    /// All retained events, newest first
    pub fn recent(&self) -> Vec<EmergencyEvent> {
        self.kv.get(KEY_EVENTS).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::TriggerSource;

    fn kv() -> Arc<KvStore> {
        Arc::new(KvStore::temporary())
    }

    #[test]
    fn test_settings_merge_with_defaults() {
        let kv = kv();
        // A partial blob from an older version: only two fields present.
        kv.put(
            "settings",
            &serde_json::json!({"voice_enabled": false, "user_name": "Asha"}),
        );

        let settings = SettingsStore::new(kv).load();
        assert!(!settings.voice_enabled);
        assert_eq!(settings.user_name, "Asha");
        // Everything else fell back to defaults.
        assert!(settings.shake_enabled);
        assert_eq!(settings.language, "en-IN");
    }

    #[test]
    fn test_settings_update_persists() {
        let kv = kv();
        let store = SettingsStore::new(kv);

        store.update(|s| s.shake_enabled = false);
        assert!(!store.load().shake_enabled);
    }

    #[test]
    fn test_contact_duplicate_phone_rejected() {
        let store = ContactsStore::new(kv());
        store.add("Mom", "+911234567890", Relation::Family).unwrap();

        let err = store
            .add("Mother", "+911234567890", Relation::Family)
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicatePhone(_)));

        // Same name with a different number is fine.
        store.add("Mom", "+911234567891", Relation::Family).unwrap();
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_contact_phone_validation() {
        let store = ContactsStore::new(kv());

        assert!(matches!(
            store.add("A", "12345", Relation::Other),
            Err(StoreError::InvalidPhone(_))
        ));
        assert!(matches!(
            store.add("A", "not a phone number", Relation::Other),
            Err(StoreError::InvalidPhone(_))
        ));
        assert!(matches!(
            store.add("", "+911234567890", Relation::Other),
            Err(StoreError::MissingField)
        ));

        store.add("A", "(011) 2345-6789", Relation::Other).unwrap();
    }

    #[test]
    fn test_contact_remove_by_index() {
        let store = ContactsStore::new(kv());
        store.add("A", "+911234567890", Relation::Friend).unwrap();
        store.add("B", "+911234567891", Relation::Friend).unwrap();

        let removed = store.remove(0).unwrap();
        assert_eq!(removed.name, "A");
        assert_eq!(store.list()[0].name, "B");

        assert!(matches!(store.remove(5), Err(StoreError::NoSuchContact(5))));
    }

    #[test]
    fn test_event_log_caps_at_fifty() {
        let log = EventLog::new(kv(), 50);

        for i in 0..51 {
            let event = EmergencyEvent::new(
                &format!("10{}", i % 3),
                TriggerSource::Manual,
                None,
                0,
            );
            log.append(&event);
        }

        let events = log.recent();
        assert_eq!(events.len(), 50);
        // Newest first; the very first insert fell off the end.
        assert_eq!(events[0].number, "102");
    }

    #[test]
    fn test_onboarding_flag() {
        let kv = kv();
        assert!(!kv.onboarding_seen());
        kv.set_onboarding_seen();
        assert!(kv.onboarding_seen());
    }

    #[test]
    fn test_corrupt_entry_treated_as_absent() {
        let kv = kv();
        kv.put("contacts", &"definitely not a contact list");
        let store = ContactsStore::new(kv);
        assert!(store.list().is_empty());
    }
}
