// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Contact notification
//!
//! Composes the emergency alert message sent to every stored contact:
//! service name, local timestamp, and a map link from the location
//! snapshot. There is no SMS transport, so delivery is simulated, but
//! the full per-contact composition happens regardless, since that is
//! the contract everything downstream (and the test suite) relies on.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::EmergencyEvent;
use crate::store::Contact;

/// Map an emergency number to its service name
pub fn service_name(number: &str) -> &'static str {
    match number {
        "100" => "Police",
        "101" => "Fire Brigade",
        "102" => "Ambulance",
        "112" => "Emergency Services",
        "1091" => "Women Helpline",
        "1098" => "Child Helpline",
        _ => "Emergency Service",
    }
}

/// Build a maps link for a location snapshot
pub fn maps_link(latitude: f64, longitude: f64) -> String {
    format!("https://maps.google.com/maps?q={},{}", latitude, longitude)
}

/// Compose the alert message for one emergency event
pub fn compose_alert(user_name: &str, event: &EmergencyEvent) -> String {
    let location_line = match &event.location {
        Some(loc) => format!(
            "Location: {} (Accuracy: {:.0}m)",
            maps_link(loc.latitude, loc.longitude),
            loc.accuracy
        ),
        None => "Location: Not available".to_string(),
    };

    let local_time = event
        .timestamp
        .with_timezone(&chrono::Local)
        .format("%d/%m/%Y, %I:%M:%S %p");

    format!(
        "🚨 EMERGENCY ALERT from {user}\n\n\
         I need immediate help! Emergency services have been contacted.\n\n\
         Service Called: {service} ({number})\n\
         Time: {time}\n\n\
         {location}\n\n\
         This is an automated message from Raksha Emergency App.",
        user = user_name,
        service = service_name(&event.number),
        number = event.number,
        time = local_time,
        location = location_line,
    )
}

/// Outcome of a notification attempt
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    /// The composed message body
    pub message: String,
    /// (name, phone) of every contact the message was addressed to
    pub recipients: Vec<(String, String)>,
}

/// Best-effort contact notification
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Compose and deliver the alert to every contact
    async fn notify(
        &self,
        event: &EmergencyEvent,
        contacts: &[Contact],
        user_name: &str,
    ) -> Result<DeliveryReport>;
}

/// Simulated SMS delivery: composes the real message set and logs what
/// would have been sent
pub struct SmsSimulator;

#[async_trait]
impl Notifier for SmsSimulator {
    async fn notify(
        &self,
        event: &EmergencyEvent,
        contacts: &[Contact],
        user_name: &str,
    ) -> Result<DeliveryReport> {
        let message = compose_alert(user_name, event);

        let mut recipients = Vec::with_capacity(contacts.len());
        for contact in contacts {
            info!(
                "Would send SMS to {} ({}): emergency alert for {}",
                contact.name,
                contact.phone,
                service_name(&event.number)
            );
            recipients.push((contact.name.clone(), contact.phone.clone()));
        }

        if recipients.is_empty() {
            info!("No emergency contacts to notify");
        }

        Ok(DeliveryReport {
            message,
            recipients,
        })
    }
}

/// OS-level alert payload with call/dismiss actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushPayload {
    /// Alert title
    pub title: String,
    /// Alert body
    pub body: String,
    /// Opaque payload forwarded to the action handler
    pub data: serde_json::Value,
}

/// Actions attached to an emergency push alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PushAction {
    /// Open the app and place the call
    Call,
    /// Close the alert
    Dismiss,
}

impl PushPayload {
    /// Build the payload for an emergency event
    pub fn for_event(event: &EmergencyEvent) -> Self {
        Self {
            title: format!("Emergency call to {}", event.number),
            body: "Emergency contacts notified. Help is on the way.".to_string(),
            data: serde_json::json!({
                "number": event.number,
                "source": event.source.label(),
            }),
        }
    }

    /// The two actions every emergency alert carries
    pub fn actions() -> [PushAction; 2] {
        [PushAction::Call, PushAction::Dismiss]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detectors::TriggerSource;
    use crate::location::LocationSample;
    use crate::store::Relation;
    use chrono::Utc;

    fn mom() -> Contact {
        Contact {
            id: 1,
            name: "Mom".to_string(),
            phone: "+911234567890".to_string(),
            relation: Relation::Family,
            added_at: Utc::now(),
        }
    }

    #[test]
    fn test_service_table() {
        assert_eq!(service_name("100"), "Police");
        assert_eq!(service_name("101"), "Fire Brigade");
        assert_eq!(service_name("102"), "Ambulance");
        assert_eq!(service_name("112"), "Emergency Services");
        assert_eq!(service_name("1091"), "Women Helpline");
        assert_eq!(service_name("1098"), "Child Helpline");
        assert_eq!(service_name("999"), "Emergency Service");
    }

    #[tokio::test]
    async fn test_ambulance_alert_composition() {
        let location = LocationSample {
            latitude: 28.6,
            longitude: 77.2,
            accuracy: 10.0,
            timestamp: Utc::now(),
        };
        let event = EmergencyEvent::new("102", TriggerSource::ServiceButton, Some(location), 1);

        let report = SmsSimulator
            .notify(&event, &[mom()], "Raksha User")
            .await
            .unwrap();

        assert!(report.message.contains("Ambulance"));
        assert!(report.message.contains("(102)"));
        assert!(report.message.contains("28.6,77.2"));
        assert_eq!(report.recipients.len(), 1);
        assert_eq!(report.recipients[0].1, "+911234567890");
    }

    #[tokio::test]
    async fn test_no_location_line() {
        let event = EmergencyEvent::new("112", TriggerSource::Hold, None, 1);
        let report = SmsSimulator
            .notify(&event, &[mom()], "Asha")
            .await
            .unwrap();

        assert!(report.message.contains("Location: Not available"));
        assert!(report.message.contains("EMERGENCY ALERT from Asha"));
    }

    #[tokio::test]
    async fn test_all_contacts_addressed() {
        let mut contacts = vec![mom()];
        contacts.push(Contact {
            id: 2,
            name: "Ravi".to_string(),
            phone: "+919876543210".to_string(),
            relation: Relation::Friend,
            added_at: Utc::now(),
        });

        let event = EmergencyEvent::new("100", TriggerSource::Voice, None, 2);
        let report = SmsSimulator
            .notify(&event, &contacts, "Asha")
            .await
            .unwrap();

        assert_eq!(report.recipients.len(), 2);
        assert!(report.message.contains("Police"));
    }

    #[test]
    fn test_push_payload_shape() {
        let event = EmergencyEvent::new("112", TriggerSource::Shake, None, 0);
        let payload = PushPayload::for_event(&event);

        assert_eq!(payload.title, "Emergency call to 112");
        assert_eq!(payload.data["source"], "Shake Detection");
        assert_eq!(
            PushPayload::actions(),
            [PushAction::Call, PushAction::Dismiss]
        );
    }
}
