// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Emergency arbiter
//!
//! The single state machine between any trigger and an actual call:
//! `Idle -> Confirming -> Calling -> Idle`, with cancel available until
//! the countdown runs out. A new trigger always replaces whatever is in
//! flight (fire-again semantics, never queued). The transition logic is
//! a pure effect-emitting core (`ConfirmFlow`); the surrounding driver
//! owns the timers, the notifier, and the telephony hand-off.
//!
//! The one hard invariant lives here: once confirmed, neither a failed
//! notification nor a telephony error may stop the hand-off from being
//! attempted.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::time::{interval, sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::config::ArbiterConfig;
use crate::core::{EmergencyEvent, EventBus};
use crate::detectors::{InputEvent, Trigger, TriggerSource};
use crate::location::SharedLocation;
use crate::notify::{service_name, Notifier};
use crate::store::{ContactsStore, EventLog, SettingsStore};

/// Haptic pattern fired when a trigger opens the confirmation surface
pub const TRIGGER_HAPTIC: &[u64] = &[200, 100, 200, 100, 200];

/// Requests the UI or a detector can make of the arbiter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArbiterCommand {
    /// Confirm the in-flight trigger immediately
    Confirm,
    /// Abort the in-flight trigger
    Cancel,
}

/// Arbiter state, one at a time, never persisted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArbiterState {
    /// Nothing in flight
    Idle,
    /// Confirmation surface open, counting down
    Confirming {
        /// Target number
        number: String,
        /// Where the trigger came from
        source: TriggerSource,
        /// Seconds left before auto-confirm
        remaining_secs: u8,
    },
    /// Notification and hand-off in progress
    Calling {
        /// Target number
        number: String,
    },
}

/// Side effects the pure core asks the driver to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Fire a vibration pattern
    HapticPulse(&'static [u64]),
    /// Open (or re-render) the confirmation surface
    OpenConfirmation {
        /// Target number
        number: String,
        /// Trigger source shown to the user
        source: TriggerSource,
        /// Countdown start value
        countdown_secs: u8,
    },
    /// One second elapsed on the countdown
    CountdownTick {
        /// Seconds left
        remaining_secs: u8,
    },
    /// Close the confirmation surface
    CloseConfirmation,
    /// Begin the notify-then-dial sequence
    StartCall {
        /// Target number
        number: String,
        /// Trigger source for the emergency record
        source: TriggerSource,
    },
}

/// Pure confirmation/countdown state machine
#[derive(Debug)]
pub struct ConfirmFlow {
    countdown_secs: u8,
    state: ArbiterState,
}

impl ConfirmFlow {
    /// Create an idle flow with the given countdown length
    pub fn new(countdown_secs: u8) -> Self {
        Self {
            countdown_secs,
            state: ArbiterState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> &ArbiterState {
        &self.state
    }

    /// Accept a trigger. Always succeeds; an in-flight confirmation or
    /// call is silently replaced, never queued.
    pub fn trigger(&mut self, number: &str, source: TriggerSource) -> Vec<Effect> {
        self.state = ArbiterState::Confirming {
            number: number.to_string(),
            source,
            remaining_secs: self.countdown_secs,
        };
        vec![
            Effect::HapticPulse(TRIGGER_HAPTIC),
            Effect::OpenConfirmation {
                number: number.to_string(),
                source,
                countdown_secs: self.countdown_secs,
            },
        ]
    }

    /// One countdown tick. Reaching zero behaves exactly like an
    /// explicit confirm. Ticking outside `Confirming` is a no-op.
    pub fn tick(&mut self) -> Vec<Effect> {
        let remaining = match &mut self.state {
            ArbiterState::Confirming { remaining_secs, .. } => {
                *remaining_secs = remaining_secs.saturating_sub(1);
                *remaining_secs
            }
            _ => return Vec::new(),
        };

        if remaining == 0 {
            self.confirm()
        } else {
            vec![Effect::CountdownTick {
                remaining_secs: remaining,
            }]
        }
    }

    /// Confirm the in-flight trigger; a no-op unless confirming
    pub fn confirm(&mut self) -> Vec<Effect> {
        let (number, source) = match &self.state {
            ArbiterState::Confirming { number, source, .. } => (number.clone(), *source),
            _ => return Vec::new(),
        };

        self.state = ArbiterState::Calling {
            number: number.clone(),
        };
        vec![
            Effect::CloseConfirmation,
            Effect::StartCall { number, source },
        ]
    }

    /// Abort the in-flight confirmation. Idempotent: cancelling with
    /// nothing in flight is a no-op, and an in-progress call is not
    /// interrupted.
    pub fn cancel(&mut self) -> Vec<Effect> {
        match self.state {
            ArbiterState::Confirming { .. } => {
                self.state = ArbiterState::Idle;
                vec![Effect::CloseConfirmation]
            }
            _ => Vec::new(),
        }
    }

    /// The hand-off for `number` finished; return to idle unless a newer
    /// trigger already took over
    pub fn call_placed(&mut self, number: &str) {
        if matches!(&self.state, ArbiterState::Calling { number: n } if n == number) {
            self.state = ArbiterState::Idle;
        }
    }
}

/// Telephony hand-off seam. The engine never places a call itself; it
/// delegates to the platform's dialer via a `tel:` URI.
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Hand the number to the platform dialer
    async fn dial(&self, number: &str) -> Result<()>;
}

/// Logs the `tel:` URI that would be opened
pub struct TelUriHandoff;

#[async_trait]
impl Telephony for TelUriHandoff {
    async fn dial(&self, number: &str) -> Result<()> {
        info!("📞 Telephony hand-off: tel:{}", number);
        Ok(())
    }
}

/// Vibration sink
pub trait Haptics: Send + Sync {
    /// Fire a vibration pattern (milliseconds on/off)
    fn pulse(&self, pattern: &[u64]);
}

/// Logs vibration patterns
pub struct LogHaptics;

impl Haptics for LogHaptics {
    fn pulse(&self, pattern: &[u64]) {
        debug!("Haptic pulse: {:?}", pattern);
    }
}

/// Arbiter driver: owns the countdown timer and performs effects
pub struct Arbiter {
    config: ArbiterConfig,
    flow: parking_lot::Mutex<ConfirmFlow>,
    bus: Arc<EventBus>,
    notifier: Arc<dyn Notifier>,
    telephony: Arc<dyn Telephony>,
    haptics: Arc<dyn Haptics>,
    contacts: Arc<ContactsStore>,
    settings: Arc<SettingsStore>,
    log: Arc<EventLog>,
    location: SharedLocation,
    commands: AsyncMutex<mpsc::Receiver<ArbiterCommand>>,
}

impl Arbiter {
    /// Build the arbiter; the returned sender is the confirm/cancel
    /// surface handed to detectors and the UI
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ArbiterConfig,
        bus: Arc<EventBus>,
        notifier: Arc<dyn Notifier>,
        telephony: Arc<dyn Telephony>,
        haptics: Arc<dyn Haptics>,
        contacts: Arc<ContactsStore>,
        settings: Arc<SettingsStore>,
        log: Arc<EventLog>,
        location: SharedLocation,
    ) -> (Arc<Self>, mpsc::Sender<ArbiterCommand>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let arbiter = Arc::new(Self {
            flow: parking_lot::Mutex::new(ConfirmFlow::new(config.countdown_secs)),
            config,
            bus,
            notifier,
            telephony,
            haptics,
            contacts,
            settings,
            log,
            location,
            commands: AsyncMutex::new(cmd_rx),
        });
        (arbiter, cmd_tx)
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ArbiterState {
        self.flow.lock().state().clone()
    }

    /// Process triggers, commands, and countdown ticks until shutdown
    pub async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        info!("Starting emergency arbiter...");

        let mut triggers = self.bus.subscribe_triggers();
        let mut commands = self.commands.lock().await;
        let mut tick = interval(Duration::from_millis(self.config.tick_interval_ms));

        loop {
            tokio::select! {
                Ok(trigger) = triggers.recv() => {
                    self.clone().on_trigger(trigger).await;
                }
                Some(cmd) = commands.recv() => {
                    let effects = match cmd {
                        ArbiterCommand::Confirm => self.flow.lock().confirm(),
                        ArbiterCommand::Cancel => {
                            let effects = self.flow.lock().cancel();
                            if !effects.is_empty() {
                                info!("Emergency call cancelled");
                                self.bus.publish_alert("info", "Emergency cancelled");
                            }
                            effects
                        }
                    };
                    self.clone().apply(effects).await;
                }
                _ = tick.tick() => {
                    let effects = self.flow.lock().tick();
                    self.clone().apply(effects).await;
                }
                _ = shutdown.recv() => {
                    info!("Arbiter shutting down...");
                    break;
                }
            }
        }

        Ok(())
    }

    async fn on_trigger(self: Arc<Self>, trigger: Trigger) {
        {
            let flow = self.flow.lock();
            if !matches!(flow.state(), ArbiterState::Idle) {
                // Last-write-wins: the newest trigger supersedes
                // whatever was in confirmation.
                warn!(
                    "Trigger {} ({}) replaces in-flight {:?}",
                    trigger.number,
                    trigger.source,
                    flow.state()
                );
            }
        }

        info!("🚨 Emergency triggered: {} ({})", trigger.number, trigger.source);

        let event = EmergencyEvent::new(
            &trigger.number,
            trigger.source,
            *self.location.read(),
            self.contacts.count(),
        );
        self.log.append(&event);
        self.bus.publish_emergency(event);

        let effects = self.flow.lock().trigger(&trigger.number, trigger.source);
        self.apply(effects).await;
    }

    async fn apply(self: Arc<Self>, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::HapticPulse(pattern) => self.haptics.pulse(pattern),
                Effect::OpenConfirmation {
                    number,
                    countdown_secs,
                    ..
                } => {
                    info!(
                        "Calling {} ({}) in {}s unless cancelled",
                        service_name(&number),
                        number,
                        countdown_secs
                    );
                    self.bus.publish_input(InputEvent::ModalOpened);
                }
                Effect::CountdownTick { remaining_secs } => {
                    debug!("Countdown: {}s", remaining_secs);
                }
                Effect::CloseConfirmation => {
                    self.bus.publish_input(InputEvent::ModalClosed);
                }
                Effect::StartCall { number, source } => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.place_call(number, source).await;
                    });
                }
            }
        }
    }

    // Notify contacts, wait the hand-off delay, then dial. Notification
    // failure shortens the delay; it never prevents the dial.
    async fn place_call(self: Arc<Self>, number: String, source: TriggerSource) {
        info!("📞 Placing emergency call to {}", number);

        let contacts = self.contacts.list();
        let user_name = self.settings.load().user_name;
        let event = EmergencyEvent::new(&number, source, *self.location.read(), contacts.len());

        let delay = if contacts.is_empty() {
            Duration::from_millis(self.config.dial_delay_ms)
        } else {
            match self.notifier.notify(&event, &contacts, &user_name).await {
                Ok(report) => {
                    info!("Notified {} emergency contacts", report.recipients.len());
                    Duration::from_millis(self.config.dial_delay_ms)
                }
                Err(e) => {
                    warn!("Contact notification failed ({}); dialing anyway", e);
                    Duration::from_millis(self.config.notify_fallback_delay_ms)
                }
            }
        };

        sleep(delay).await;

        if let Err(e) = self.telephony.dial(&number).await {
            // Even a hand-off error must not poison arbiter state.
            error!("Telephony hand-off failed for {}: {}", number, e);
            self.bus.publish_error(1, &format!("hand-off failed: {}", e));
        }

        self.flow.lock().call_placed(&number);
        self.bus
            .publish_alert("info", &format!("Call to {} handed off", number));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArbiterConfig;
    use crate::store::{KvStore, Relation};
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ---- pure core ----

    #[test]
    fn test_trigger_opens_confirmation_with_haptic() {
        let mut flow = ConfirmFlow::new(10);
        let effects = flow.trigger("112", TriggerSource::Hold);

        assert_eq!(effects.len(), 2);
        assert!(matches!(effects[0], Effect::HapticPulse(_)));
        assert!(matches!(
            &effects[1],
            Effect::OpenConfirmation { number, countdown_secs: 10, .. } if number == "112"
        ));
        assert!(matches!(
            flow.state(),
            ArbiterState::Confirming { remaining_secs: 10, .. }
        ));
    }

    #[test]
    fn test_confirm_starts_call() {
        let mut flow = ConfirmFlow::new(10);
        flow.trigger("102", TriggerSource::ServiceButton);
        let effects = flow.confirm();

        assert_eq!(effects[0], Effect::CloseConfirmation);
        assert!(matches!(
            &effects[1],
            Effect::StartCall { number, .. } if number == "102"
        ));
        assert!(matches!(flow.state(), ArbiterState::Calling { .. }));
    }

    #[test]
    fn test_cancel_returns_to_idle() {
        let mut flow = ConfirmFlow::new(10);
        flow.trigger("112", TriggerSource::Shake);

        let effects = flow.cancel();
        assert_eq!(effects, vec![Effect::CloseConfirmation]);
        assert_eq!(*flow.state(), ArbiterState::Idle);

        // Cancelling again is a no-op, not an error.
        assert!(flow.cancel().is_empty());
        // Confirm after cancel does nothing either.
        assert!(flow.confirm().is_empty());
    }

    #[test]
    fn test_countdown_reaches_zero_after_ten_ticks() {
        let mut flow = ConfirmFlow::new(10);
        flow.trigger("112", TriggerSource::Keyboard);

        for expected in (1..10).rev() {
            let effects = flow.tick();
            assert_eq!(
                effects,
                vec![Effect::CountdownTick {
                    remaining_secs: expected
                }]
            );
        }

        // Tenth tick: zero-reach behaves exactly like confirm.
        let effects = flow.tick();
        assert!(effects.contains(&Effect::CloseConfirmation));
        assert!(matches!(
            effects.last(),
            Some(Effect::StartCall { number, .. }) if number == "112"
        ));
        assert!(matches!(flow.state(), ArbiterState::Calling { .. }));

        // Ticks while calling are no-ops.
        assert!(flow.tick().is_empty());
    }

    #[test]
    fn test_new_trigger_replaces_in_flight_confirmation() {
        let mut flow = ConfirmFlow::new(10);
        flow.trigger("100", TriggerSource::Voice);
        flow.tick();
        flow.tick();

        flow.trigger("102", TriggerSource::Voice);
        assert!(matches!(
            flow.state(),
            ArbiterState::Confirming { number, remaining_secs: 10, .. } if number == "102"
        ));
    }

    #[test]
    fn test_trigger_while_calling_fires_again() {
        let mut flow = ConfirmFlow::new(10);
        flow.trigger("112", TriggerSource::Hold);
        flow.confirm();
        assert!(matches!(flow.state(), ArbiterState::Calling { .. }));

        flow.trigger("112", TriggerSource::Hold);
        assert!(matches!(flow.state(), ArbiterState::Confirming { .. }));

        // The stale hand-off completion must not clobber the fresh
        // confirmation.
        flow.call_placed("112");
        assert!(matches!(flow.state(), ArbiterState::Confirming { .. }));
    }

    // ---- driver ----

    struct CountingNotifier {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn notify(
            &self,
            event: &EmergencyEvent,
            contacts: &[crate::store::Contact],
            user_name: &str,
        ) -> Result<crate::notify::DeliveryReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("simulated delivery failure");
            }
            crate::notify::SmsSimulator
                .notify(event, contacts, user_name)
                .await
        }
    }

    struct CountingTelephony {
        dials: parking_lot::Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Telephony for CountingTelephony {
        async fn dial(&self, number: &str) -> Result<()> {
            self.dials.lock().push(number.to_string());
            Ok(())
        }
    }

    struct Harness {
        bus: Arc<EventBus>,
        arbiter: Arc<Arbiter>,
        commands: mpsc::Sender<ArbiterCommand>,
        notifier: Arc<CountingNotifier>,
        telephony: Arc<CountingTelephony>,
        log: Arc<EventLog>,
        shutdown: broadcast::Sender<()>,
    }

    fn harness(fail_notify: bool) -> Harness {
        let config = ArbiterConfig {
            countdown_secs: 10,
            tick_interval_ms: 5,
            dial_delay_ms: 5,
            notify_fallback_delay_ms: 2,
            event_log_cap: 50,
        };
        let kv = Arc::new(KvStore::temporary());
        let contacts = Arc::new(ContactsStore::new(kv.clone()));
        contacts
            .add("Mom", "+911234567890", Relation::Family)
            .unwrap();

        let bus = Arc::new(EventBus::new(64));
        let notifier = Arc::new(CountingNotifier {
            calls: AtomicUsize::new(0),
            fail: fail_notify,
        });
        let telephony = Arc::new(CountingTelephony {
            dials: parking_lot::Mutex::new(Vec::new()),
        });
        let (shutdown, _) = broadcast::channel(1);
        let log = Arc::new(EventLog::new(kv.clone(), 50));

        let (arbiter, commands) = Arbiter::new(
            config,
            bus.clone(),
            notifier.clone(),
            telephony.clone(),
            Arc::new(LogHaptics),
            contacts,
            Arc::new(SettingsStore::new(kv)),
            log.clone(),
            crate::location::shared_slot(),
        );

        Harness {
            bus,
            arbiter,
            commands,
            notifier,
            telephony,
            log,
            shutdown,
        }
    }

    #[tokio::test]
    async fn test_trigger_appends_emergency_event_to_log() {
        let h = harness(false);
        let runner = tokio::spawn(h.arbiter.clone().run(h.shutdown.subscribe()));
        sleep(Duration::from_millis(10)).await;

        h.bus.publish_trigger(Trigger::new("102", TriggerSource::ServiceButton));
        sleep(Duration::from_millis(10)).await;

        // Logged at trigger time, before any confirm or cancel.
        let events = h.log.recent();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].number, "102");
        assert_eq!(events[0].source, TriggerSource::ServiceButton);
        // One contact stored in the harness.
        assert_eq!(events[0].contacts_notified, 1);

        h.commands.send(ArbiterCommand::Cancel).await.unwrap();
        sleep(Duration::from_millis(10)).await;
        // Cancelling does not retract the record.
        assert_eq!(h.log.recent().len(), 1);

        let _ = h.shutdown.send(());
        let _ = runner.await;
    }

    #[tokio::test]
    async fn test_trigger_confirm_notifies_once_and_dials_once() {
        let h = harness(false);
        let runner = tokio::spawn(h.arbiter.clone().run(h.shutdown.subscribe()));
        sleep(Duration::from_millis(10)).await;

        h.bus.publish_trigger(Trigger::new("102", TriggerSource::ServiceButton));
        sleep(Duration::from_millis(10)).await;
        h.commands.send(ArbiterCommand::Confirm).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*h.telephony.dials.lock(), vec!["102".to_string()]);
        assert_eq!(h.arbiter.state(), ArbiterState::Idle);

        let _ = h.shutdown.send(());
        let _ = runner.await;
    }

    #[tokio::test]
    async fn test_cancel_means_no_notification_and_no_dial() {
        let h = harness(false);
        let runner = tokio::spawn(h.arbiter.clone().run(h.shutdown.subscribe()));
        sleep(Duration::from_millis(10)).await;

        h.bus.publish_trigger(Trigger::new("112", TriggerSource::Hold));
        sleep(Duration::from_millis(10)).await;
        h.commands.send(ArbiterCommand::Cancel).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 0);
        assert!(h.telephony.dials.lock().is_empty());
        assert_eq!(h.arbiter.state(), ArbiterState::Idle);

        let _ = h.shutdown.send(());
        let _ = runner.await;
    }

    #[tokio::test]
    async fn test_notify_failure_never_blocks_the_dial() {
        let h = harness(true);
        let runner = tokio::spawn(h.arbiter.clone().run(h.shutdown.subscribe()));
        sleep(Duration::from_millis(10)).await;

        h.bus.publish_trigger(Trigger::new("100", TriggerSource::Voice));
        sleep(Duration::from_millis(10)).await;
        h.commands.send(ArbiterCommand::Confirm).await.unwrap();
        sleep(Duration::from_millis(50)).await;

        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*h.telephony.dials.lock(), vec!["100".to_string()]);

        let _ = h.shutdown.send(());
        let _ = runner.await;
    }

    #[tokio::test]
    async fn test_countdown_expiry_dials_without_explicit_confirm() {
        let h = harness(false);
        let runner = tokio::spawn(h.arbiter.clone().run(h.shutdown.subscribe()));
        sleep(Duration::from_millis(10)).await;

        h.bus.publish_trigger(Trigger::new("112", TriggerSource::Shake));
        // 10 ticks at 5 ms plus the dial delay.
        sleep(Duration::from_millis(150)).await;

        assert_eq!(h.notifier.calls.load(Ordering::SeqCst), 1);
        assert_eq!(*h.telephony.dials.lock(), vec!["112".to_string()]);

        let _ = h.shutdown.send(());
        let _ = runner.await;
    }
}
