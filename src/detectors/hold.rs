// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Press-and-hold detector for the SOS button
//!
//! A press arms a 3-second window; releasing before it expires cancels
//! silently, which debounces accidental taps. The timing core is a plain
//! millisecond-clock struct so it can be tested without a runtime.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::debug;

use super::{Detector, DetectorContext, DetectorKind, DetectorStatus, InputEvent, TriggerSource};
use crate::GENERAL_EMERGENCY;

/// Pure hold-timing state machine
#[derive(Debug)]
pub struct HoldTracker {
    hold_ms: u64,
    pressed_at: Option<u64>,
}

impl HoldTracker {
    /// Create a tracker with the given arm window
    pub fn new(hold_ms: u64) -> Self {
        Self {
            hold_ms,
            pressed_at: None,
        }
    }

    /// Button went down; re-pressing restarts the window
    pub fn press(&mut self, now_ms: u64) {
        self.pressed_at = Some(now_ms);
    }

    /// Button came up; any armed window is cancelled. Cancelling an
    /// already-idle tracker is a no-op.
    pub fn release(&mut self) {
        self.pressed_at = None;
    }

    /// Whether the button is currently down
    pub fn is_held(&self) -> bool {
        self.pressed_at.is_some()
    }

    /// Returns true exactly once when the button has stayed down for the
    /// full window. The press is consumed so a lingering hold cannot
    /// fire twice.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.pressed_at {
            Some(t) if now_ms.saturating_sub(t) >= self.hold_ms => {
                self.pressed_at = None;
                true
            }
            _ => false,
        }
    }
}

/// Hold detector driver
pub struct HoldDetector {
    id: String,
    hold_ms: u64,
}

impl HoldDetector {
    /// Create the hold detector
    pub fn new(hold_ms: u64) -> Self {
        Self {
            id: "hold-1".to_string(),
            hold_ms,
        }
    }
}

#[async_trait]
impl Detector for HoldDetector {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Hold
    }

    async fn run(
        &mut self,
        mut ctx: DetectorContext,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let epoch = Instant::now();
        let now_ms = |e: &Instant| e.elapsed().as_millis() as u64;

        let mut tracker = HoldTracker::new(self.hold_ms);
        let mut fire_at: Option<Instant> = None;

        ctx.set_status(if ctx.is_enabled() {
            DetectorStatus::Listening
        } else {
            DetectorStatus::Disabled
        });

        loop {
            let deadline = async {
                match fire_at {
                    Some(t) => sleep_until(t).await,
                    None => futures::future::pending().await,
                }
            };

            tokio::select! {
                event = ctx.inputs.recv() => match event {
                    Ok(InputEvent::ButtonDown) => {
                        if ctx.is_enabled() {
                            tracker.press(now_ms(&epoch));
                            fire_at = Some(Instant::now() + Duration::from_millis(self.hold_ms));
                        }
                    }
                    Ok(InputEvent::ButtonUp) => {
                        tracker.release();
                        fire_at = None;
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Hold detector lagged {} input events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = deadline => {
                    fire_at = None;
                    if tracker.poll(now_ms(&epoch)) {
                        ctx.fire(GENERAL_EMERGENCY, TriggerSource::Hold);
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_before_window_never_fires() {
        let mut tracker = HoldTracker::new(3000);

        tracker.press(0);
        assert!(!tracker.poll(2999));
        tracker.release();

        assert!(!tracker.poll(3000));
        assert!(!tracker.poll(10_000));
    }

    #[test]
    fn test_sustained_hold_fires_exactly_once() {
        let mut tracker = HoldTracker::new(3000);

        tracker.press(100);
        assert!(!tracker.poll(3099));
        assert!(tracker.poll(3100));
        // Consumed; a lingering hold does not fire again.
        assert!(!tracker.poll(9000));
    }

    #[test]
    fn test_repress_restarts_window() {
        let mut tracker = HoldTracker::new(3000);

        tracker.press(0);
        tracker.release();
        tracker.press(500);

        assert!(!tracker.poll(3000));
        assert!(tracker.poll(3500));
    }

    #[test]
    fn test_release_is_idempotent() {
        let mut tracker = HoldTracker::new(3000);
        tracker.release();
        tracker.release();
        assert!(!tracker.is_held());
    }
}
