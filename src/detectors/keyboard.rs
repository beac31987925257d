// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Keyboard chord detector
//!
//! Ctrl+Shift+E triggers the emergency workflow. Escape is reserved for
//! cancel and only acts while a modal surface is open.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;

use super::{Detector, DetectorContext, DetectorKind, DetectorStatus, InputEvent, TriggerSource};
use crate::GENERAL_EMERGENCY;

/// What a key press resolved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// Fire the emergency chord
    Trigger,
    /// Cancel the open confirmation
    Cancel,
}

/// Pure chord matcher
#[derive(Debug, Default)]
pub struct ChordTracker {
    modal_open: bool,
}

impl ChordTracker {
    /// Create a tracker with no modal open
    pub fn new() -> Self {
        Self::default()
    }

    /// Track whether a modal surface is open
    pub fn set_modal_open(&mut self, open: bool) {
        self.modal_open = open;
    }

    /// Resolve one key press
    pub fn handle(&self, ctrl: bool, shift: bool, key: &str) -> Option<KeyAction> {
        if ctrl && shift && key.eq_ignore_ascii_case("e") {
            return Some(KeyAction::Trigger);
        }
        if key == "Escape" && self.modal_open {
            return Some(KeyAction::Cancel);
        }
        None
    }
}

/// Keyboard detector driver
pub struct KeyboardDetector {
    id: String,
    tracker: ChordTracker,
}

impl KeyboardDetector {
    /// Create the keyboard detector
    pub fn new() -> Self {
        Self {
            id: "keyboard-1".to_string(),
            tracker: ChordTracker::new(),
        }
    }
}

impl Default for KeyboardDetector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Detector for KeyboardDetector {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Keyboard
    }

    async fn run(
        &mut self,
        mut ctx: DetectorContext,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        ctx.set_status(if ctx.is_enabled() {
            DetectorStatus::Listening
        } else {
            DetectorStatus::Disabled
        });

        loop {
            tokio::select! {
                event = ctx.inputs.recv() => match event {
                    Ok(InputEvent::Key { ctrl, shift, key }) => {
                        match self.tracker.handle(ctrl, shift, &key) {
                            Some(KeyAction::Trigger) if ctx.is_enabled() => {
                                ctx.fire(GENERAL_EMERGENCY, TriggerSource::Keyboard);
                            }
                            // Escape-cancel works even when the chord
                            // trigger is disabled in settings.
                            Some(KeyAction::Cancel) => ctx.request_cancel().await,
                            _ => {}
                        }
                    }
                    Ok(InputEvent::ModalOpened) => self.tracker.set_modal_open(true),
                    Ok(InputEvent::ModalClosed) => self.tracker.set_modal_open(false),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Keyboard detector lagged {} input events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
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
    fn test_chord_matches() {
        let tracker = ChordTracker::new();
        assert_eq!(tracker.handle(true, true, "E"), Some(KeyAction::Trigger));
        assert_eq!(tracker.handle(true, true, "e"), Some(KeyAction::Trigger));
        assert_eq!(tracker.handle(true, false, "E"), None);
        assert_eq!(tracker.handle(false, true, "E"), None);
        assert_eq!(tracker.handle(true, true, "F"), None);
    }

    #[test]
    fn test_escape_only_cancels_with_modal_open() {
        let mut tracker = ChordTracker::new();
        assert_eq!(tracker.handle(false, false, "Escape"), None);

        tracker.set_modal_open(true);
        assert_eq!(
            tracker.handle(false, false, "Escape"),
            Some(KeyAction::Cancel)
        );

        tracker.set_modal_open(false);
        assert_eq!(tracker.handle(false, false, "Escape"), None);
    }
}
