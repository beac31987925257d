// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Input simulator for demo mode
//!
//! Produces scripted raw input events so the whole pipeline (detectors,
//! arbiter, notifier, hand-off) runs end-to-end with no real devices.

use rand::prelude::*;
use tokio::sync::broadcast;
use tokio::time::{sleep, Duration};
use tracing::info;

use super::{InputEvent, RecognitionError};

const DEMO_PHRASES: &[&str] = &[
    "what a nice day",
    "emergency help",
    "call police",
    "ambulance",
    "cancel",
];

/// Scripted input-event generator
pub struct InputSimulator {
    rng: StdRng,
    scenario_gap: Duration,
}

impl InputSimulator {
    /// Create a simulator that plays one scenario per `scenario_gap_secs`
    pub fn new(scenario_gap_secs: u64) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            scenario_gap: Duration::from_secs(scenario_gap_secs),
        }
    }

    /// Emit scenarios until shutdown
    pub async fn run(
        mut self,
        inputs: broadcast::Sender<InputEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Input simulator running");

        loop {
            tokio::select! {
                _ = sleep(self.scenario_gap) => {
                    self.play_scenario(&inputs).await;
                }
                _ = shutdown.recv() => break,
            }
        }
    }

    async fn play_scenario(&mut self, inputs: &broadcast::Sender<InputEvent>) {
        match self.rng.gen_range(0..7u32) {
            0 => {
                info!("Simulator: gentle motion");
                for _ in 0..5 {
                    let accel = [
                        self.rng.gen_range(-0.5..0.5),
                        self.rng.gen_range(-0.5..0.5),
                        9.8 + self.rng.gen_range(-0.2..0.2),
                    ];
                    let _ = inputs.send(InputEvent::Motion { accel });
                    sleep(Duration::from_millis(200)).await;
                }
            }
            1 => {
                info!("Simulator: shake burst");
                let mut sign = 1.0;
                for _ in 0..4 {
                    let _ = inputs.send(InputEvent::Motion {
                        accel: [18.0 * sign, 4.0 * sign, 9.8],
                    });
                    sign = -sign;
                    sleep(Duration::from_millis(600)).await;
                }
                self.maybe_cancel_later(inputs).await;
            }
            2 => {
                info!("Simulator: accidental tap (released early)");
                let _ = inputs.send(InputEvent::ButtonDown);
                sleep(Duration::from_millis(800)).await;
                let _ = inputs.send(InputEvent::ButtonUp);
            }
            3 => {
                info!("Simulator: sustained SOS hold");
                let _ = inputs.send(InputEvent::ButtonDown);
                sleep(Duration::from_millis(3200)).await;
                let _ = inputs.send(InputEvent::ButtonUp);
                self.maybe_cancel_later(inputs).await;
            }
            4 => {
                let phrase = DEMO_PHRASES[self.rng.gen_range(0..DEMO_PHRASES.len())];
                info!("Simulator: utterance \"{}\"", phrase);
                let _ = inputs.send(InputEvent::Transcript(phrase.to_string()));
                if phrase != "cancel" {
                    self.maybe_cancel_later(inputs).await;
                }
            }
            5 => {
                let number = ["100", "101", "102", "1091"]
                    [self.rng.gen_range(0..4usize)];
                info!("Simulator: service card tap ({})", number);
                let _ = inputs.send(InputEvent::ServiceCard {
                    number: number.to_string(),
                });
                self.maybe_cancel_later(inputs).await;
            }
            _ => {
                info!("Simulator: recognition hiccup");
                let _ = inputs.send(InputEvent::RecognitionFailed(RecognitionError::NoSpeech));
                sleep(Duration::from_millis(1500)).await;
                let _ = inputs.send(InputEvent::RecognitionEnded);
            }
        }
    }

    // Half the time, cancel the confirmation mid-countdown so the demo
    // shows both outcomes.
    async fn maybe_cancel_later(&mut self, inputs: &broadcast::Sender<InputEvent>) {
        if self.rng.gen_bool(0.5) {
            sleep(Duration::from_secs(3)).await;
            let _ = inputs.send(InputEvent::Key {
                ctrl: false,
                shift: false,
                key: "Escape".to_string(),
            });
        }
    }
}
