// Copyright (c) 2026 raksha project
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/raksha-app/raksha-rs

//! Voice command detector
//!
//! Finalized utterances are lower-cased and matched by substring
//! containment against five multilingual keyword sets, checked in a
//! fixed priority order: emergency > police > fire > ambulance > cancel.
//! Recognition errors back off (1 s after no-speech, 3 s otherwise) and
//! the session restarts automatically while voice stays enabled.

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, warn};

use super::{
    Detector, DetectorContext, DetectorKind, DetectorStatus, InputEvent, RecognitionError,
    TriggerSource,
};

/// Command categories a spoken utterance can resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceCommand {
    /// General emergency (112)
    Emergency,
    /// Police (100)
    Police,
    /// Fire brigade (101)
    Fire,
    /// Ambulance (102)
    Ambulance,
    /// Cancel an in-flight confirmation
    Cancel,
}

impl VoiceCommand {
    /// The emergency number this command dials, if any
    pub fn number(&self) -> Option<&'static str> {
        match self {
            VoiceCommand::Emergency => Some("112"),
            VoiceCommand::Police => Some("100"),
            VoiceCommand::Fire => Some("101"),
            VoiceCommand::Ambulance => Some("102"),
            VoiceCommand::Cancel => None,
        }
    }
}

// Keyword sets, English and Hindi. Matching is substring containment on
// the lower-cased transcript, so "please call police now" matches.
const EMERGENCY_KEYWORDS: &[&str] = &[
    "emergency help",
    "help me",
    "sos",
    "मदद करें",
    "बचाओ",
    "emergency",
    "help",
];
const POLICE_KEYWORDS: &[&str] = &["police", "पुलिस", "call police"];
const FIRE_KEYWORDS: &[&str] = &["fire", "आग", "fire brigade"];
const AMBULANCE_KEYWORDS: &[&str] = &["ambulance", "एम्बुलेंस", "medical"];
const CANCEL_KEYWORDS: &[&str] = &["cancel", "stop", "रद्द करें", "बंद करो"];

/// Pure transcript classifier
#[derive(Debug, Default)]
pub struct VoiceClassifier;

impl VoiceClassifier {
    /// Classify a finalized utterance; first matching category in
    /// priority order wins
    pub fn classify(&self, transcript: &str) -> Option<VoiceCommand> {
        let text = transcript.to_lowercase();
        let sets: [(&[&str], VoiceCommand); 5] = [
            (EMERGENCY_KEYWORDS, VoiceCommand::Emergency),
            (POLICE_KEYWORDS, VoiceCommand::Police),
            (FIRE_KEYWORDS, VoiceCommand::Fire),
            (AMBULANCE_KEYWORDS, VoiceCommand::Ambulance),
            (CANCEL_KEYWORDS, VoiceCommand::Cancel),
        ];

        for (keywords, command) in sets {
            if keywords.iter().any(|k| text.contains(k)) {
                return Some(command);
            }
        }
        None
    }
}

/// Voice detector driver
pub struct VoiceDetector {
    id: String,
    classifier: VoiceClassifier,
    retry_short: Duration,
    retry_long: Duration,
    restart: Duration,
    resume: Duration,
    supported: bool,
}

impl VoiceDetector {
    /// Create the voice detector; `supported` reflects whether a speech
    /// source exists on this device
    pub fn new(
        retry_short_ms: u64,
        retry_long_ms: u64,
        restart_ms: u64,
        resume_ms: u64,
        supported: bool,
    ) -> Self {
        Self {
            id: "voice-1".to_string(),
            classifier: VoiceClassifier,
            retry_short: Duration::from_millis(retry_short_ms),
            retry_long: Duration::from_millis(retry_long_ms),
            restart: Duration::from_millis(restart_ms),
            resume: Duration::from_millis(resume_ms),
            supported,
        }
    }
}

#[async_trait]
impl Detector for VoiceDetector {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> DetectorKind {
        DetectorKind::Voice
    }

    fn supported(&self) -> bool {
        self.supported
    }

    async fn run(
        &mut self,
        mut ctx: DetectorContext,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        // Utterances are dropped while not listening, matching a stopped
        // recognition session.
        let mut listening = true;
        let mut restart_at: Option<Instant> = None;

        ctx.set_status(if ctx.is_enabled() {
            DetectorStatus::Listening
        } else {
            DetectorStatus::Disabled
        });

        loop {
            let restart = async {
                match restart_at {
                    Some(t) => sleep_until(t).await,
                    None => futures::future::pending().await,
                }
            };

            tokio::select! {
                event = ctx.inputs.recv() => match event {
                    Ok(InputEvent::Transcript(text)) => {
                        if !listening || !ctx.is_enabled() {
                            continue;
                        }
                        debug!("Voice command: {}", text.trim());
                        match self.classifier.classify(&text) {
                            Some(VoiceCommand::Cancel) => ctx.request_cancel().await,
                            Some(command) => {
                                if let Some(number) = command.number() {
                                    ctx.fire(number, TriggerSource::Voice);
                                }
                            }
                            None => {}
                        }
                    }
                    Ok(InputEvent::RecognitionFailed(err)) => {
                        listening = false;
                        let delay = match &err {
                            RecognitionError::NoSpeech => self.retry_short,
                            RecognitionError::Other(msg) => {
                                warn!("Voice recognition error: {}", msg);
                                self.retry_long
                            }
                        };
                        ctx.record_error(&format!("{:?}", err));
                        restart_at = Some(Instant::now() + delay);
                    }
                    Ok(InputEvent::RecognitionEnded) => {
                        listening = false;
                        if ctx.is_enabled() {
                            restart_at = Some(Instant::now() + self.restart);
                        }
                    }
                    Ok(InputEvent::Resume) => {
                        if ctx.is_enabled() && !listening && restart_at.is_none() {
                            restart_at = Some(Instant::now() + self.resume);
                        }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Voice detector lagged {} input events", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                _ = restart => {
                    restart_at = None;
                    if ctx.is_enabled() {
                        listening = true;
                        ctx.set_status(DetectorStatus::Listening);
                        debug!("Voice recognition restarted");
                    }
                }
                _ = shutdown.recv() => break,
            }
        }

        Ok(())
    }
}
