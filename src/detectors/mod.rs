//! Detector module - independent emergency trigger sources

mod hold;
mod keyboard;
mod manager;
mod shake;
mod simulator;
mod traits;
mod voice;

pub use hold::{HoldDetector, HoldTracker};
pub use keyboard::{ChordTracker, KeyAction, KeyboardDetector};
pub use manager::DetectorManager;
pub use shake::{ShakeDetector, ShakeTracker};
pub use simulator::InputSimulator;
pub use traits::{
    Detector, DetectorContext, DetectorHealth, DetectorKind, DetectorStatus, InputEvent,
    RecognitionError, Trigger, TriggerSource,
};
pub use voice::{VoiceClassifier, VoiceCommand, VoiceDetector};
