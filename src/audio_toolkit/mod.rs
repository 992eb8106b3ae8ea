pub mod audio;
pub mod vad;

pub use audio::{AudioCapture, AudioEvent};
pub use vad::{EnergyVad, SmoothedVad, Utterance, VoiceActivityDetector, VoiceActivitySegmenter};
