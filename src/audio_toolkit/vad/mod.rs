//! Per-frame voice activity classification.

mod energy;
mod segmenter;

pub use energy::EnergyVad;
pub use segmenter::{Utterance, VoiceActivitySegmenter};

use std::collections::VecDeque;

/// Binary speech/non-speech classifier for one 30 ms frame.
///
/// Implementations keep whatever internal state they need; calls arrive
/// from a single capture thread in frame order.
pub trait VoiceActivityDetector: Send {
    fn is_speech(&mut self, frame: &[i16]) -> bool;
}

/// Majority-vote smoothing over a small window of raw VAD decisions.
///
/// Evens out single-frame flickers from the underlying detector; the
/// segmenter's pre-roll and hangover handle everything longer.
pub struct SmoothedVad {
    inner: Box<dyn VoiceActivityDetector>,
    window: VecDeque<bool>,
    capacity: usize,
    trigger: usize,
}

impl SmoothedVad {
    /// `capacity` is the window length in frames, `trigger` how many
    /// speech votes within it count as speech.
    pub fn new(inner: Box<dyn VoiceActivityDetector>, capacity: usize, trigger: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            window: VecDeque::with_capacity(capacity),
            capacity,
            trigger: trigger.clamp(1, capacity),
        }
    }
}

impl VoiceActivityDetector for SmoothedVad {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        let raw = self.inner.is_speech(frame);
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(raw);
        self.window.iter().filter(|&&v| v).count() >= self.trigger
    }
}
