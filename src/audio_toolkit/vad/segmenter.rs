use log::debug;
use std::collections::VecDeque;
use std::time::Duration;

use super::VoiceActivityDetector;
use crate::settings::{SegmenterPolicy, FRAME_DURATION_MS, FRAME_SAMPLES};

/// One contiguous voiced segment, bounded by detected silence, ready for
/// recognition as a single unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub samples: Vec<i16>,
}

impl Utterance {
    pub fn frame_count(&self) -> usize {
        self.samples.len() / FRAME_SAMPLES
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.frame_count() as u64 * FRAME_DURATION_MS)
    }

    /// PCM16 little-endian byte view, the recognition boundary format.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.samples
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }
}

enum State {
    Silence,
    Speaking,
}

/// Assembles 30 ms frames into utterances.
///
/// Two states. In `Silence`, non-speech frames roll through a
/// fixed-capacity pre-roll ring so speech onset is never clipped; the
/// first speech frame seeds the utterance with that ring and flips to
/// `Speaking`. In `Speaking`, the closing condition depends on policy:
/// `Streak` requires a full hangover window of consecutive non-speech
/// frames (brief in-utterance pauses do not fragment the utterance),
/// `RingOnly` closes on the first non-speech frame.
pub struct VoiceActivitySegmenter {
    vad: Box<dyn VoiceActivityDetector>,
    state: State,
    policy: SegmenterPolicy,
    pre_roll: VecDeque<Vec<i16>>,
    hangover_frames: usize,
    min_utterance_frames: usize,
    utterance: Vec<i16>,
    speech_frames: usize,
    silence_streak: usize,
}

impl VoiceActivitySegmenter {
    pub fn new(
        vad: Box<dyn VoiceActivityDetector>,
        hangover_frames: usize,
        min_utterance_frames: usize,
        policy: SegmenterPolicy,
    ) -> Self {
        Self {
            vad,
            state: State::Silence,
            policy,
            pre_roll: VecDeque::with_capacity(hangover_frames.max(1)),
            hangover_frames: hangover_frames.max(1),
            min_utterance_frames: min_utterance_frames.max(1),
            utterance: Vec::new(),
            speech_frames: 0,
            silence_streak: 0,
        }
    }

    /// Feed one frame; returns a finished utterance when its closing
    /// silence was just detected.
    pub fn push_frame(&mut self, frame: Vec<i16>) -> Option<Utterance> {
        let is_speech = self.vad.is_speech(&frame);

        match self.state {
            State::Silence => {
                if is_speech {
                    self.state = State::Speaking;
                    self.silence_streak = 0;
                    self.speech_frames = 1;
                    // Seed with the pre-roll, oldest first.
                    for padded in self.pre_roll.drain(..) {
                        self.utterance.extend_from_slice(&padded);
                    }
                    self.utterance.extend_from_slice(&frame);
                } else {
                    if self.pre_roll.len() == self.hangover_frames {
                        self.pre_roll.pop_front();
                    }
                    self.pre_roll.push_back(frame);
                }
                None
            }
            State::Speaking => {
                if is_speech {
                    self.silence_streak = 0;
                    self.speech_frames += 1;
                    self.utterance.extend_from_slice(&frame);
                    return None;
                }

                self.silence_streak += 1;
                if matches!(self.policy, SegmenterPolicy::Streak) {
                    // Trailing silence doubles as post-roll.
                    self.utterance.extend_from_slice(&frame);
                    if self.silence_streak < self.hangover_frames {
                        return None;
                    }
                }
                self.close_utterance()
            }
        }
    }

    /// Close any in-progress utterance, for end-of-stream flushes. The
    /// minimum-length gate still applies.
    pub fn flush(&mut self) -> Option<Utterance> {
        match self.state {
            State::Silence => None,
            State::Speaking => self.close_utterance(),
        }
    }

    fn close_utterance(&mut self) -> Option<Utterance> {
        self.state = State::Silence;
        self.silence_streak = 0;
        self.pre_roll.clear();

        let samples = std::mem::take(&mut self.utterance);
        let speech_frames = std::mem::take(&mut self.speech_frames);

        if speech_frames < self.min_utterance_frames {
            debug!(
                "Discarding {}-frame segment below the {}-frame minimum",
                speech_frames, self.min_utterance_frames
            );
            return None;
        }

        Some(Utterance { samples })
    }
}
