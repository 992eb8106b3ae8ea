use super::VoiceActivityDetector;

/// RMS-energy voice activity detector.
///
/// Sensitivity follows the 1–3 convention of WebRTC-style VADs: 1 is
/// permissive (quiet speech still counts), 3 is strict (only clearly
/// voiced frames count).
pub struct EnergyVad {
    threshold: f32,
}

impl EnergyVad {
    pub fn new(sensitivity: u8) -> Self {
        let threshold = match sensitivity.clamp(1, 3) {
            1 => 0.010,
            2 => 0.020,
            _ => 0.040,
        };
        Self { threshold }
    }

    /// RMS of a PCM16 frame, normalized to [0, 1].
    pub fn rms(frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = frame
            .iter()
            .map(|&s| {
                let f = s as f64 / 32768.0;
                f * f
            })
            .sum();
        (sum_squares / frame.len() as f64).sqrt() as f32
    }
}

impl VoiceActivityDetector for EnergyVad {
    fn is_speech(&mut self, frame: &[i16]) -> bool {
        Self::rms(frame) > self.threshold
    }
}
