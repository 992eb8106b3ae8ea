use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Audio frame duration used throughout the capture pipeline.
pub const FRAME_DURATION_MS: u64 = 30;

/// Sample rate every utterance is delivered at, regardless of device rate.
pub const PIPELINE_SAMPLE_RATE: u32 = 16_000;

/// Samples per mono frame at the pipeline rate.
pub const FRAME_SAMPLES: usize =
    (PIPELINE_SAMPLE_RATE as u64 * FRAME_DURATION_MS / 1000) as usize;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OcrMode {
    /// Merge all recognized text into a single caption.
    Aggregate,
    /// Keep per-line bounding boxes for in-place overlay patches.
    Patch,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Formality {
    Default,
    Formal,
    Informal,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ComputePreference {
    /// Prefer an accelerated device when one is present, else CPU.
    Auto,
    Cpu,
    Accelerated,
}

/// How the segmenter treats speech-internal pauses shorter than the
/// hangover window.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmenterPolicy {
    /// A single non-speech frame closes the utterance; the pre-roll ring
    /// only pads speech onset.
    RingOnly,
    /// Require a full hangover window of consecutive non-speech frames
    /// before closing, so brief pauses do not fragment an utterance.
    Streak,
}

/// Rectangle in screen coordinates.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = (self.x + self.width as i32).min(other.x + other.width as i32);
        let y2 = (self.y + self.height as i32).min(other.y + other.height as i32);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Rect::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32))
    }

    /// Union of two rectangles (smallest rect containing both).
    pub fn union(&self, other: &Rect) -> Rect {
        let x1 = self.x.min(other.x);
        let y1 = self.y.min(other.y);
        let x2 = (self.x + self.width as i32).max(other.x + other.width as i32);
        let y2 = (self.y + self.height as i32).max(other.y + other.height as i32);
        Rect::new(x1, y1, (x2 - x1) as u32, (y2 - y1) as u32)
    }
}

/// Settings consumed by the audio pipeline. The persistence format is
/// owned by the embedding application; this crate only reads the
/// deserialized struct.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AudioSettings {
    /// VAD aggressiveness, 1 (permissive) to 3 (strict).
    #[serde(default = "default_vad_sensitivity")]
    pub vad_sensitivity: u8,
    /// Trailing silence required to close an utterance.
    #[serde(default = "default_silence_threshold_secs")]
    pub silence_threshold_secs: f64,
    /// Utterances shorter than this are discarded as noise.
    #[serde(default = "default_min_utterance_secs")]
    pub min_utterance_secs: f64,
    #[serde(default = "default_segmenter_policy")]
    pub segmenter_policy: SegmenterPolicy,
    /// Preferred capture device name; `None` lets the resolver pick.
    #[serde(default)]
    pub preferred_device: Option<String>,
    /// Hint forwarded to the recognition engine ("auto" = detect).
    #[serde(default = "default_language_hint")]
    pub language_hint: String,
    /// Model size to transcribe with; falls back to any loaded model.
    #[serde(default = "default_model_size")]
    pub model_size: String,
}

impl AudioSettings {
    pub fn silence_hangover_frames(&self) -> usize {
        frames_for_secs(self.silence_threshold_secs)
    }

    pub fn min_utterance_frames(&self) -> usize {
        frames_for_secs(self.min_utterance_secs)
    }

    pub fn language_hint(&self) -> Option<&str> {
        if self.language_hint == "auto" || self.language_hint.trim().is_empty() {
            None
        } else {
            Some(&self.language_hint)
        }
    }
}

fn frames_for_secs(secs: f64) -> usize {
    ((secs * 1000.0) / FRAME_DURATION_MS as f64).round().max(1.0) as usize
}

/// Settings consumed by the screen pipeline.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ScreenSettings {
    /// Watched rectangle in screen coordinates.
    pub watch_rect: Rect,
    #[serde(default = "default_ocr_mode")]
    pub ocr_mode: OcrMode,
    /// OCR tokens at or below this confidence are discarded.
    #[serde(default = "default_ocr_confidence_floor")]
    pub ocr_confidence_floor: f32,
    /// Sampling interval in milliseconds.
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
    /// Histogram correlation at or above which two frames count as
    /// identical.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,
}

impl ScreenSettings {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }
}

/// Settings shared by both pipelines' translation stage.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct TranslationSettings {
    pub target_languages: Vec<String>,
    #[serde(default = "default_formality")]
    pub formality: Formality,
}

/// Which recognition models to preload at startup.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ModelSettings {
    #[serde(default = "default_model_sizes")]
    pub sizes: Vec<String>,
    #[serde(default = "default_compute_preference")]
    pub compute: ComputePreference,
}

fn default_vad_sensitivity() -> u8 {
    2
}

fn default_silence_threshold_secs() -> f64 {
    0.8
}

fn default_min_utterance_secs() -> f64 {
    0.3
}

fn default_segmenter_policy() -> SegmenterPolicy {
    SegmenterPolicy::Streak
}

fn default_language_hint() -> String {
    "auto".to_string()
}

fn default_model_size() -> String {
    "base".to_string()
}

fn default_ocr_mode() -> OcrMode {
    OcrMode::Aggregate
}

fn default_ocr_confidence_floor() -> f32 {
    50.0
}

fn default_sample_interval_ms() -> u64 {
    250
}

fn default_similarity_threshold() -> f64 {
    0.98
}

fn default_formality() -> Formality {
    Formality::Default
}

fn default_model_sizes() -> Vec<String> {
    vec!["base".to_string()]
}

fn default_compute_preference() -> ComputePreference {
    ComputePreference::Auto
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            vad_sensitivity: default_vad_sensitivity(),
            silence_threshold_secs: default_silence_threshold_secs(),
            min_utterance_secs: default_min_utterance_secs(),
            segmenter_policy: default_segmenter_policy(),
            preferred_device: None,
            language_hint: default_language_hint(),
            model_size: default_model_size(),
        }
    }
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            watch_rect: Rect::default(),
            ocr_mode: default_ocr_mode(),
            ocr_confidence_floor: default_ocr_confidence_floor(),
            sample_interval_ms: default_sample_interval_ms(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

impl Default for TranslationSettings {
    fn default() -> Self {
        Self {
            target_languages: Vec::new(),
            formality: default_formality(),
        }
    }
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            sizes: default_model_sizes(),
            compute: default_compute_preference(),
        }
    }
}
