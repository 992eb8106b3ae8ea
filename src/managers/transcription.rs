use anyhow::Result;
use log::{debug, info, warn};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use crate::audio_toolkit::audio::{bytes_to_pcm16, downmix_to_mono, pcm16_to_f32};
use crate::error::NoModelsLoaded;
use crate::settings::{ComputePreference, ModelSettings};

/// Anything shorter than this (0.1 s at the pipeline rate) is too short
/// to carry meaning; transcription short-circuits to an empty result.
const MIN_MEANINGFUL_SAMPLES: usize = 1600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Accelerated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    /// High-throughput precision for accelerated devices.
    Float16,
    /// CPU-appropriate quantized precision.
    Int8,
}

/// Decoding parameters forwarded to the recognition engine. Fixed
/// thresholds, deterministic decoding.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    pub language: Option<String>,
    pub vad_filter: bool,
    pub log_prob_threshold: f32,
    pub no_speech_threshold: f32,
    pub temperature: f32,
    pub condition_on_previous_text: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            language: None,
            vad_filter: true,
            log_prob_threshold: -1.0,
            no_speech_threshold: 0.6,
            temperature: 0.0,
            condition_on_previous_text: true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecognitionSegment {
    pub text: String,
}

/// Raw engine output at the recognition provider boundary.
#[derive(Debug, Clone, Default)]
pub struct RecognitionOutput {
    pub segments: Vec<RecognitionSegment>,
    pub detected_language: Option<String>,
    pub detected_language_probability: Option<f32>,
}

/// A loaded recognition model. Implementations must be ready for the
/// next independent call regardless of how the previous one ended.
pub trait SpeechModel: Send {
    fn transcribe(&mut self, samples: &[f32], options: &DecodeOptions) -> Result<RecognitionOutput>;
}

/// Loads models by size label onto a compute device. The concrete
/// engine (a Whisper-style backend) lives outside this crate.
pub trait ModelLoader {
    fn load(
        &self,
        size: &str,
        device: ComputeDevice,
        precision: Precision,
    ) -> Result<Box<dyn SpeechModel>>;

    fn accelerator_available(&self) -> bool;
}

/// Finished transcription of one utterance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcription {
    pub text: String,
    pub detected_language: Option<String>,
    pub confidence: Option<f32>,
}

/// Owns the preloaded model registry and serializes recognition calls
/// against each model.
pub struct TranscriptionManager {
    registry: HashMap<String, Mutex<Box<dyn SpeechModel>>>,
    device: ComputeDevice,
    precision: Precision,
}

impl std::fmt::Debug for TranscriptionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionManager")
            .field("registry", &self.registry.keys().collect::<Vec<_>>())
            .field("device", &self.device)
            .field("precision", &self.precision)
            .finish()
    }
}

impl TranscriptionManager {
    /// Load every requested size. Sizes that fail to load are skipped
    /// with a warning; an empty registry is fatal.
    pub fn new(settings: &ModelSettings, loader: &dyn ModelLoader) -> Result<Self> {
        let (device, precision) = select_compute(settings.compute, loader);
        info!(
            "Loading recognition models {:?} on {:?} ({:?})",
            settings.sizes, device, precision
        );

        let mut registry = HashMap::new();
        for size in &settings.sizes {
            let load_start = Instant::now();
            match loader.load(size, device, precision) {
                Ok(model) => {
                    debug!(
                        "Loaded model '{}' in {}ms",
                        size,
                        load_start.elapsed().as_millis()
                    );
                    registry.insert(size.clone(), Mutex::new(model));
                }
                Err(e) => {
                    warn!("Skipping model '{}': {}", size, e);
                }
            }
        }

        if registry.is_empty() {
            return Err(NoModelsLoaded.into());
        }

        Ok(Self {
            registry,
            device,
            precision,
        })
    }

    pub fn loaded_sizes(&self) -> Vec<&str> {
        self.registry.keys().map(String::as_str).collect()
    }

    pub fn compute(&self) -> (ComputeDevice, Precision) {
        (self.device, self.precision)
    }

    /// Transcribe PCM16 bytes. Engine failures (typically on near-silent
    /// input) come back as an empty transcription, never as an error.
    pub fn transcribe(
        &self,
        audio: &[u8],
        channel_count: u16,
        language_hint: Option<&str>,
        requested_size: &str,
    ) -> Transcription {
        let model = match self.registry.get(requested_size) {
            Some(model) => model,
            None => {
                // Registry is never empty, so some model exists.
                let (fallback, model) = self
                    .registry
                    .iter()
                    .next()
                    .map(|(size, model)| (size.as_str(), model))
                    .unwrap();
                warn!(
                    "Model size '{}' not loaded, substituting '{}'",
                    requested_size, fallback
                );
                model
            }
        };

        let mut samples = bytes_to_pcm16(audio);
        if channel_count == 2 {
            samples = downmix_to_mono(&samples, 2);
        }

        if samples.len() < MIN_MEANINGFUL_SAMPLES {
            debug!("Skipping {}-sample clip, below meaningful floor", samples.len());
            return Transcription::default();
        }

        let floats = pcm16_to_f32(&samples);
        let options = DecodeOptions {
            language: language_hint.map(str::to_string),
            ..Default::default()
        };

        let st = Instant::now();
        let output = {
            let mut engine = model.lock().unwrap();
            match engine.transcribe(&floats, &options) {
                Ok(output) => output,
                Err(e) => {
                    // Engines commonly reject near-silent input; treat it
                    // as "nothing was said".
                    debug!("Recognition returned no result: {}", e);
                    return Transcription::default();
                }
            }
        };
        debug!("Recognition completed in {}ms", st.elapsed().as_millis());

        let text = output
            .segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<String>()
            .trim()
            .to_string();

        Transcription {
            text,
            detected_language: output.detected_language,
            confidence: output.detected_language_probability,
        }
    }
}

/// Device/precision selection: prefer the accelerator with a
/// high-throughput precision when present; downgrade a hard accelerator
/// request to CPU when none exists.
fn select_compute(
    preference: ComputePreference,
    loader: &dyn ModelLoader,
) -> (ComputeDevice, Precision) {
    match preference {
        ComputePreference::Cpu => (ComputeDevice::Cpu, Precision::Int8),
        ComputePreference::Auto | ComputePreference::Accelerated => {
            if loader.accelerator_available() {
                (ComputeDevice::Accelerated, Precision::Float16)
            } else {
                if preference == ComputePreference::Accelerated {
                    debug!("Accelerator requested but unavailable, using CPU");
                }
                (ComputeDevice::Cpu, Precision::Int8)
            }
        }
    }
}
