//! Capture and segmentation core for a live-translation overlay.
//!
//! Two independent pipelines run on dedicated threads:
//!
//! - the **speech pipeline** captures system or microphone audio,
//!   segments it into utterances by voice activity, transcribes each
//!   utterance and fans the text out to the configured target languages;
//! - the **screen pipeline** polls a watched screen rectangle, detects
//!   content changes by histogram comparison, runs OCR on changed frames
//!   and translates the recognized text, as one caption or as per-line
//!   overlay patches.
//!
//! The heavy backends (recognition engine, OCR engine, translation
//! service, screen grabber) and the overlay UI are injected through
//! traits; this crate owns the threading, segmentation and dispatch in
//! between.

pub mod audio_toolkit;
pub mod error;
pub mod managers;
pub mod screen;
pub mod settings;
pub mod sink;
pub mod translate;

use anyhow::Result;
use log::warn;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use audio_toolkit::audio::{AudioCapture, AudioEvent};
use audio_toolkit::vad::{EnergyVad, SmoothedVad, VoiceActivityDetector};
use managers::TranscriptionManager;
use screen::{aggregate_text, assemble_lines, OcrProvider, ScreenEvent, ScreenWatcher};
use settings::{AudioSettings, OcrMode, ScreenSettings, TranslationSettings};
use sink::{OcrPatch, ResultSink};
use translate::{translate_multi, translate_single, Translator};

pub use audio_toolkit::{Utterance, VoiceActivitySegmenter};
pub use screen::{IgnoredRegions, ScreenSource};

/// Utterances shorter than this many samples (1 s) get padded.
const PAD_TRIGGER_SAMPLES: usize = 16_000;
/// Padding target (1.25 s); short clips tend to mistranscribe without
/// trailing silence.
const PAD_TARGET_SAMPLES: usize = 20_000;

fn pad_short_utterance(samples: &mut Vec<i16>) {
    if !samples.is_empty() && samples.len() < PAD_TRIGGER_SAMPLES {
        samples.resize(PAD_TARGET_SAMPLES, 0);
    }
}

/// Speech pipeline supervisor: owns the capture worker and the consumer
/// thread that turns utterances into translated text on the sink.
pub struct SpeechPipeline {
    capture: Arc<AudioCapture>,
    consumer: Option<JoinHandle<()>>,
}

impl SpeechPipeline {
    /// Resolve a device, start capturing and spawn the consumer. Fails
    /// only on startup conditions (`NoCapturableDevice`); everything
    /// after start is reported through the sink.
    pub fn start(
        audio: AudioSettings,
        translation: TranslationSettings,
        transcription: Arc<TranscriptionManager>,
        mut translator: Box<dyn Translator>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self> {
        let vad: Box<dyn VoiceActivityDetector> = Box::new(SmoothedVad::new(
            Box::new(EnergyVad::new(audio.vad_sensitivity)),
            5,
            3,
        ));

        let (tx, rx) = mpsc::channel::<AudioEvent>();
        let capture = Arc::new(AudioCapture::new());
        capture.start(&audio, vad, tx)?;

        let consumer = thread::spawn(move || {
            while let Ok(event) = rx.recv() {
                match event {
                    AudioEvent::Started {
                        device,
                        sample_rate,
                    } => {
                        sink.on_status(&format!(
                            "capturing from '{}' at {} Hz",
                            device, sample_rate
                        ));
                    }
                    AudioEvent::Utterance(mut utterance) => {
                        pad_short_utterance(&mut utterance.samples);
                        let result = transcription.transcribe(
                            &utterance.to_bytes(),
                            1,
                            audio.language_hint(),
                            &audio.model_size,
                        );
                        if result.text.is_empty() {
                            continue;
                        }
                        let outcome =
                            translate_multi(translator.as_mut(), &result.text, &translation);
                        if outcome.all_failed() {
                            sink.on_error(&format!(
                                "translation failed for every target language ({} targets)",
                                outcome.failures.len()
                            ));
                            continue;
                        }
                        sink.on_utterance_translated(&result.text, &outcome.translations);
                    }
                    AudioEvent::Fatal(message) => sink.on_error(&message),
                    AudioEvent::Stopped => {
                        sink.on_status("audio capture stopped");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            capture,
            consumer: Some(consumer),
        })
    }

    /// Stop capturing and drain the consumer. Idempotent.
    pub fn stop(&mut self) {
        self.capture.stop();
        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                warn!("Speech pipeline consumer panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_running()
    }
}

impl Drop for SpeechPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Screen pipeline supervisor: owns the watcher worker and the consumer
/// thread that turns changed frames into translated captions or patches.
pub struct ScreenPipeline {
    watcher: Arc<ScreenWatcher>,
    consumer: Option<JoinHandle<()>>,
}

impl ScreenPipeline {
    pub fn start(
        settings: ScreenSettings,
        translation: TranslationSettings,
        source: Box<dyn ScreenSource>,
        ignored: Box<dyn IgnoredRegions>,
        mut ocr: Box<dyn OcrProvider>,
        mut translator: Box<dyn Translator>,
        sink: Arc<dyn ResultSink>,
    ) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<ScreenEvent>();
        let watcher = Arc::new(ScreenWatcher::new());
        watcher.start(settings.clone(), source, ignored, tx)?;

        let consumer = thread::spawn(move || {
            while let Ok(event) = rx.recv() {
                match event {
                    ScreenEvent::Changed { png, rect } => {
                        let tokens = match ocr.recognize(&png) {
                            Ok(tokens) => tokens,
                            Err(e) => {
                                warn!("OCR failed on changed frame: {}", e);
                                continue;
                            }
                        };
                        match settings.ocr_mode {
                            OcrMode::Aggregate => {
                                let text =
                                    aggregate_text(&tokens, settings.ocr_confidence_floor);
                                if text.is_empty() {
                                    continue;
                                }
                                for language in &translation.target_languages {
                                    match translate_single(
                                        translator.as_mut(),
                                        &text,
                                        language,
                                        translation.formality,
                                    ) {
                                        Ok(translated) => {
                                            sink.on_ocr_translated(&text, &translated)
                                        }
                                        Err(e) => warn!(
                                            "Screen translation to '{}' failed: {}",
                                            language, e
                                        ),
                                    }
                                }
                            }
                            OcrMode::Patch => {
                                let lines = assemble_lines(
                                    &tokens,
                                    settings.ocr_confidence_floor,
                                    &rect,
                                );
                                // Patches replace text in place, so they
                                // target a single language: the first one
                                // configured.
                                let Some(language) = translation.target_languages.first()
                                else {
                                    continue;
                                };
                                let mut patches = Vec::with_capacity(lines.len());
                                for line in lines {
                                    match translate_single(
                                        translator.as_mut(),
                                        &line.text,
                                        language,
                                        translation.formality,
                                    ) {
                                        Ok(translated) => patches.push(OcrPatch {
                                            original: line.text,
                                            translated,
                                            rect: line.rect,
                                        }),
                                        Err(e) => warn!(
                                            "Patch translation to '{}' failed: {}",
                                            language, e
                                        ),
                                    }
                                }
                                if !patches.is_empty() {
                                    sink.on_ocr_patches(&patches);
                                }
                            }
                        }
                    }
                    ScreenEvent::Fatal(message) => sink.on_error(&message),
                    ScreenEvent::Stopped => {
                        sink.on_status("screen watch stopped");
                        break;
                    }
                }
            }
        });

        Ok(Self {
            watcher,
            consumer: Some(consumer),
        })
    }

    /// Stop watching and drain the consumer. Idempotent.
    pub fn stop(&mut self) {
        self.watcher.stop();
        if let Some(consumer) = self.consumer.take() {
            if consumer.join().is_err() {
                warn!("Screen pipeline consumer panicked");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_running()
    }
}

impl Drop for ScreenPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}
