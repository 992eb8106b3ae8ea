//! End-to-end pipeline tests with deterministic fake providers. The
//! speech chain is exercised from raw frames to sink delivery; the
//! screen pipeline runs its real threads against a fake screen source.

use anyhow::Result;
use image::{Rgba, RgbaImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use babelcap::managers::{
    ComputeDevice, DecodeOptions, ModelLoader, Precision, RecognitionOutput, RecognitionSegment,
    SpeechModel, TranscriptionManager,
};
use babelcap::screen::{OcrProvider, OcrToken, ScreenSource};
use babelcap::settings::{
    Formality, ModelSettings, OcrMode, Rect, ScreenSettings, SegmenterPolicy, TranslationSettings,
    FRAME_SAMPLES,
};
use babelcap::sink::{OcrPatch, ResultSink};
use babelcap::translate::{translate_multi, TranslateError, Translator};
use babelcap::ScreenPipeline;
use babelcap::{Utterance, VoiceActivitySegmenter};

#[derive(Debug)]
enum SinkRecord {
    Ocr { original: String, translated: String },
    Patches(Vec<OcrPatch>),
    Status(String),
    Error(String),
}

struct RecordingSink {
    tx: Mutex<Sender<SinkRecord>>,
}

impl RecordingSink {
    fn new() -> (Arc<Self>, Receiver<SinkRecord>) {
        let (tx, rx) = channel();
        (
            Arc::new(Self {
                tx: Mutex::new(tx),
            }),
            rx,
        )
    }

    fn send(&self, record: SinkRecord) {
        let _ = self.tx.lock().unwrap().send(record);
    }
}

impl ResultSink for RecordingSink {
    fn on_utterance_translated(&self, _original: &str, _translations: &HashMap<String, String>) {}

    fn on_ocr_translated(&self, original: &str, translated: &str) {
        self.send(SinkRecord::Ocr {
            original: original.to_string(),
            translated: translated.to_string(),
        });
    }

    fn on_ocr_patches(&self, patches: &[OcrPatch]) {
        self.send(SinkRecord::Patches(patches.to_vec()));
    }

    fn on_status(&self, message: &str) {
        self.send(SinkRecord::Status(message.to_string()));
    }

    fn on_error(&self, message: &str) {
        self.send(SinkRecord::Error(message.to_string()));
    }
}

/// Prefixes text with the target language, like "es:hello".
struct TaggingTranslator;

impl Translator for TaggingTranslator {
    fn translate(
        &mut self,
        text: &str,
        target_language: &str,
        _formality: Formality,
    ) -> Result<String, TranslateError> {
        Ok(format!("{}:{}", target_language, text))
    }
}

struct FixedModel(&'static str);

impl SpeechModel for FixedModel {
    fn transcribe(&mut self, samples: &[f32], _options: &DecodeOptions) -> Result<RecognitionOutput> {
        assert!(!samples.is_empty());
        Ok(RecognitionOutput {
            segments: vec![RecognitionSegment {
                text: self.0.to_string(),
            }],
            detected_language: Some("en".to_string()),
            detected_language_probability: Some(0.95),
        })
    }
}

struct FixedLoader(&'static str);

impl ModelLoader for FixedLoader {
    fn load(
        &self,
        _size: &str,
        _device: ComputeDevice,
        _precision: Precision,
    ) -> Result<Box<dyn SpeechModel>> {
        Ok(Box::new(FixedModel(self.0)))
    }

    fn accelerator_available(&self) -> bool {
        false
    }
}

/// Solid-color source; the brightness is bumped externally to simulate a
/// content change.
struct FakeScreen {
    level: Arc<AtomicU8>,
}

impl ScreenSource for FakeScreen {
    fn capture(&mut self, rect: &Rect) -> Result<RgbaImage> {
        let v = self.level.load(Ordering::SeqCst);
        Ok(RgbaImage::from_pixel(
            rect.width,
            rect.height,
            Rgba([v, v, v, 255]),
        ))
    }
}

/// Emits a fixed token layout for any frame: two confident words on one
/// line, one more below, and a junk token under the confidence floor.
struct FakeOcr;

impl OcrProvider for FakeOcr {
    fn recognize(&mut self, png: &[u8]) -> Result<Vec<OcrToken>> {
        // The watcher hands over real PNG bytes.
        image::load_from_memory(png)?;
        let word = |text: &str, confidence: f32, line: u32, bbox: Rect| OcrToken {
            text: text.to_string(),
            confidence,
            page: 1,
            block: 1,
            paragraph: 1,
            line,
            bbox,
        };
        Ok(vec![
            word("NEW", 91.0, 1, Rect::new(10, 10, 30, 12)),
            word("GAME", 89.0, 1, Rect::new(45, 10, 40, 12)),
            word("OPTIONS", 93.0, 2, Rect::new(10, 30, 70, 12)),
            word("~=#", 8.0, 2, Rect::new(85, 30, 10, 12)),
        ])
    }
}

fn screen_settings(mode: OcrMode) -> ScreenSettings {
    ScreenSettings {
        watch_rect: Rect::new(100, 50, 64, 48),
        ocr_mode: mode,
        sample_interval_ms: 10,
        ..Default::default()
    }
}

fn spanish() -> TranslationSettings {
    TranslationSettings {
        target_languages: vec!["es".to_string()],
        formality: Formality::Default,
    }
}

fn recv_until<F: Fn(&SinkRecord) -> bool>(rx: &Receiver<SinkRecord>, pred: F) -> SinkRecord {
    let deadline = Duration::from_secs(5);
    loop {
        let record = rx.recv_timeout(deadline).expect("sink record");
        if pred(&record) {
            return record;
        }
    }
}

#[test]
fn speech_chain_delivers_translated_utterances() {
    let _ = env_logger::builder().is_test(true).try_init();

    // Threshold-free scripted VAD: a frame is speech when loud.
    struct LoudVad;
    impl babelcap::audio_toolkit::vad::VoiceActivityDetector for LoudVad {
        fn is_speech(&mut self, frame: &[i16]) -> bool {
            frame[0].unsigned_abs() > 100
        }
    }

    let mut segmenter =
        VoiceActivitySegmenter::new(Box::new(LoudVad), 5, 4, SegmenterPolicy::Streak);

    let mut utterances: Vec<Utterance> = Vec::new();
    for _ in 0..10 {
        assert!(segmenter.push_frame(vec![0i16; FRAME_SAMPLES]).is_none());
    }
    for _ in 0..40 {
        if let Some(u) = segmenter.push_frame(vec![2000i16; FRAME_SAMPLES]) {
            utterances.push(u);
        }
    }
    for _ in 0..10 {
        if let Some(u) = segmenter.push_frame(vec![0i16; FRAME_SAMPLES]) {
            utterances.push(u);
        }
    }
    assert_eq!(utterances.len(), 1);

    let manager =
        TranscriptionManager::new(&ModelSettings::default(), &FixedLoader("hello there")).unwrap();
    let transcription = manager.transcribe(&utterances[0].to_bytes(), 1, None, "base");
    assert_eq!(transcription.text, "hello there");

    let outcome = translate_multi(&mut TaggingTranslator, &transcription.text, &spanish());
    assert_eq!(outcome.translations["es"], "es:hello there");
    assert!(!outcome.all_failed());
}

#[test]
fn screen_pipeline_aggregates_changed_text() {
    let _ = env_logger::builder().is_test(true).try_init();

    let level = Arc::new(AtomicU8::new(40));
    let (sink, rx) = RecordingSink::new();

    let mut pipeline = ScreenPipeline::start(
        screen_settings(OcrMode::Aggregate),
        spanish(),
        Box::new(FakeScreen {
            level: Arc::clone(&level),
        }),
        Box::new(|| Vec::new()),
        Box::new(FakeOcr),
        Box::new(TaggingTranslator),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    )
    .unwrap();

    // The first sample has no reference histogram and counts as a change.
    let first = recv_until(&rx, |r| matches!(r, SinkRecord::Ocr { .. }));
    match first {
        SinkRecord::Ocr {
            original,
            translated,
        } => {
            assert_eq!(original, "NEW GAME OPTIONS");
            assert_eq!(translated, "es:NEW GAME OPTIONS");
        }
        other => panic!("unexpected record {:?}", other),
    }

    // While the screen stays static, no further change event may fire
    // even though sampling continues every tick.
    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "static screen produced a change event"
    );

    // A brightness jump is a content change and triggers another pass.
    level.store(220, Ordering::SeqCst);
    recv_until(&rx, |r| matches!(r, SinkRecord::Ocr { .. }));

    pipeline.stop();
    assert!(!pipeline.is_running());
    recv_until(&rx, |r| matches!(r, SinkRecord::Status(m) if m == "screen watch stopped"));
}

#[test]
fn screen_pipeline_emits_offset_patches() {
    let _ = env_logger::builder().is_test(true).try_init();

    let (sink, rx) = RecordingSink::new();
    let mut pipeline = ScreenPipeline::start(
        screen_settings(OcrMode::Patch),
        spanish(),
        Box::new(FakeScreen {
            level: Arc::new(AtomicU8::new(80)),
        }),
        Box::new(|| Vec::new()),
        Box::new(FakeOcr),
        Box::new(TaggingTranslator),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    )
    .unwrap();

    let record = recv_until(&rx, |r| matches!(r, SinkRecord::Patches(_)));
    pipeline.stop();

    let SinkRecord::Patches(patches) = record else {
        panic!("expected patches");
    };
    assert_eq!(patches.len(), 2);
    assert_eq!(patches[0].original, "NEW GAME");
    assert_eq!(patches[0].translated, "es:NEW GAME");
    // Word boxes unioned, then offset by the watch-rect origin (100, 50).
    assert_eq!(patches[0].rect, Rect::new(110, 60, 75, 12));
    assert_eq!(patches[1].original, "OPTIONS");
    assert_eq!(patches[1].rect, Rect::new(110, 80, 70, 12));
}

#[test]
fn screen_pipeline_reports_capture_failure_once() {
    let _ = env_logger::builder().is_test(true).try_init();

    struct BrokenScreen;
    impl ScreenSource for BrokenScreen {
        fn capture(&mut self, _rect: &Rect) -> Result<RgbaImage> {
            Err(anyhow::anyhow!("display disconnected"))
        }
    }

    let (sink, rx) = RecordingSink::new();
    let mut pipeline = ScreenPipeline::start(
        screen_settings(OcrMode::Aggregate),
        spanish(),
        Box::new(BrokenScreen),
        Box::new(|| Vec::new()),
        Box::new(FakeOcr),
        Box::new(TaggingTranslator),
        Arc::clone(&sink) as Arc<dyn ResultSink>,
    )
    .unwrap();

    let error = recv_until(&rx, |r| matches!(r, SinkRecord::Error(_)));
    let SinkRecord::Error(message) = error else {
        panic!("expected error");
    };
    assert!(message.contains("display disconnected"));
    recv_until(&rx, |r| matches!(r, SinkRecord::Status(m) if m == "screen watch stopped"));

    // The watcher exited on its own; the supervisor must see that
    // without anyone calling stop first.
    let deadline = Instant::now() + Duration::from_secs(2);
    while pipeline.is_running() && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!pipeline.is_running());
    pipeline.stop();
}
