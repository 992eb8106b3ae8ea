//! Result sink boundary.
//!
//! The UI (or any other consumer) implements [`ResultSink`]; pipeline
//! threads call it with finished work. Implementations must be cheap and
//! non-blocking, typically just posting into the UI's own event loop.

use crate::settings::Rect;
use std::collections::HashMap;

/// One translated screen-space line for in-place overlay rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrPatch {
    pub original: String,
    pub translated: String,
    pub rect: Rect,
}

/// Consumer of finished pipeline output.
pub trait ResultSink: Send + Sync {
    /// A spoken utterance was transcribed and fanned out to the target
    /// languages. `translations` may be partial; languages that failed
    /// are absent.
    fn on_utterance_translated(&self, original: &str, translations: &HashMap<String, String>);

    /// Aggregate-mode OCR result for the watched region.
    fn on_ocr_translated(&self, original: &str, translated: &str);

    /// Patch-mode OCR result, one entry per surviving line.
    fn on_ocr_patches(&self, patches: &[OcrPatch]);

    /// Informational status (pipeline started, device selected, ...).
    fn on_status(&self, message: &str);

    /// A pipeline terminated abnormally. Reported once per failure.
    fn on_error(&self, message: &str);
}
