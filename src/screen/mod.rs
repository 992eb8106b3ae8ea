//! Screen watch pipeline: periodic capture of a fixed rectangle,
//! histogram-based change detection with ignorable overlay regions, and
//! OCR line reassembly for the text that changed.

pub mod detector;
pub mod histogram;
pub mod ocr;

pub use detector::{IgnoredRegions, ScreenEvent, ScreenSource, ScreenWatcher};
pub use ocr::{aggregate_text, assemble_lines, OcrProvider, OcrToken, RecognizedLine};
