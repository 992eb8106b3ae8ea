//! Fatal pipeline-start errors.
//!
//! Per-item failures (a transcription throwing on near-silence, a single
//! target language failing translation) are handled in place and never
//! surface as errors. Only the conditions that prevent a pipeline from
//! starting at all get concrete types, so callers can downcast them out
//! of an `anyhow::Error`.

use std::fmt;

/// No host audio device supports 16-bit input at any candidate rate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoCapturableDevice;

impl fmt::Display for NoCapturableDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no compatible audio capture device found")
    }
}

impl std::error::Error for NoCapturableDevice {}

/// Every requested recognition model failed to load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoModelsLoaded;

impl fmt::Display for NoModelsLoaded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no recognition models could be loaded")
    }
}

impl std::error::Error for NoModelsLoaded {}
