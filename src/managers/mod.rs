pub mod transcription;

pub use transcription::{
    ComputeDevice, DecodeOptions, ModelLoader, Precision, RecognitionOutput, RecognitionSegment,
    SpeechModel, Transcription, TranscriptionManager,
};
