pub mod capture;
pub mod device;
pub mod resampler;
pub mod utils;

pub use capture::{AudioCapture, AudioEvent};
pub use device::{list_input_devices, resolve_input, CpalDeviceInfo, ResolvedInput};
pub use resampler::FrameResampler;
pub use utils::{bytes_to_pcm16, downmix_to_mono, f32_to_pcm16, pcm16_to_f32, save_wav_file};
