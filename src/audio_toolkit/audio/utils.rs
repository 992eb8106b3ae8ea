use anyhow::Result;
use hound::{WavSpec, WavWriter};
use log::debug;
use std::path::Path;

use crate::settings::PIPELINE_SAMPLE_RATE;

/// Average interleaved channels down to mono, clipping to the signed
/// 16-bit range. A mono input is returned unchanged.
pub fn downmix_to_mono(samples: &[i16], channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }

    let channels = channels as usize;
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32).clamp(i16::MIN as i32, i16::MAX as i32) as i16
        })
        .collect()
}

/// Normalize PCM16 samples into the [-1.0, 1.0) float range the
/// recognition engines expect.
pub fn pcm16_to_f32(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Quantize float samples back to PCM16, clipping out-of-range values.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Reinterpret PCM16 bytes (little-endian) as samples. A trailing odd
/// byte is dropped.
pub fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Save mono pipeline-rate samples as a WAV file, for debugging what the
/// segmenter handed to recognition.
pub fn save_wav_file<P: AsRef<Path>>(file_path: P, samples: &[i16]) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: PIPELINE_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut writer = WavWriter::create(file_path.as_ref(), spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;

    debug!("Saved WAV file: {:?}", file_path.as_ref());
    Ok(())
}
