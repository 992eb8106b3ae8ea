use anyhow::{anyhow, Result};
use rubato::{FftFixedIn, Resampler};

use super::utils::f32_to_pcm16;
use crate::settings::{FRAME_SAMPLES, PIPELINE_SAMPLE_RATE};

const RESAMPLER_CHUNK_SIZE: usize = 1024;

/// Converts a mono stream at the device rate into fixed 30 ms PCM16
/// frames at the pipeline rate.
///
/// Input arrives in whatever chunk sizes the audio backend delivers;
/// frames are emitted as soon as enough output samples accumulate, so
/// latency stays at one frame plus the resampler chunk.
pub struct FrameResampler {
    resampler: Option<FftFixedIn<f32>>,
    chunk_in: usize,
    in_buf: Vec<f32>,
    pending: Vec<f32>,
}

impl FrameResampler {
    pub fn new(in_hz: u32) -> Result<Self> {
        let resampler = if in_hz != PIPELINE_SAMPLE_RATE {
            Some(
                FftFixedIn::<f32>::new(
                    in_hz as usize,
                    PIPELINE_SAMPLE_RATE as usize,
                    RESAMPLER_CHUNK_SIZE,
                    1,
                    1,
                )
                .map_err(|e| anyhow!("Failed to create resampler: {}", e))?,
            )
        } else {
            None
        };

        Ok(Self {
            resampler,
            chunk_in: RESAMPLER_CHUNK_SIZE,
            in_buf: Vec::with_capacity(RESAMPLER_CHUNK_SIZE),
            pending: Vec::with_capacity(FRAME_SAMPLES),
        })
    }

    /// Feed mono samples; `emit` is called once per completed frame.
    pub fn push(&mut self, mut src: &[f32], emit: &mut impl FnMut(Vec<i16>)) {
        if self.resampler.is_none() {
            self.collect_frames(src, emit);
            return;
        }

        while !src.is_empty() {
            let space = self.chunk_in - self.in_buf.len();
            let take = space.min(src.len());
            self.in_buf.extend_from_slice(&src[..take]);
            src = &src[take..];

            if self.in_buf.len() == self.chunk_in {
                let out = self
                    .resampler
                    .as_mut()
                    .and_then(|r| r.process(&[&self.in_buf[..]], None).ok());
                self.in_buf.clear();
                if let Some(out) = out {
                    self.collect_frames(&out[0], emit);
                }
            }
        }
    }

    /// Flush buffered input, padding the final frame with silence.
    pub fn finish(&mut self, emit: &mut impl FnMut(Vec<i16>)) {
        if !self.in_buf.is_empty() {
            self.in_buf.resize(self.chunk_in, 0.0);
            let out = self
                .resampler
                .as_mut()
                .and_then(|r| r.process(&[&self.in_buf[..]], None).ok());
            self.in_buf.clear();
            if let Some(out) = out {
                self.collect_frames(&out[0], emit);
            }
        }

        if !self.pending.is_empty() {
            self.pending.resize(FRAME_SAMPLES, 0.0);
            emit(f32_to_pcm16(&self.pending));
            self.pending.clear();
        }
    }

    fn collect_frames(&mut self, mut data: &[f32], emit: &mut impl FnMut(Vec<i16>)) {
        while !data.is_empty() {
            let space = FRAME_SAMPLES - self.pending.len();
            let take = space.min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == FRAME_SAMPLES {
                emit(f32_to_pcm16(&self.pending));
                self.pending.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passthrough_chunks_into_thirty_ms_frames() {
        let mut resampler = FrameResampler::new(PIPELINE_SAMPLE_RATE).unwrap();
        let mut frames = Vec::new();
        // 100 ms of input in awkward chunk sizes.
        let input = vec![0.25f32; 1600];
        for chunk in input.chunks(333) {
            resampler.push(chunk, &mut |frame| frames.push(frame));
        }
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f.len() == FRAME_SAMPLES));

        resampler.finish(&mut |frame| frames.push(frame));
        assert_eq!(frames.len(), 4);
        // The flushed frame is padded with silence.
        assert_eq!(*frames[3].last().unwrap(), 0);
    }

    #[test]
    fn downsampling_preserves_duration() {
        let mut resampler = FrameResampler::new(48_000).unwrap();
        let mut emitted = 0usize;
        // One second at 48 kHz.
        let input = vec![0.1f32; 48_000];
        for chunk in input.chunks(4800) {
            resampler.push(chunk, &mut |frame| emitted += frame.len());
        }
        resampler.finish(&mut |frame| emitted += frame.len());
        // Expect roughly one second at 16 kHz, within one frame of slack
        // either way from resampler priming and final padding.
        let second = PIPELINE_SAMPLE_RATE as usize;
        assert!(emitted >= second - FRAME_SAMPLES && emitted <= second + 2 * FRAME_SAMPLES);
    }
}
