use anyhow::{anyhow, Result};
use cpal::traits::{DeviceTrait, StreamTrait};
use log::{debug, error, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::device::{resolve_input, ResolvedInput};
use super::resampler::FrameResampler;
use super::utils::{downmix_to_mono, pcm16_to_f32};
use crate::audio_toolkit::vad::{Utterance, VoiceActivityDetector, VoiceActivitySegmenter};
use crate::settings::AudioSettings;

/// Events posted by the capture thread. `Stopped` is terminal and sent
/// exactly once per `start`, on every exit path.
#[derive(Debug)]
pub enum AudioEvent {
    Started { device: String, sample_rate: u32 },
    Utterance(Utterance),
    /// The stream failed mid-capture; `Stopped` follows immediately.
    Fatal(String),
    Stopped,
}

enum RawChunk {
    Data(Vec<i16>),
    StreamError(String),
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Owns the audio capture thread: device resolution at start, frame
/// pull, downmix, resample, segmentation, and utterance handoff.
///
/// The cpal stream lives entirely on the worker thread, so it is
/// released whenever that thread exits, panics included.
pub struct AudioCapture {
    worker: Mutex<Option<Worker>>,
}

impl AudioCapture {
    pub fn new() -> Self {
        Self {
            worker: Mutex::new(None),
        }
    }

    /// Resolve a device and spawn the capture thread. Fails if already
    /// running or if no capturable device exists.
    pub fn start(
        &self,
        settings: &AudioSettings,
        vad: Box<dyn VoiceActivityDetector>,
        events: Sender<AudioEvent>,
    ) -> Result<()> {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return Err(anyhow!("audio capture already running"));
        }

        let resolved = resolve_input(settings.preferred_device.as_deref())?;
        let segmenter = VoiceActivitySegmenter::new(
            vad,
            settings.silence_hangover_frames(),
            settings.min_utterance_frames(),
            settings.segmenter_policy,
        );

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            run_capture(resolved, segmenter, stop_flag, &events);
            let _ = events.send(AudioEvent::Stopped);
        });

        *worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Request a cooperative stop and wait for the worker to exit.
    /// Calling this while not started is a no-op.
    pub fn stop(&self) {
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::SeqCst);
            if let Err(e) = worker.handle.join() {
                warn!("Capture thread panicked: {:?}", e);
            } else {
                debug!("Capture thread joined");
            }
        }
    }

    /// True while the capture thread is alive. A worker that exited on
    /// its own (stream-fatal) is reaped here.
    pub fn is_running(&self) -> bool {
        let mut worker = self.worker.lock().unwrap();
        match worker.as_ref() {
            Some(w) if w.handle.is_finished() => {
                if let Some(w) = worker.take() {
                    if let Err(e) = w.handle.join() {
                        warn!("Capture thread panicked: {:?}", e);
                    }
                }
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

impl Drop for AudioCapture {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_capture(
    resolved: ResolvedInput,
    mut segmenter: VoiceActivitySegmenter,
    stop: Arc<AtomicBool>,
    events: &Sender<AudioEvent>,
) {
    let (raw_tx, raw_rx) = mpsc::channel::<RawChunk>();

    let stream = match build_stream(&resolved, raw_tx) {
        Ok(stream) => stream,
        Err(e) => {
            error!("Failed to open input stream: {}", e);
            let _ = events.send(AudioEvent::Fatal(format!("audio stream open failed: {}", e)));
            return;
        }
    };

    if let Err(e) = stream.play() {
        error!("Failed to start input stream: {}", e);
        let _ = events.send(AudioEvent::Fatal(format!("audio stream start failed: {}", e)));
        return;
    }

    let mut resampler = match FrameResampler::new(resolved.sample_rate) {
        Ok(resampler) => resampler,
        Err(e) => {
            let _ = events.send(AudioEvent::Fatal(e.to_string()));
            return;
        }
    };

    info!(
        "Capturing from '{}' at {} Hz, {} ch",
        resolved.name, resolved.sample_rate, resolved.channels
    );
    let _ = events.send(AudioEvent::Started {
        device: resolved.name.clone(),
        sample_rate: resolved.sample_rate,
    });

    // The stream is dropped when this function returns, releasing the
    // device handle on every exit path.
    while !stop.load(Ordering::SeqCst) {
        match raw_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(RawChunk::Data(chunk)) => {
                let mono = downmix_to_mono(&chunk, resolved.channels);
                let floats = pcm16_to_f32(&mono);
                let mut closed: Vec<Utterance> = Vec::new();
                resampler.push(&floats, &mut |frame| {
                    if let Some(utterance) = segmenter.push_frame(frame) {
                        closed.push(utterance);
                    }
                });
                for utterance in closed {
                    debug!(
                        "Utterance closed: {} frames ({:?})",
                        utterance.frame_count(),
                        utterance.duration()
                    );
                    if events.send(AudioEvent::Utterance(utterance)).is_err() {
                        // Consumer is gone; nothing left to capture for.
                        return;
                    }
                }
            }
            Ok(RawChunk::StreamError(message)) => {
                error!("Audio stream error: {}", message);
                let _ = events.send(AudioEvent::Fatal(message));
                return;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                let _ = events.send(AudioEvent::Fatal("audio stream closed".to_string()));
                return;
            }
        }
    }

    debug!("Capture loop observed stop request");

    // Flush the resampler tail and close any open utterance before the
    // stream is released.
    let mut closed: Vec<Utterance> = Vec::new();
    resampler.finish(&mut |frame| {
        if let Some(utterance) = segmenter.push_frame(frame) {
            closed.push(utterance);
        }
    });
    if let Some(utterance) = segmenter.flush() {
        closed.push(utterance);
    }
    for utterance in closed {
        let _ = events.send(AudioEvent::Utterance(utterance));
    }
}

fn build_stream(resolved: &ResolvedInput, raw_tx: Sender<RawChunk>) -> Result<cpal::Stream> {
    let config = cpal::StreamConfig {
        channels: resolved.channels,
        sample_rate: cpal::SampleRate(resolved.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let err_tx = raw_tx.clone();
    let stream = resolved.device.build_input_stream(
        &config,
        move |data: &[i16], _: &cpal::InputCallbackInfo| {
            let _ = raw_tx.send(RawChunk::Data(data.to_vec()));
        },
        move |err| {
            let _ = err_tx.send(RawChunk::StreamError(err.to_string()));
        },
        None,
    )?;

    Ok(stream)
}
