use anyhow::Result;
use image::RgbaImage;
use log::{debug, error, info, warn};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::histogram::{correlation, luminance_histogram, HISTOGRAM_BINS};
use crate::settings::{Rect, ScreenSettings};

/// Grabs pixels for a screen rectangle. The concrete backend (a
/// platform capture API) lives outside this crate.
pub trait ScreenSource: Send {
    fn capture(&mut self, rect: &Rect) -> Result<RgbaImage>;
}

/// Supplies the rectangles to blank out before comparison, queried once
/// per sample so overlay windows can move between ticks.
pub trait IgnoredRegions: Send {
    fn regions(&self) -> Vec<Rect>;
}

impl<F> IgnoredRegions for F
where
    F: Fn() -> Vec<Rect> + Send,
{
    fn regions(&self) -> Vec<Rect> {
        self()
    }
}

/// Events posted by the watcher thread. `Stopped` is terminal and sent
/// exactly once per `start`, on every exit path.
#[derive(Debug)]
pub enum ScreenEvent {
    /// The watched region's content changed; `png` is the masked frame.
    Changed { png: Vec<u8>, rect: Rect },
    /// Capture failed mid-watch; `Stopped` follows immediately.
    Fatal(String),
    Stopped,
}

struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// Polls a screen rectangle on its own thread and reports content
/// changes via histogram comparison.
pub struct ScreenWatcher {
    worker: Mutex<Option<Worker>>,
}

impl ScreenWatcher {
    pub fn new() -> Self {
        Self {
            worker: Mutex::new(None),
        }
    }

    pub fn start(
        &self,
        settings: ScreenSettings,
        source: Box<dyn ScreenSource>,
        ignored: Box<dyn IgnoredRegions>,
        events: Sender<ScreenEvent>,
    ) -> Result<()> {
        let mut worker = self.worker.lock().unwrap();
        if worker.is_some() {
            return Err(anyhow::anyhow!("screen watcher already running"));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let handle = thread::spawn(move || {
            run_watch(settings, source, ignored, stop_flag, &events);
            let _ = events.send(ScreenEvent::Stopped);
        });

        *worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Request a cooperative stop and wait for the worker to exit.
    pub fn stop(&self) {
        let worker = self.worker.lock().unwrap().take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::SeqCst);
            if let Err(e) = worker.handle.join() {
                warn!("Screen watcher thread panicked: {:?}", e);
            } else {
                debug!("Screen watcher thread joined");
            }
        }
    }

    /// True while the watcher thread is alive. A worker that exited on
    /// its own (capture-fatal) is reaped here.
    pub fn is_running(&self) -> bool {
        let mut worker = self.worker.lock().unwrap();
        match worker.as_ref() {
            Some(w) if w.handle.is_finished() => {
                if let Some(w) = worker.take() {
                    if let Err(e) = w.handle.join() {
                        warn!("Screen watcher thread panicked: {:?}", e);
                    }
                }
                false
            }
            Some(_) => true,
            None => false,
        }
    }
}

impl Default for ScreenWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ScreenWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_watch(
    settings: ScreenSettings,
    mut source: Box<dyn ScreenSource>,
    ignored: Box<dyn IgnoredRegions>,
    stop: Arc<AtomicBool>,
    events: &Sender<ScreenEvent>,
) {
    let rect = settings.watch_rect;
    let interval = settings.sample_interval();
    info!(
        "Watching {}x{} at ({}, {}) every {:?}",
        rect.width, rect.height, rect.x, rect.y, interval
    );

    let mut prev: Option<[f64; HISTOGRAM_BINS]> = None;
    while !stop.load(Ordering::SeqCst) {
        let tick = Instant::now();

        let mut frame = match source.capture(&rect) {
            Ok(frame) => frame,
            Err(e) => {
                error!("Screen capture failed: {}", e);
                let _ = events.send(ScreenEvent::Fatal(format!("screen capture failed: {}", e)));
                return;
            }
        };
        mask_regions(&mut frame, &rect, &ignored.regions());

        let histogram = luminance_histogram(&frame);
        // The reference advances every sample, so the comparison is
        // always against the previous tick, not the last change.
        let changed = match prev.replace(histogram) {
            None => true,
            Some(prev) => correlation(&prev, &histogram) < settings.similarity_threshold,
        };

        if changed {
            debug!("Watched region changed");
            match encode_png(&frame) {
                Ok(png) => {
                    if events.send(ScreenEvent::Changed { png, rect }).is_err() {
                        // Consumer is gone; nothing left to watch for.
                        return;
                    }
                }
                Err(e) => warn!("Dropping changed frame, PNG encoding failed: {}", e),
            }
        }

        let elapsed = tick.elapsed();
        if elapsed < interval {
            thread::sleep(interval - elapsed);
        }
    }

    debug!("Watch loop observed stop request");
}

/// Paint every ignored rectangle black where it overlaps the captured
/// frame, in frame-local coordinates.
fn mask_regions(frame: &mut RgbaImage, frame_rect: &Rect, ignored: &[Rect]) {
    for region in ignored {
        let Some(overlap) = frame_rect.intersection(region) else {
            continue;
        };
        let x0 = (overlap.x - frame_rect.x) as u32;
        let y0 = (overlap.y - frame_rect.y) as u32;
        for y in y0..(y0 + overlap.height).min(frame.height()) {
            for x in x0..(x0 + overlap.width).min(frame.width()) {
                frame.put_pixel(x, y, image::Rgba([0, 0, 0, 255]));
            }
        }
    }
}

fn encode_png(frame: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    frame.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}
