// Speaker output using cpal
//
// The output stream runs on its own thread. Scheduled buffers sit on a shared
// timeline keyed by device frame; the device callback renders whatever covers
// the frames it is asked for and advances the clock. The clock is therefore
// "frames actually handed to the device", which is what the scheduler needs.

use anyhow::{anyhow, bail, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{info, warn};

use super::playback::AudioOutput;

#[derive(Debug)]
struct ScheduledBuffer {
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledBuffer {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Buffers waiting to play, ordered by start frame
#[derive(Debug, Default)]
struct Timeline {
    queue: VecDeque<ScheduledBuffer>,
}

impl Timeline {
    fn insert(&mut self, buffer: ScheduledBuffer) {
        let at = self
            .queue
            .iter()
            .position(|b| b.start_frame > buffer.start_frame)
            .unwrap_or(self.queue.len());
        self.queue.insert(at, buffer);
    }

    /// Mono samples for frames `first..first + out.len()`
    fn render(&mut self, first: u64, out: &mut [f32]) {
        for (k, slot) in out.iter_mut().enumerate() {
            let frame = first + k as u64;

            while self.queue.front().is_some_and(|b| b.end_frame() <= frame) {
                self.queue.pop_front();
            }

            let mut value = 0.0;
            for buffer in &self.queue {
                if buffer.start_frame > frame {
                    break;
                }
                value += buffer.samples[(frame - buffer.start_frame) as usize];
            }
            *slot = value.clamp(-1.0, 1.0);
        }
    }

    fn clear(&mut self) {
        self.queue.clear();
    }
}

struct Shared {
    timeline: Mutex<Timeline>,
    frames_rendered: AtomicU64,
}

/// Default output device with a frame-accurate clock
pub struct CpalOutput {
    shared: Arc<Shared>,
    device_rate: u32,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl CpalOutput {
    /// Open the default output device (blocks until the stream is playing)
    pub fn open() -> Result<Self> {
        let shared = Arc::new(Shared {
            timeline: Mutex::new(Timeline::default()),
            frames_rendered: AtomicU64::new(0),
        });

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let thread_shared = Arc::clone(&shared);

        let thread = std::thread::Builder::new()
            .name("astra-speaker".to_string())
            .spawn(move || {
                let (stream, rate) = match open_output_stream(thread_shared) {
                    Ok(opened) => opened,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                let _ = ready_tx.send(Ok(rate));
                let _ = stop_rx.recv();
                drop(stream);
                info!("Output stream released");
            })?;

        let device_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                bail!("Output thread exited before the stream opened");
            }
        };

        info!("Output device opened at {}Hz", device_rate);

        Ok(Self {
            shared,
            device_rate,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.shared.frames_rendered.load(Ordering::Acquire) as f64 / self.device_rate as f64
    }

    fn schedule(&mut self, samples: Vec<f32>, sample_rate: u32, start_at: f64) -> Result<()> {
        if self.stop_tx.is_none() {
            bail!("Output already stopped");
        }

        if sample_rate == 0 {
            bail!("Zero sample rate");
        }

        let (start_frame, frame_count) =
            frame_span(start_at, samples.len(), sample_rate, self.device_rate);
        let samples = resample_linear(&samples, frame_count);

        let mut timeline = self
            .shared
            .timeline
            .lock()
            .map_err(|_| anyhow!("Output timeline poisoned"))?;
        timeline.insert(ScheduledBuffer {
            start_frame,
            samples,
        });

        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Ok(mut timeline) = self.shared.timeline.lock() {
            timeline.clear();
        }

        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            thread
                .join()
                .map_err(|_| anyhow!("Output thread panicked"))?;
        }

        Ok(())
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
    }
}

fn open_output_stream(shared: Arc<Shared>) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| anyhow!("No output device available"))?;

    let supported = device.default_output_config()?;
    let rate = supported.sample_rate();
    let channels = supported.channels() as usize;
    let stream_config: cpal::StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        cpal::SampleFormat::F32 => build_output::<f32>(&device, &stream_config, channels, shared)?,
        cpal::SampleFormat::I16 => build_output::<i16>(&device, &stream_config, channels, shared)?,
        cpal::SampleFormat::U16 => build_output::<u16>(&device, &stream_config, channels, shared)?,
        other => bail!("Unsupported output sample format: {:?}", other),
    };

    stream.play()?;

    Ok((stream, rate))
}

fn build_output<T>(
    device: &cpal::Device,
    stream_config: &cpal::StreamConfig,
    channels: usize,
    shared: Arc<Shared>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    use cpal::Sample;

    let mut mono: Vec<f32> = Vec::new();

    let stream = device.build_output_stream(
        stream_config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels.max(1);
            mono.clear();
            mono.resize(frames, 0.0);

            let first = shared.frames_rendered.load(Ordering::Acquire);
            if let Ok(mut timeline) = shared.timeline.lock() {
                timeline.render(first, &mut mono);
            }

            for (frame, &value) in data.chunks_mut(channels.max(1)).zip(&mono) {
                for sample in frame {
                    *sample = T::from_sample(value);
                }
            }

            shared
                .frames_rendered
                .fetch_add(frames as u64, Ordering::Release);
        },
        |err| warn!("Output stream error: {}", err),
        None,
    )?;

    Ok(stream)
}

/// Device frames covered by a chunk
///
/// Start and end are both rounded from clock time, so a chunk starting where
/// the previous one ended lands on exactly the frame that one stopped at.
fn frame_span(start_at: f64, sample_count: usize, sample_rate: u32, device_rate: u32) -> (u64, usize) {
    let to_frame = |secs: f64| (secs * device_rate as f64).round().max(0.0) as u64;

    let end_at = start_at + sample_count as f64 / sample_rate as f64;
    let start_frame = to_frame(start_at);
    let end_frame = to_frame(end_at).max(start_frame);

    (start_frame, (end_frame - start_frame) as usize)
}

/// Linear interpolation to exactly `out_len` samples
fn resample_linear(samples: &[f32], out_len: usize) -> Vec<f32> {
    if out_len == samples.len() || samples.is_empty() {
        return samples.to_vec();
    }

    let step = samples.len() as f64 / out_len as f64;
    let last = samples.len() - 1;

    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx0 = (pos.floor() as usize).min(last);
            let idx1 = (idx0 + 1).min(last);
            let frac = (pos - idx0 as f64) as f32;
            samples[idx0] + (samples[idx1] - samples[idx0]) * frac
        })
        .collect()
}
