// Gapless playback scheduling for model audio
//
// Chunks arrive at irregular network intervals. Each one is placed directly
// after the previous one on the output clock, or at "now" if playback has
// fallen behind, so audio never overlaps, never gaps while data is queued,
// and never starts in the past.

use anyhow::Result;
use tracing::debug;

use super::codec::EncodedChunk;
use crate::error::{LiveError, LiveResult};

/// Opaque output device: a clock plus timed playback
pub trait AudioOutput: Send {
    /// Output clock in seconds
    fn current_time(&self) -> f64;

    /// Play `samples` (mono, normalized) starting at `start_at` on the output clock
    fn schedule(&mut self, samples: Vec<f32>, sample_rate: u32, start_at: f64) -> Result<()>;

    /// Cut everything scheduled and release the device
    fn stop(&mut self) -> Result<()>;
}

/// Earliest output time at which the next chunk may begin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackCursor {
    next_start: f64,
}

impl PlaybackCursor {
    pub fn new(now: f64) -> Self {
        Self { next_start: now }
    }

    /// Start time for a chunk scheduled at `now`
    pub fn start_for(&self, now: f64) -> f64 {
        self.next_start.max(now)
    }

    /// Reserve `duration` seconds starting at `max(cursor, now)`
    pub fn advance(&mut self, now: f64, duration: f64) -> f64 {
        let start_at = self.start_for(now);
        self.next_start = start_at + duration;
        start_at
    }

    pub fn position(&self) -> f64 {
        self.next_start
    }
}

/// Where a chunk landed on the output clock
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub start_at: f64,
    pub duration: f64,
    pub sample_count: usize,
    pub sample_rate: u32,
}

/// Decodes inbound chunks and lays them end to end on the output clock
pub struct PlaybackScheduler {
    output: Box<dyn AudioOutput>,
    cursor: PlaybackCursor,
    default_rate: u32,
    scheduled_secs: f64,
}

impl PlaybackScheduler {
    /// `default_rate` applies to chunks whose mime type carries no rate
    pub fn new(output: Box<dyn AudioOutput>, default_rate: u32) -> Self {
        let cursor = PlaybackCursor::new(output.current_time());
        Self {
            output,
            cursor,
            default_rate,
            scheduled_secs: 0.0,
        }
    }

    /// Decode and schedule one chunk
    ///
    /// Returns `Ok(None)` for an empty chunk. A chunk that fails to decode
    /// leaves the cursor where it was.
    pub fn enqueue(&mut self, chunk: &EncodedChunk) -> LiveResult<Option<ScheduledChunk>> {
        let samples = chunk.decode()?;
        if samples.is_empty() {
            return Ok(None);
        }

        let sample_rate = chunk.sample_rate().unwrap_or(self.default_rate);
        if sample_rate == 0 {
            return Err(LiveError::Decode(format!(
                "zero sample rate in {}",
                chunk.mime_type
            )));
        }

        let sample_count = samples.len();
        let duration = sample_count as f64 / sample_rate as f64;
        let now = self.output.current_time();
        let start_at = self.cursor.start_for(now);

        self.output
            .schedule(samples, sample_rate, start_at)
            .map_err(|e| LiveError::Playback(e.to_string()))?;

        self.cursor.advance(now, duration);
        self.scheduled_secs += duration;

        debug!(
            "Scheduled {} samples @ {}Hz at {:.3}s (now {:.3}s)",
            sample_count, sample_rate, start_at, now
        );

        Ok(Some(ScheduledChunk {
            start_at,
            duration,
            sample_count,
            sample_rate,
        }))
    }

    pub fn cursor(&self) -> PlaybackCursor {
        self.cursor
    }

    /// Total audio handed to the output so far
    pub fn scheduled_secs(&self) -> f64 {
        self.scheduled_secs
    }

    /// Cut pending playback and release the output
    pub fn stop(&mut self) -> Result<()> {
        self.output.stop()
    }
}
