//! Drivers feeding a [`ChannelPipeline`](crate::ChannelPipeline).
//!
//! The offline driver pulls from a blocking [`StreamSource`] and pushes to a
//! blocking [`StreamSink`]; the real-time driver is split into a capture
//! feed and a playback processor that run inside device callbacks. Both end
//! up in the same `ChannelPipeline::process` call.

pub mod offline;
pub mod realtime;

pub use offline::{OfflineDriver, OfflineReport, OfflineState};
pub use realtime::{
    realtime_channel, CaptureFeed, DuplexDevice, RealtimeController, RealtimeProcessor,
    RealtimeState, RealtimeStats,
};

use crate::{Sample, StreamError};

/// Blocking source of interleaved frames.
pub trait StreamSource {
    fn channels(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Fills `buffer` with up to `buffer.len() / channels` frames and
    /// returns how many were read. Fewer than requested means the stream
    /// has ended.
    fn read(&mut self, buffer: &mut [Sample]) -> Result<usize, StreamError>;
}

/// Blocking sink of interleaved frames.
pub trait StreamSink {
    fn channels(&self) -> usize;

    fn write(&mut self, samples: &[Sample]) -> Result<(), StreamError>;

    /// Flushes whatever the sink buffers. Called once after the last write.
    fn finish(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// In-memory source, mostly for tests and benchmarks.
#[derive(Clone, Debug)]
pub struct MemorySource {
    samples: Vec<Sample>,
    channels: usize,
    sample_rate: u32,
    position: usize,
}

impl MemorySource {
    pub fn new(samples: Vec<Sample>, channels: usize, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
            position: 0,
        }
    }
}

impl StreamSource for MemorySource {
    fn channels(&self) -> usize {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read(&mut self, buffer: &mut [Sample]) -> Result<usize, StreamError> {
        let remaining_frames = (self.samples.len() - self.position) / self.channels;
        let frames = std::cmp::min(buffer.len() / self.channels, remaining_frames);
        let n = frames * self.channels;
        buffer[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(frames)
    }
}

/// In-memory sink collecting everything written to it.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    pub samples: Vec<Sample>,
    channels: usize,
    pub finished: bool,
}

impl MemorySink {
    pub fn new(channels: usize) -> Self {
        Self {
            samples: Vec::new(),
            channels,
            finished: false,
        }
    }
}

impl StreamSink for MemorySink {
    fn channels(&self) -> usize {
        self.channels
    }

    fn write(&mut self, samples: &[Sample]) -> Result<(), StreamError> {
        self.samples.extend_from_slice(samples);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), StreamError> {
        self.finished = true;
        Ok(())
    }
}
