use log::{debug, info};

use super::{StreamSink, StreamSource};
use crate::{ChannelPipeline, ConfigError, Sample, StreamError, OFFLINE_BUFFER_SAMPLES};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OfflineState {
    /// Full chunks are being read, convolved and written.
    Reading,
    /// The last, short chunk has been read and is waiting to be written.
    Draining,
    Done,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct OfflineReport {
    pub frames: u64,
    pub chunks: u64,
}

/// Read/convolve/write loop for file conversion. No deadline; the first
/// read or write error aborts the run and leaves already written output in
/// place.
#[derive(Debug)]
pub struct OfflineDriver {
    pipeline: ChannelPipeline,
    chunk_frames: usize,
    input: Vec<Sample>,
    output: Vec<Sample>,
    pending_frames: usize,
    state: OfflineState,
    report: OfflineReport,
}

impl OfflineDriver {
    /// Chunks of [`OFFLINE_BUFFER_SAMPLES`] interleaved input samples.
    pub fn new(pipeline: ChannelPipeline) -> Self {
        let chunk_frames = std::cmp::max(1, OFFLINE_BUFFER_SAMPLES / pipeline.input_channels());
        Self::build(pipeline, chunk_frames)
    }

    pub fn with_chunk_frames(
        pipeline: ChannelPipeline,
        chunk_frames: usize,
    ) -> Result<Self, ConfigError> {
        if chunk_frames == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        Ok(Self::build(pipeline, chunk_frames))
    }

    fn build(pipeline: ChannelPipeline, chunk_frames: usize) -> Self {
        let input = vec![0.0; chunk_frames * pipeline.input_channels()];
        let output = vec![0.0; chunk_frames * pipeline.output_channels()];
        Self {
            pipeline,
            chunk_frames,
            input,
            output,
            pending_frames: 0,
            state: OfflineState::Reading,
            report: OfflineReport::default(),
        }
    }

    pub fn state(&self) -> OfflineState {
        self.state
    }

    pub fn chunk_frames(&self) -> usize {
        self.chunk_frames
    }

    pub fn report(&self) -> OfflineReport {
        self.report
    }

    /// Advances the state machine by one transition and returns the new
    /// state. Calling it in `Done` does nothing.
    pub fn step<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<OfflineState, StreamError>
    where
        S: StreamSource + ?Sized,
        K: StreamSink + ?Sized,
    {
        match self.state {
            OfflineState::Reading => {
                let frames = source.read(&mut self.input)?;
                if frames < self.chunk_frames {
                    debug!("short read of {} frames, draining", frames);
                    self.pending_frames = frames;
                    self.state = OfflineState::Draining;
                } else {
                    self.convolve_and_write(frames, sink)?;
                }
            }
            OfflineState::Draining => {
                self.convolve_and_write(self.pending_frames, sink)?;
                self.pending_frames = 0;
                self.state = OfflineState::Done;
            }
            OfflineState::Done => {}
        }
        Ok(self.state)
    }

    /// Runs until the source is exhausted, then finishes the sink.
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> Result<OfflineReport, StreamError>
    where
        S: StreamSource + ?Sized,
        K: StreamSink + ?Sized,
    {
        check_channels(self.pipeline.input_channels(), source.channels())?;
        check_channels(self.pipeline.output_channels(), sink.channels())?;

        while self.step(source, sink)? != OfflineState::Done {}
        sink.finish()?;

        info!(
            "Processed {} frames in {} chunks",
            self.report.frames, self.report.chunks
        );
        Ok(self.report)
    }

    fn convolve_and_write<K>(&mut self, frames: usize, sink: &mut K) -> Result<(), StreamError>
    where
        K: StreamSink + ?Sized,
    {
        let input = &self.input[..frames * self.pipeline.input_channels()];
        let output = &mut self.output[..frames * self.pipeline.output_channels()];
        self.pipeline.process(input, output);
        if frames > 0 {
            sink.write(output)?;
            self.report.chunks += 1;
        }
        self.report.frames += frames as u64;
        Ok(())
    }
}

fn check_channels(expected: usize, actual: usize) -> Result<(), StreamError> {
    if expected == actual {
        Ok(())
    } else {
        Err(StreamError::ChannelMismatch { expected, actual })
    }
}
