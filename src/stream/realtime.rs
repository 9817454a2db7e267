//! Real-time duplex driving.
//!
//! ```text
//! capture callback ──push()──► SPSC ring (rtrb) ──pop──► playback callback
//!   (CaptureFeed)                                       (RealtimeProcessor)
//!                                                        owns ChannelPipeline
//! ```
//!
//! Neither side allocates, locks or logs. Missing capture frames are
//! replaced by silence (underruns), capture frames that do not fit into the
//! ring are dropped (overruns); both are counted in [`RealtimeStats`] and
//! reported from the controlling thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};

use crate::{ChannelPipeline, Error, Sample, StreamError};

#[derive(Debug, Default)]
pub struct RealtimeStats {
    underrun_frames: AtomicU64,
    overrun_frames: AtomicU64,
    callbacks: AtomicU64,
}

impl RealtimeStats {
    pub fn underrun_frames(&self) -> u64 {
        self.underrun_frames.load(Ordering::Relaxed)
    }

    pub fn overrun_frames(&self) -> u64 {
        self.overrun_frames.load(Ordering::Relaxed)
    }

    pub fn callbacks(&self) -> u64 {
        self.callbacks.load(Ordering::Relaxed)
    }
}

/// Capture side: moves interleaved input samples into the ring.
pub struct CaptureFeed {
    producer: rtrb::Producer<Sample>,
    channels: usize,
    stats: Arc<RealtimeStats>,
}

impl CaptureFeed {
    /// Returns the number of frames queued. Only whole frames are queued.
    pub fn push(&mut self, input: &[Sample]) -> usize {
        let frames = input.len() / self.channels;
        let fit = std::cmp::min(frames, self.producer.slots() / self.channels);
        let n = fit * self.channels;

        if n > 0 {
            if let Ok(mut chunk) = self.producer.write_chunk(n) {
                let (first, second) = chunk.as_mut_slices();
                let split = first.len();
                first.copy_from_slice(&input[..split]);
                second.copy_from_slice(&input[split..n]);
                chunk.commit_all();
            }
        }
        if fit < frames {
            self.stats
                .overrun_frames
                .fetch_add((frames - fit) as u64, Ordering::Relaxed);
        }
        fit
    }
}

/// Playback side: pulls capture frames, convolves them and fills the
/// playback buffer. Owns the pipeline and all scratch space.
pub struct RealtimeProcessor {
    pipeline: ChannelPipeline,
    capture: rtrb::Consumer<Sample>,
    input: Vec<Sample>,
    stats: Arc<RealtimeStats>,
}

impl RealtimeProcessor {
    /// Playback callback body: fills all of `output`.
    pub fn render(&mut self, output: &mut [Sample]) {
        self.stats.callbacks.fetch_add(1, Ordering::Relaxed);

        let input_channels = self.pipeline.input_channels();
        let output_channels = self.pipeline.output_channels();
        let max_frames = self.pipeline.max_block_frames();
        let total_frames = output.len() / output_channels;

        let mut done = 0;
        while done < total_frames {
            let frames = std::cmp::min(total_frames - done, max_frames);
            let wanted = frames * input_channels;
            let available = std::cmp::min(
                wanted,
                (self.capture.slots() / input_channels) * input_channels,
            );

            let mut copied = 0;
            if available > 0 {
                if let Ok(chunk) = self.capture.read_chunk(available) {
                    let (first, second) = chunk.as_slices();
                    self.input[..first.len()].copy_from_slice(first);
                    self.input[first.len()..available].copy_from_slice(second);
                    chunk.commit_all();
                    copied = available;
                }
            }
            if copied < wanted {
                self.input[copied..wanted].fill(0.0);
                self.stats
                    .underrun_frames
                    .fetch_add(((wanted - copied) / input_channels) as u64, Ordering::Relaxed);
            }

            self.pipeline.process(
                &self.input[..wanted],
                &mut output[done * output_channels..(done + frames) * output_channels],
            );
            done += frames;
        }

        output[total_frames * output_channels..].fill(0.0);
    }
}

/// Splits a pipeline into the two callback halves joined by a ring holding
/// `ring_frames` capture frames.
pub fn realtime_channel(
    pipeline: ChannelPipeline,
    ring_frames: usize,
) -> (CaptureFeed, RealtimeProcessor, Arc<RealtimeStats>) {
    let channels = pipeline.input_channels();
    let (producer, consumer) = rtrb::RingBuffer::<Sample>::new(ring_frames.max(1) * channels);
    let stats = Arc::new(RealtimeStats::default());
    let input = vec![0.0; pipeline.max_block_frames() * channels];

    let feed = CaptureFeed {
        producer,
        channels,
        stats: Arc::clone(&stats),
    };
    let processor = RealtimeProcessor {
        pipeline,
        capture: consumer,
        input,
        stats: Arc::clone(&stats),
    };
    (feed, processor, stats)
}

/// An audio backend able to run the two callback halves.
pub trait DuplexDevice {
    fn input_channels(&self) -> usize;

    fn output_channels(&self) -> usize;

    fn sample_rate(&self) -> u32;

    /// Moves both halves into device callbacks and starts streaming.
    fn start(
        &mut self,
        feed: CaptureFeed,
        processor: RealtimeProcessor,
    ) -> Result<(), StreamError>;

    /// Stops streaming and drops the callbacks.
    fn stop(&mut self);

    /// Waits up to `timeout` for a fatal device error.
    fn poll_error(&mut self, timeout: Duration) -> Option<StreamError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RealtimeState {
    Idle,
    Running,
}

/// Idle/Running state machine around a [`DuplexDevice`].
pub struct RealtimeController<D: DuplexDevice> {
    device: D,
    state: RealtimeState,
    ring_frames: usize,
    stats: Option<Arc<RealtimeStats>>,
    stop_requested: Arc<AtomicBool>,
}

impl<D: DuplexDevice> RealtimeController<D> {
    pub fn new(device: D, ring_frames: usize) -> Self {
        Self {
            device,
            state: RealtimeState::Idle,
            ring_frames,
            stats: None,
            stop_requested: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn state(&self) -> RealtimeState {
        self.state
    }

    pub fn stats(&self) -> Option<&RealtimeStats> {
        self.stats.as_deref()
    }

    /// Setting the returned flag makes [`run`](Self::run) stop the device
    /// and return.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop_requested)
    }

    /// Idle -> Running. The pipeline must match the device's channel counts.
    pub fn start(&mut self, pipeline: ChannelPipeline) -> Result<(), Error> {
        if self.state == RealtimeState::Running {
            return Err(StreamError::AlreadyRunning.into());
        }
        if pipeline.input_channels() != self.device.input_channels() {
            return Err(StreamError::ChannelMismatch {
                expected: self.device.input_channels(),
                actual: pipeline.input_channels(),
            }
            .into());
        }
        if pipeline.output_channels() != self.device.output_channels() {
            return Err(StreamError::ChannelMismatch {
                expected: self.device.output_channels(),
                actual: pipeline.output_channels(),
            }
            .into());
        }

        let (feed, processor, stats) = realtime_channel(pipeline, self.ring_frames);
        self.device.start(feed, processor)?;
        self.stats = Some(stats);
        self.stop_requested.store(false, Ordering::Relaxed);
        self.state = RealtimeState::Running;
        info!(
            "Real-time convolution running: {} in, {} out, {} Hz",
            self.device.input_channels(),
            self.device.output_channels(),
            self.device.sample_rate()
        );
        Ok(())
    }

    /// Running -> Idle.
    pub fn stop(&mut self) {
        if self.state == RealtimeState::Running {
            self.device.stop();
            self.state = RealtimeState::Idle;
            info!("Real-time convolution stopped");
        }
    }

    /// Blocks while running, reporting underruns and overruns, until a stop
    /// is requested (`Ok`) or the device fails (`Err`, session is stopped).
    pub fn run(&mut self, poll_interval: Duration) -> Result<(), StreamError> {
        let mut reported = (0, 0);
        while self.state == RealtimeState::Running {
            if self.stop_requested.load(Ordering::Relaxed) {
                self.stop();
                break;
            }
            if let Some(err) = self.device.poll_error(poll_interval) {
                self.stop();
                return Err(err);
            }
            if let Some(stats) = self.stats.as_deref() {
                let current = (stats.underrun_frames(), stats.overrun_frames());
                if current.0 > reported.0 {
                    warn!("capture underrun: {} frames of silence", current.0 - reported.0);
                }
                if current.1 > reported.1 {
                    warn!("capture overrun: {} frames dropped", current.1 - reported.1);
                }
                reported = current;
            }
        }
        Ok(())
    }
}

impl<D: DuplexDevice> Drop for RealtimeController<D> {
    fn drop(&mut self) {
        self.stop();
    }
}
