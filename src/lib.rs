//! Streaming partitioned convolution.
//!
//! An impulse response is split into a short head, convolved with small
//! partitions for low latency, and a long tail, convolved with large
//! partitions for throughput. [`TwoStageConvolver`] sums both stages so the
//! result is the exact linear convolution with no added latency.
//! [`ChannelPipeline`] fans one engine per output channel across an
//! interleaved stream, and the [`stream`] drivers feed it from a live duplex
//! device or from files.

pub mod audio;
pub mod cli;
pub mod direct_convolver;
pub mod error;
pub mod fft_convolver;
pub mod impulse_response;
pub mod pipeline;
pub mod stream;
pub mod two_stage_convolver;
pub mod wav;

#[cfg(test)]
mod tests;

pub use direct_convolver::DirectConvolver;
pub use error::{ConfigError, Error, Result, StreamError};
pub use fft_convolver::FFTConvolver;
pub use impulse_response::ImpulseResponse;
pub use pipeline::ChannelPipeline;
pub use two_stage_convolver::TwoStageConvolver;

pub type Sample = f32;

/// Partition length of the head stage, in frames.
pub const HEAD_BLOCK_SIZE: usize = 64;
/// Partition length of the tail stage, in frames.
pub const TAIL_BLOCK_SIZE: usize = 512;
/// Maximum number of output channels (and therefore engines) per pipeline.
pub const MAX_OUTPUT_CHANNELS: usize = 2;

pub const DEFAULT_SAMPLE_RATE: u32 = 48_000;
pub const MIN_SAMPLE_RATE: u32 = 12_000;
pub const MAX_SAMPLE_RATE: u32 = 200_000;

/// Interleaved samples read per offline chunk.
pub const OFFLINE_BUFFER_SAMPLES: usize = 65_536;
/// Largest block the real-time pipeline processes in one pass. Longer device
/// callbacks are split.
pub const REALTIME_MAX_BLOCK_FRAMES: usize = 4096;

/// A fixed FIR applied to a stream, one algorithm variant per implementor.
///
/// `process` continues the convolution from the previous call: the output
/// is the linear convolution of the whole input history with the response,
/// restricted to the samples of the current call.
pub trait BlockConvolver: Sized + Send {
    fn new(response: &[Sample], block_size: usize) -> Result<Self, ConfigError>;
    fn process(&mut self, input: &[Sample], output: &mut [Sample]);
    fn reset(&mut self);
    /// Number of taps.
    fn len(&self) -> usize;
}
