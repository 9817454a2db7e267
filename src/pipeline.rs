use log::debug;

use crate::{
    ConfigError, ImpulseResponse, Sample, TwoStageConvolver, HEAD_BLOCK_SIZE,
    MAX_OUTPUT_CHANNELS, TAIL_BLOCK_SIZE,
};

/// One [`TwoStageConvolver`] per output channel over an interleaved stream.
///
/// Channels are reconciled by repetition, never by mixing: output channel
/// `i` is fed input channel `i % input_channels` and convolved with impulse
/// response channel `i % ir_channels`. The two modulo mappings are
/// independent of each other.
///
/// All scratch buffers are sized once from `max_block_frames`, so
/// [`process`](Self::process) never allocates.
#[derive(Clone, Debug)]
pub struct ChannelPipeline {
    engines: Vec<TwoStageConvolver>,
    input_channels: usize,
    max_block_frames: usize,
    input_buffers: Vec<Vec<Sample>>,
    output_buffer: Vec<Sample>,
}

impl ChannelPipeline {
    pub fn new(
        impulse_response: &ImpulseResponse,
        input_channels: usize,
        output_channels: usize,
        max_block_frames: usize,
    ) -> Result<Self, ConfigError> {
        Self::with_block_sizes(
            impulse_response,
            input_channels,
            output_channels,
            max_block_frames,
            HEAD_BLOCK_SIZE,
            TAIL_BLOCK_SIZE,
        )
    }

    pub fn with_block_sizes(
        impulse_response: &ImpulseResponse,
        input_channels: usize,
        output_channels: usize,
        max_block_frames: usize,
        head_block_size: usize,
        tail_block_size: usize,
    ) -> Result<Self, ConfigError> {
        if input_channels == 0 {
            return Err(ConfigError::ZeroChannels("input"));
        }
        if output_channels == 0 {
            return Err(ConfigError::ZeroChannels("output"));
        }
        if output_channels > MAX_OUTPUT_CHANNELS {
            return Err(ConfigError::TooManyOutputChannels {
                requested: output_channels,
                max: MAX_OUTPUT_CHANNELS,
            });
        }
        if max_block_frames == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }

        let ir_channels = impulse_response.num_channels();
        let engines = (0..output_channels)
            .map(|i| {
                TwoStageConvolver::new(
                    impulse_response.channel(i % ir_channels),
                    head_block_size,
                    tail_block_size,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        for i in 0..output_channels {
            debug!(
                "output channel {} <- input channel {}, impulse channel {}",
                i,
                i % input_channels,
                i % ir_channels
            );
        }

        Ok(Self {
            engines,
            input_channels,
            max_block_frames,
            input_buffers: vec![vec![0.0; max_block_frames]; input_channels],
            output_buffer: vec![0.0; max_block_frames],
        })
    }

    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    pub fn output_channels(&self) -> usize {
        self.engines.len()
    }

    pub fn max_block_frames(&self) -> usize {
        self.max_block_frames
    }

    /// Convolves interleaved `input` (N channels) into interleaved `output`
    /// (M channels) and returns the number of frames processed: the smaller
    /// of the two buffers' frame counts. Blocks longer than
    /// `max_block_frames` are processed in consecutive sub-blocks.
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) -> usize {
        let output_channels = self.engines.len();
        let frames = std::cmp::min(
            input.len() / self.input_channels,
            output.len() / output_channels,
        );

        let mut done = 0;
        while done < frames {
            let n = std::cmp::min(frames - done, self.max_block_frames);
            let input = &input[done * self.input_channels..(done + n) * self.input_channels];
            let output = &mut output[done * output_channels..(done + n) * output_channels];
            self.process_block(input, output, n);
            done += n;
        }
        frames
    }

    fn process_block(&mut self, input: &[Sample], output: &mut [Sample], frames: usize) {
        let input_channels = self.input_channels;
        let output_channels = self.engines.len();

        for (j, frame) in input.chunks_exact(input_channels).enumerate() {
            for (buffer, &sample) in self.input_buffers.iter_mut().zip(frame) {
                buffer[j] = sample;
            }
        }

        let convolved = &mut self.output_buffer[..frames];
        for (i, engine) in self.engines.iter_mut().enumerate() {
            engine.process(&self.input_buffers[i % input_channels][..frames], convolved);
            for (frame, &sample) in output.chunks_exact_mut(output_channels).zip(convolved.iter()) {
                frame[i] = sample;
            }
        }
    }

    pub fn reset(&mut self) {
        for engine in self.engines.iter_mut() {
            engine.reset();
        }
    }
}
