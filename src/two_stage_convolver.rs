use log::{debug, warn};

use crate::{BlockConvolver, ConfigError, DirectConvolver, FFTConvolver, Sample};

/// Earliest taps of the response, convolved without latency.
#[derive(Clone, Debug)]
enum HeadStage {
    Direct(DirectConvolver),
    Fft(FFTConvolver),
}

impl HeadStage {
    fn new(response: &[Sample], head_block_size: usize) -> Result<Self, ConfigError> {
        if response.len() <= head_block_size {
            Ok(HeadStage::Direct(DirectConvolver::new(response, head_block_size)?))
        } else {
            Ok(HeadStage::Fft(FFTConvolver::new(response, head_block_size)?))
        }
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        match self {
            HeadStage::Direct(convolver) => convolver.process(input, output),
            HeadStage::Fft(convolver) => convolver.process(input, output),
        }
    }

    fn reset(&mut self) {
        match self {
            HeadStage::Direct(convolver) => convolver.reset(),
            HeadStage::Fft(convolver) => convolver.reset(),
        }
    }
}

/// Taps from `tail_block_size` onwards.
///
/// The near part `[T, 2T)` is partitioned at the head block size and
/// computed every head block; the far part `[2T, L)` is partitioned at the
/// tail block size and computed once per tail block. Both parts start at
/// least one tail block into the response, so their results are computed
/// ahead of time into the `*_output` buffers, swapped into the
/// `*_precalculated` buffers at the end of each tail block, and read out at
/// the matching time index during the following block(s).
#[derive(Clone, Debug)]
struct TailStage {
    near: FFTConvolver,
    near_output: Vec<Sample>,
    near_precalculated: Vec<Sample>,
    far: Option<FFTConvolver>,
    far_output: Vec<Sample>,
    far_precalculated: Vec<Sample>,
    input: Vec<Sample>,
    input_fill: usize,
    precalculated_pos: usize,
}

impl TailStage {
    fn new(
        response: &[Sample],
        head_block_size: usize,
        tail_block_size: usize,
    ) -> Result<Option<Self>, ConfigError> {
        if response.len() <= tail_block_size {
            return Ok(None);
        }

        let near_end = std::cmp::min(response.len(), 2 * tail_block_size);
        let near = FFTConvolver::new(&response[tail_block_size..near_end], head_block_size)?;

        let far = if response.len() > 2 * tail_block_size {
            Some(FFTConvolver::new(
                &response[2 * tail_block_size..],
                tail_block_size,
            )?)
        } else {
            None
        };
        let far_len = if far.is_some() { tail_block_size } else { 0 };

        Ok(Some(Self {
            near,
            near_output: vec![0.0; tail_block_size],
            near_precalculated: vec![0.0; tail_block_size],
            far,
            far_output: vec![0.0; far_len],
            far_precalculated: vec![0.0; far_len],
            input: vec![0.0; tail_block_size],
            input_fill: 0,
            precalculated_pos: 0,
        }))
    }

    /// Adds the tail contribution onto `output`, which already holds the
    /// head stage's result for the same frames.
    fn process(
        &mut self,
        input: &[Sample],
        output: &mut [Sample],
        head_block_size: usize,
        tail_block_size: usize,
    ) {
        let len = input.len();
        let mut processed = 0;

        while processed < len {
            let processing = std::cmp::min(
                len - processed,
                head_block_size - (self.input_fill % head_block_size),
            );

            // Sum head and tail
            let pos = self.precalculated_pos;
            let span = &mut output[processed..processed + processing];
            for (y, &t) in span.iter_mut().zip(&self.near_precalculated[pos..pos + processing]) {
                *y += t;
            }
            if !self.far_precalculated.is_empty() {
                for (y, &t) in span.iter_mut().zip(&self.far_precalculated[pos..pos + processing]) {
                    *y += t;
                }
            }
            self.precalculated_pos += processing;

            // Fill input buffer for tail convolution
            self.input[self.input_fill..self.input_fill + processing]
                .copy_from_slice(&input[processed..processed + processing]);
            self.input_fill += processing;
            debug_assert!(self.input_fill <= tail_block_size);

            // Near part, one head block at a time
            if self.input_fill % head_block_size == 0 {
                let block_offset = self.input_fill - head_block_size;
                self.near.process(
                    &self.input[block_offset..block_offset + head_block_size],
                    &mut self.near_output[block_offset..block_offset + head_block_size],
                );
                if self.input_fill == tail_block_size {
                    std::mem::swap(&mut self.near_precalculated, &mut self.near_output);
                }
            }

            if self.input_fill == tail_block_size {
                // Far part, one tail block at a time
                if let Some(far) = self.far.as_mut() {
                    std::mem::swap(&mut self.far_precalculated, &mut self.far_output);
                    far.process(&self.input, &mut self.far_output);
                }
                self.input_fill = 0;
                self.precalculated_pos = 0;
            }

            processed += processing;
        }
    }

    fn reset(&mut self) {
        self.near.reset();
        self.near_output.fill(0.0);
        self.near_precalculated.fill(0.0);
        if let Some(far) = self.far.as_mut() {
            far.reset();
        }
        self.far_output.fill(0.0);
        self.far_precalculated.fill(0.0);
        self.input.fill(0.0);
        self.input_fill = 0;
        self.precalculated_pos = 0;
    }
}

/// Convolution engine for one channel: a low-latency head stage plus a
/// block-delayed tail stage whose output is aligned with the head before
/// summation. The sum is the exact linear convolution with the whole
/// response, without added latency, for any sequence of call lengths.
///
/// Once `len()` consecutive zero input frames have been seen, the output is
/// exactly zero and both stages are cleared, so no transform round-off
/// survives the ring-down.
#[derive(Clone, Debug)]
pub struct TwoStageConvolver {
    ir_len: usize,
    head_block_size: usize,
    tail_block_size: usize,
    head: HeadStage,
    tail: Option<TailStage>,
    /// Length of the current run of zero input frames.
    silent_frames: usize,
}

impl TwoStageConvolver {
    /// Block sizes are rounded up to powers of two. The head covers the
    /// first `min(len, tail_block_size)` taps; shorter responses get no
    /// tail stage at all.
    pub fn new(
        impulse_response: &[Sample],
        head_block_size: usize,
        tail_block_size: usize,
    ) -> Result<Self, ConfigError> {
        if head_block_size == 0 || tail_block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if impulse_response.is_empty() {
            return Err(ConfigError::EmptyImpulseResponse);
        }

        let mut head_block_size = head_block_size.next_power_of_two();
        let mut tail_block_size = tail_block_size.next_power_of_two();
        if head_block_size > tail_block_size {
            warn!(
                "head block size {} exceeds tail block size {}, swapping",
                head_block_size, tail_block_size
            );
            std::mem::swap(&mut head_block_size, &mut tail_block_size);
        }

        let ir_len = impulse_response.len();
        let head_ir_len = std::cmp::min(ir_len, tail_block_size);
        let head = HeadStage::new(&impulse_response[..head_ir_len], head_block_size)?;
        let tail = TailStage::new(impulse_response, head_block_size, tail_block_size)?;

        debug!(
            "two-stage engine: {} taps, head {} taps ({}), tail {} taps",
            ir_len,
            head_ir_len,
            match head {
                HeadStage::Direct(_) => "direct".to_string(),
                HeadStage::Fft(_) => format!("fft/{}", head_block_size),
            },
            ir_len - head_ir_len
        );

        Ok(Self {
            ir_len,
            head_block_size,
            tail_block_size,
            head,
            tail,
            silent_frames: ir_len,
        })
    }

    /// Convolves `input` into `output`. A zero-length call does nothing.
    pub fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        let len = input.len().min(output.len());
        if len == 0 {
            return;
        }
        let (input, output) = (&input[..len], &mut output[..len]);

        // Settled and still silent: the stages hold no history
        if self.silent_frames >= self.ir_len && input.iter().all(|&x| x == 0.0) {
            output.fill(0.0);
            self.silent_frames = self.silent_frames.saturating_add(len);
            return;
        }

        self.head.process(input, output);
        if let Some(tail) = self.tail.as_mut() {
            tail.process(input, output, self.head_block_size, self.tail_block_size);
        }

        let mut run = self.silent_frames;
        for (y, &x) in output.iter_mut().zip(input) {
            run = if x == 0.0 { run.saturating_add(1) } else { 0 };
            if run >= self.ir_len {
                *y = 0.0;
            }
        }
        self.silent_frames = run;
        if run >= self.ir_len {
            self.reset_stages();
        }
    }

    pub fn reset(&mut self) {
        self.reset_stages();
        self.silent_frames = self.ir_len;
    }

    fn reset_stages(&mut self) {
        self.head.reset();
        if let Some(tail) = self.tail.as_mut() {
            tail.reset();
        }
    }

    pub fn len(&self) -> usize {
        self.ir_len
    }

    pub fn head_block_size(&self) -> usize {
        self.head_block_size
    }

    pub fn tail_block_size(&self) -> usize {
        self.tail_block_size
    }

    /// Whether any taps are handled by the tail stage.
    pub fn has_tail(&self) -> bool {
        self.tail.is_some()
    }
}
