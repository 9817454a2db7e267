use realfft::{ComplexToReal, FftError, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::sync::Arc;

use crate::{BlockConvolver, ConfigError, Sample};

/// Forward/inverse real FFT pair of one length with its own scratch space,
/// so transforms never allocate.
#[derive(Clone)]
pub struct Fft {
    fft_forward: Arc<dyn RealToComplex<f32>>,
    fft_inverse: Arc<dyn ComplexToReal<f32>>,
    forward_scratch: Vec<Complex<f32>>,
    inverse_scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for Fft {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fft({})", self.fft_forward.len())
    }
}

impl Fft {
    pub fn new(length: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft_forward = planner.plan_fft_forward(length);
        let fft_inverse = planner.plan_fft_inverse(length);
        let forward_scratch = fft_forward.make_scratch_vec();
        let inverse_scratch = fft_inverse.make_scratch_vec();
        Self {
            fft_forward,
            fft_inverse,
            forward_scratch,
            inverse_scratch,
        }
    }

    pub fn len(&self) -> usize {
        self.fft_forward.len()
    }

    pub fn forward(
        &mut self,
        input: &mut [f32],
        output: &mut [Complex<f32>],
    ) -> Result<(), FftError> {
        self.fft_forward
            .process_with_scratch(input, output, &mut self.forward_scratch)
    }

    pub fn inverse(
        &mut self,
        input: &mut [Complex<f32>],
        output: &mut [f32],
    ) -> Result<(), FftError> {
        // DC and Nyquist bins of a real signal have no imaginary part
        if let Some(first) = input.first_mut() {
            first.im = 0.;
        }
        if output.len() % 2 == 0 {
            if let Some(last) = input.last_mut() {
                last.im = 0.;
            }
        }

        self.fft_inverse
            .process_with_scratch(input, output, &mut self.inverse_scratch)?;

        // FFT Normalization
        let len = output.len();
        output.iter_mut().for_each(|bin| *bin /= len as f32);

        Ok(())
    }
}

pub fn complex_size(size: usize) -> usize {
    (size / 2) + 1
}

pub fn copy_and_pad(dst: &mut [f32], src: &[f32], src_size: usize) {
    assert!(dst.len() >= src_size);
    dst[0..src_size].copy_from_slice(&src[0..src_size]);
    dst[src_size..].fill(0.);
}

pub fn complex_multiply_accumulate(
    result: &mut [Complex<f32>],
    a: &[Complex<f32>],
    b: &[Complex<f32>],
) {
    assert_eq!(result.len(), a.len());
    assert_eq!(result.len(), b.len());
    let len = result.len();
    let end4 = 4 * (len / 4);
    for i in (0..end4).step_by(4) {
        result[i].re += a[i].re * b[i].re - a[i].im * b[i].im;
        result[i + 1].re += a[i + 1].re * b[i + 1].re - a[i + 1].im * b[i + 1].im;
        result[i + 2].re += a[i + 2].re * b[i + 2].re - a[i + 2].im * b[i + 2].im;
        result[i + 3].re += a[i + 3].re * b[i + 3].re - a[i + 3].im * b[i + 3].im;
        result[i].im += a[i].re * b[i].im + a[i].im * b[i].re;
        result[i + 1].im += a[i + 1].re * b[i + 1].im + a[i + 1].im * b[i + 1].re;
        result[i + 2].im += a[i + 2].re * b[i + 2].im + a[i + 2].im * b[i + 2].re;
        result[i + 3].im += a[i + 3].re * b[i + 3].im + a[i + 3].im * b[i + 3].re;
    }
    for i in end4..len {
        result[i].re += a[i].re * b[i].re - a[i].im * b[i].im;
        result[i].im += a[i].re * b[i].im + a[i].im * b[i].re;
    }
}

pub fn sum(result: &mut [f32], a: &[f32], b: &[f32]) {
    assert_eq!(result.len(), a.len());
    assert_eq!(result.len(), b.len());
    for ((r, &x), &y) in result.iter_mut().zip(a).zip(b) {
        *r = x + y;
    }
}

/// Uniformly partitioned FFT convolution.
///
/// The response is cut into segments of `block_size` taps (rounded up to a
/// power of two), each stored as the spectrum of a zero-padded
/// `2 * block_size` frame. Input spectra go into a ring of the same depth.
/// A partially filled input block is transformed on every call, so output
/// is produced without latency; the contribution of the older segments is
/// computed once per block and reused until the block is complete.
#[derive(Clone, Debug)]
pub struct FFTConvolver {
    ir_len: usize,
    block_size: usize,
    seg_count: usize,
    segments: Vec<Vec<Complex<f32>>>,
    segments_ir: Vec<Vec<Complex<f32>>>,
    fft_buffer: Vec<f32>,
    fft: Fft,
    pre_multiplied: Vec<Complex<f32>>,
    conv: Vec<Complex<f32>>,
    overlap: Vec<f32>,
    current: usize,
    input_buffer: Vec<f32>,
    input_buffer_fill: usize,
}

impl FFTConvolver {
    /// Partition length actually used.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn segment_count(&self) -> usize {
        self.seg_count
    }
}

impl BlockConvolver for FFTConvolver {
    fn new(impulse_response: &[Sample], block_size: usize) -> Result<Self, ConfigError> {
        if block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        let ir_len = impulse_response.len();
        if ir_len == 0 {
            return Err(ConfigError::EmptyImpulseResponse);
        }

        let block_size = block_size.next_power_of_two();
        let seg_size = 2 * block_size;
        let seg_count = ir_len.div_ceil(block_size);
        let fft_complex_size = complex_size(seg_size);

        let mut fft = Fft::new(seg_size);
        let mut fft_buffer = vec![0.; seg_size];

        // prepare segments
        let segments = vec![vec![Complex::new(0., 0.); fft_complex_size]; seg_count];
        let mut segments_ir = Vec::with_capacity(seg_count);

        // prepare ir
        for ir_segment in impulse_response.chunks(block_size) {
            let mut segment = vec![Complex::new(0., 0.); fft_complex_size];
            copy_and_pad(&mut fft_buffer, ir_segment, ir_segment.len());
            fft.forward(&mut fft_buffer, &mut segment)
                .map_err(|err| ConfigError::Fft(err.to_string()))?;
            segments_ir.push(segment);
        }

        Ok(Self {
            ir_len,
            block_size,
            seg_count,
            segments,
            segments_ir,
            fft_buffer,
            fft,
            pre_multiplied: vec![Complex::new(0., 0.); fft_complex_size],
            conv: vec![Complex::new(0., 0.); fft_complex_size],
            overlap: vec![0.; block_size],
            current: 0,
            input_buffer: vec![0.; block_size],
            input_buffer_fill: 0,
        })
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        let len = input.len().min(output.len());

        let mut processed = 0;
        while processed < len {
            let input_buffer_was_empty = self.input_buffer_fill == 0;
            let processing =
                std::cmp::min(len - processed, self.block_size - self.input_buffer_fill);

            let input_buffer_pos = self.input_buffer_fill;
            self.input_buffer[input_buffer_pos..input_buffer_pos + processing]
                .copy_from_slice(&input[processed..processed + processing]);

            // Forward FFT
            copy_and_pad(&mut self.fft_buffer, &self.input_buffer, self.block_size);
            if self
                .fft
                .forward(&mut self.fft_buffer, &mut self.segments[self.current])
                .is_err()
            {
                output[processed..len].fill(0.);
                return;
            }

            // Older segments only change when a new block starts
            if input_buffer_was_empty {
                self.pre_multiplied.fill(Complex::new(0., 0.));
                for i in 1..self.seg_count {
                    let index_audio = (self.current + i) % self.seg_count;
                    complex_multiply_accumulate(
                        &mut self.pre_multiplied,
                        &self.segments_ir[i],
                        &self.segments[index_audio],
                    );
                }
            }
            self.conv.copy_from_slice(&self.pre_multiplied);
            complex_multiply_accumulate(
                &mut self.conv,
                &self.segments[self.current],
                &self.segments_ir[0],
            );

            // Backward FFT
            if self.fft.inverse(&mut self.conv, &mut self.fft_buffer).is_err() {
                output[processed..len].fill(0.);
                return;
            }

            // Add overlap
            sum(
                &mut output[processed..processed + processing],
                &self.fft_buffer[input_buffer_pos..input_buffer_pos + processing],
                &self.overlap[input_buffer_pos..input_buffer_pos + processing],
            );

            // Input buffer full => Next block
            self.input_buffer_fill += processing;
            if self.input_buffer_fill == self.block_size {
                self.input_buffer.fill(0.);
                self.input_buffer_fill = 0;
                self.overlap
                    .copy_from_slice(&self.fft_buffer[self.block_size..self.block_size * 2]);

                self.current = if self.current > 0 {
                    self.current - 1
                } else {
                    self.seg_count - 1
                };
            }
            processed += processing;
        }
    }

    fn reset(&mut self) {
        for segment in self.segments.iter_mut() {
            segment.fill(Complex::new(0., 0.));
        }
        self.fft_buffer.fill(0.);
        self.pre_multiplied.fill(Complex::new(0., 0.));
        self.conv.fill(Complex::new(0., 0.));
        self.overlap.fill(0.);
        self.input_buffer.fill(0.);
        self.input_buffer_fill = 0;
        self.current = 0;
    }

    fn len(&self) -> usize {
        self.ir_len
    }
}
