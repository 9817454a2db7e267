use crate::{BlockConvolver, ConfigError, Sample};

/// Direct-form FIR over a circular delay line.
///
/// Zero latency and no block structure, so it is only worth using for short
/// responses. `block_size` is accepted for interface parity and ignored.
#[derive(Clone, Debug)]
pub struct DirectConvolver {
    coefficients: Vec<Sample>,
    delay_line: Vec<Sample>,
    /// Slot of the newest input sample; older samples follow it.
    position: usize,
}

impl DirectConvolver {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        self.delay_line[self.position] = input;

        let len = self.coefficients.len();
        let first_part = len - self.position;
        let (newer, older) = self.coefficients.split_at(first_part);

        let mut output = 0.0;
        for (c, x) in newer.iter().zip(&self.delay_line[self.position..]) {
            output += c * x;
        }
        for (c, x) in older.iter().zip(&self.delay_line[..self.position]) {
            output += c * x;
        }

        self.position = if self.position > 0 {
            self.position - 1
        } else {
            len - 1
        };
        output
    }
}

impl BlockConvolver for DirectConvolver {
    fn new(response: &[Sample], block_size: usize) -> Result<Self, ConfigError> {
        if block_size == 0 {
            return Err(ConfigError::ZeroBlockSize);
        }
        if response.is_empty() {
            return Err(ConfigError::EmptyImpulseResponse);
        }
        Ok(Self {
            coefficients: response.to_vec(),
            delay_line: vec![0.0; response.len()],
            position: 0,
        })
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        for (y, &x) in output.iter_mut().zip(input) {
            *y = self.process_sample(x);
        }
    }

    fn reset(&mut self) {
        self.delay_line.fill(0.0);
        self.position = 0;
    }

    fn len(&self) -> usize {
        self.coefficients.len()
    }
}
