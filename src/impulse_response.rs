use crate::{ConfigError, Sample};

/// Planar impulse response: one tap sequence per channel, all the same
/// length. Immutable once built.
#[derive(Clone, Debug, PartialEq)]
pub struct ImpulseResponse {
    channels: Vec<Vec<Sample>>,
    sample_rate: u32,
}

impl ImpulseResponse {
    pub fn from_planar(channels: Vec<Vec<Sample>>, sample_rate: u32) -> Result<Self, ConfigError> {
        let frames = channels
            .first()
            .map(Vec::len)
            .ok_or(ConfigError::ZeroChannels("impulse response"))?;
        if frames == 0 {
            return Err(ConfigError::EmptyImpulseResponse);
        }
        if channels.iter().any(|channel| channel.len() != frames) {
            return Err(ConfigError::RaggedImpulseResponse);
        }
        Ok(Self {
            channels,
            sample_rate,
        })
    }

    /// Deinterleaves frame-major samples. A trailing partial frame is
    /// dropped.
    pub fn from_interleaved(
        samples: &[Sample],
        num_channels: usize,
        sample_rate: u32,
    ) -> Result<Self, ConfigError> {
        if num_channels == 0 {
            return Err(ConfigError::ZeroChannels("impulse response"));
        }
        let frames = samples.len() / num_channels;
        let mut channels = vec![Vec::with_capacity(frames); num_channels];
        for frame in samples.chunks_exact(num_channels) {
            for (channel, &sample) in channels.iter_mut().zip(frame) {
                channel.push(sample);
            }
        }
        Self::from_planar(channels, sample_rate)
    }

    pub fn mono(taps: Vec<Sample>, sample_rate: u32) -> Result<Self, ConfigError> {
        Self::from_planar(vec![taps], sample_rate)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    /// Length in frames.
    pub fn len(&self) -> usize {
        self.channels[0].len()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f32 {
        self.len() as f32 / self.sample_rate as f32
    }

    pub fn channel(&self, index: usize) -> &[Sample] {
        &self.channels[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deinterleaves_frames() {
        let ir = ImpulseResponse::from_interleaved(&[1.0, 2.0, 3.0, 4.0, 5.0], 2, 44_100).unwrap();
        assert_eq!(ir.num_channels(), 2);
        assert_eq!(ir.len(), 2);
        assert_eq!(ir.channel(0), &[1.0, 3.0]);
        assert_eq!(ir.channel(1), &[2.0, 4.0]);
    }

    #[test]
    fn rejects_empty_and_ragged_channels() {
        assert_eq!(
            ImpulseResponse::from_planar(vec![], 48_000).unwrap_err(),
            ConfigError::ZeroChannels("impulse response")
        );
        assert_eq!(
            ImpulseResponse::mono(vec![], 48_000).unwrap_err(),
            ConfigError::EmptyImpulseResponse
        );
        assert_eq!(
            ImpulseResponse::from_planar(vec![vec![1.0, 0.0], vec![1.0]], 48_000).unwrap_err(),
            ConfigError::RaggedImpulseResponse
        );
    }
}
