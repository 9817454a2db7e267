//! WAV file access for impulse responses and offline conversion.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use log::info;

use crate::stream::{StreamSink, StreamSource};
use crate::{ConfigError, ImpulseResponse, Result, Sample, StreamError, MAX_OUTPUT_CHANNELS};

fn decode_error(path: &Path) -> impl Fn(hound::Error) -> StreamError + '_ {
    move |source| StreamError::Decode {
        path: path.to_path_buf(),
        source,
    }
}

fn encode_error(path: &Path) -> impl Fn(hound::Error) -> StreamError + '_ {
    move |source| StreamError::Encode {
        path: path.to_path_buf(),
        source,
    }
}

/// Reads up to `out.len()` samples, scaling integer PCM to `[-1, 1)`.
fn read_samples(
    reader: &mut WavReader<BufReader<File>>,
    spec: WavSpec,
    out: &mut [Sample],
    path: &Path,
) -> std::result::Result<usize, StreamError> {
    let mut n = 0;
    match spec.sample_format {
        SampleFormat::Float => {
            for (slot, sample) in out.iter_mut().zip(reader.samples::<f32>()) {
                *slot = sample.map_err(decode_error(path))?;
                n += 1;
            }
        }
        SampleFormat::Int => {
            let scale = 2.0f32.powi(spec.bits_per_sample as i32 - 1);
            for (slot, sample) in out.iter_mut().zip(reader.samples::<i32>()) {
                *slot = sample.map_err(decode_error(path))? as f32 / scale;
                n += 1;
            }
        }
    }
    Ok(n)
}

/// Loads the whole file as a planar impulse response. The file must have
/// one or two channels.
pub fn load_impulse_response(path: impl AsRef<Path>) -> Result<ImpulseResponse> {
    let path = path.as_ref();
    let mut reader = WavReader::open(path).map_err(decode_error(path))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 || channels > MAX_OUTPUT_CHANNELS {
        return Err(ConfigError::UnsupportedChannelLayout {
            path: path.to_path_buf(),
            channels,
        }
        .into());
    }

    let frames = reader.duration() as usize;
    if frames == 0 {
        return Err(ConfigError::EmptyImpulseResponse.into());
    }
    let mut samples = vec![0.0; frames * channels];
    let read = read_samples(&mut reader, spec, &mut samples, path)?;
    if read != samples.len() {
        return Err(StreamError::ShortRead {
            path: path.to_path_buf(),
            read: read / channels,
            expected: frames,
        }
        .into());
    }

    let ir = ImpulseResponse::from_interleaved(&samples, channels, spec.sample_rate)?;
    info!(
        "Kernel: {}; {} channel{}; {:.1} seconds ({} frames)",
        path.display(),
        ir.num_channels(),
        if ir.num_channels() > 1 { "s" } else { "" },
        ir.duration_secs(),
        ir.len()
    );
    Ok(ir)
}

/// Streaming WAV reader.
pub struct WavSource {
    reader: WavReader<BufReader<File>>,
    spec: WavSpec,
    path: PathBuf,
}

impl WavSource {
    /// Opens `path`; files with more than two channels are rejected.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = WavReader::open(&path).map_err(decode_error(&path))?;
        let spec = reader.spec();
        let channels = spec.channels as usize;
        if channels == 0 || channels > MAX_OUTPUT_CHANNELS {
            return Err(ConfigError::UnsupportedChannelLayout { path, channels }.into());
        }
        Ok(Self { reader, spec, path })
    }

    /// Total length in frames, from the header.
    pub fn len_frames(&self) -> u32 {
        self.reader.duration()
    }
}

impl StreamSource for WavSource {
    fn channels(&self) -> usize {
        self.spec.channels as usize
    }

    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn read(&mut self, buffer: &mut [Sample]) -> std::result::Result<usize, StreamError> {
        let channels = self.channels();
        let wanted = (buffer.len() / channels) * channels;
        let n = read_samples(&mut self.reader, self.spec, &mut buffer[..wanted], &self.path)?;
        Ok(n / channels)
    }
}

/// Streaming 32-bit float WAV writer.
pub struct WavSink {
    writer: Option<WavWriter<BufWriter<File>>>,
    channels: usize,
    path: PathBuf,
}

impl WavSink {
    pub fn create(path: impl AsRef<Path>, channels: usize, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if channels == 0 {
            return Err(ConfigError::ZeroChannels("output file").into());
        }
        let spec = WavSpec {
            channels: channels as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(&path, spec).map_err(encode_error(&path))?;
        Ok(Self {
            writer: Some(writer),
            channels,
            path,
        })
    }
}

impl StreamSink for WavSink {
    fn channels(&self) -> usize {
        self.channels
    }

    fn write(&mut self, samples: &[Sample]) -> std::result::Result<(), StreamError> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            StreamError::Io(std::io::Error::other("write after finish"))
        })?;
        for &sample in samples {
            writer.write_sample(sample).map_err(encode_error(&self.path))?;
        }
        Ok(())
    }

    fn finish(&mut self) -> std::result::Result<(), StreamError> {
        match self.writer.take() {
            Some(writer) => writer.finalize().map_err(encode_error(&self.path)),
            None => Ok(()),
        }
    }
}
