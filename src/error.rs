//! Error types

use std::path::PathBuf;

use thiserror::Error;

/// Invalid setup: always fatal, reported before any audio is processed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Impulse response is empty")]
    EmptyImpulseResponse,

    #[error("Block size must be positive")]
    ZeroBlockSize,

    #[error("FFT setup failed: {0}")]
    Fft(String),

    #[error("Channel count must be positive ({0})")]
    ZeroChannels(&'static str),

    #[error("{requested} output channels requested, at most {max} supported")]
    TooManyOutputChannels { requested: usize, max: usize },

    #[error("Impulse response channels have different lengths")]
    RaggedImpulseResponse,

    #[error("Missing impulse response path")]
    MissingKernel,

    #[error("Input and output files must be given together")]
    UnpairedFiles,

    #[error(
        "{path}: must have 1 or {max} channels, has {channels}",
        max = crate::MAX_OUTPUT_CHANNELS
    )]
    UnsupportedChannelLayout { path: PathBuf, channels: usize },
}

/// Device or file failure: fatal in both modes, never retried.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("{path}: read/decode error: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("{path}: encode error: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error("{path}: failed to read entire file (read {read} of {expected} frames)")]
    ShortRead {
        path: PathBuf,
        read: usize,
        expected: usize,
    },

    #[error("Stream has {actual} channels, pipeline expects {expected}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("No default audio {0} device")]
    NoDefaultDevice(&'static str),

    #[error("Failed to get device config for {device}: {reason}")]
    DeviceConfig { device: String, reason: String },

    #[error("Failed to build audio stream on {device}: {reason}")]
    StreamBuild { device: String, reason: String },

    #[error("Failed to start audio stream on {device}: {reason}")]
    StreamPlay { device: String, reason: String },

    #[error("Audio stream error: {0}")]
    Device(String),

    #[error("Failed to enumerate audio devices: {0}")]
    Enumerate(String),

    #[error("Real-time session is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Stream(#[from] StreamError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
