//! Command line parsing

use std::path::PathBuf;

use clap::Parser;

use crate::{ConfigError, DEFAULT_SAMPLE_RATE, MAX_SAMPLE_RATE, MIN_SAMPLE_RATE};

#[derive(Debug, Parser, Clone)]
#[command(name = "irconv")]
#[command(about = "Convolve live or file audio with an impulse response")]
pub struct Cli {
    /// Impulse response WAV file.
    #[arg(required_unless_present = "list_devices")]
    pub kernel: Option<PathBuf>,

    /// Input WAV file. Omit both files to run on the default audio devices.
    pub input: Option<PathBuf>,

    /// Output WAV file.
    pub output: Option<PathBuf>,

    /// Device sample rate.
    #[arg(
        short = 'S',
        long,
        default_value_t = DEFAULT_SAMPLE_RATE,
        value_parser = clap::value_parser!(u32)
            .range(MIN_SAMPLE_RATE as i64..=MAX_SAMPLE_RATE as i64)
    )]
    pub sample_rate: u32,

    /// List available audio devices.
    #[arg(short = 'L', long)]
    pub list_devices: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RunMode {
    /// Default capture device -> default playback device.
    Realtime,
    /// File to file conversion.
    Offline { input: PathBuf, output: PathBuf },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    pub kernel: PathBuf,
    pub mode: RunMode,
    /// Rate used to open audio devices.
    pub sample_rate: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Run(RunConfig),
    ListDevices,
}

impl Cli {
    /// Resolves the positional combination. Input and output files must be
    /// given together.
    pub fn into_command(self) -> Result<Command, ConfigError> {
        if self.list_devices {
            return Ok(Command::ListDevices);
        }
        let kernel = self.kernel.ok_or(ConfigError::MissingKernel)?;
        let mode = match (self.input, self.output) {
            (None, None) => RunMode::Realtime,
            (Some(input), Some(output)) => RunMode::Offline { input, output },
            _ => return Err(ConfigError::UnpairedFiles),
        };
        Ok(Command::Run(RunConfig {
            kernel,
            mode,
            sample_rate: self.sample_rate,
        }))
    }
}
