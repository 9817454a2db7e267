use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};

use irconv::audio::{self, CpalDuplex};
use irconv::cli::{Cli, Command, RunConfig, RunMode};
use irconv::stream::{DuplexDevice, OfflineDriver, RealtimeController, StreamSource};
use irconv::wav::{self, WavSink, WavSource};
use irconv::{ChannelPipeline, ImpulseResponse, REALTIME_MAX_BLOCK_FRAMES};

/// Capture frames buffered between the input and output callbacks.
const CAPTURE_RING_FRAMES: usize = REALTIME_MAX_BLOCK_FRAMES;

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let command = match Cli::parse().into_command() {
        Ok(command) => command,
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    let result = match command {
        Command::ListDevices => audio::list_devices().context("listing audio devices"),
        Command::Run(config) => run(&config),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &RunConfig) -> Result<()> {
    let kernel = wav::load_impulse_response(&config.kernel)
        .with_context(|| format!("loading impulse response {}", config.kernel.display()))?;

    match &config.mode {
        RunMode::Realtime => run_realtime(config, &kernel),
        RunMode::Offline { input, output } => {
            let mut source = WavSource::open(input)
                .with_context(|| format!("opening {}", input.display()))?;
            check_sample_rate(&kernel, source.sample_rate());

            let input_channels = source.channels();
            let output_channels = input_channels.max(kernel.num_channels());
            let chunk_frames = irconv::OFFLINE_BUFFER_SAMPLES / input_channels;
            let pipeline =
                ChannelPipeline::new(&kernel, input_channels, output_channels, chunk_frames)?;

            let mut sink = WavSink::create(output, output_channels, source.sample_rate())
                .with_context(|| format!("creating {}", output.display()))?;
            info!(
                "Offline: {} ({} ch, {} frames) -> {} ({} ch)",
                input.display(),
                input_channels,
                source.len_frames(),
                output.display(),
                output_channels
            );

            OfflineDriver::new(pipeline)
                .run(&mut source, &mut sink)
                .with_context(|| {
                    format!("convolving {} into {}", input.display(), output.display())
                })?;
            Ok(())
        }
    }
}

fn run_realtime(config: &RunConfig, kernel: &ImpulseResponse) -> Result<()> {
    let sample_rate = config.sample_rate;
    check_sample_rate(kernel, sample_rate);

    let device = CpalDuplex::open_default(sample_rate).context("opening audio devices")?;
    let pipeline = ChannelPipeline::new(
        kernel,
        device.input_channels(),
        device.output_channels(),
        REALTIME_MAX_BLOCK_FRAMES,
    )?;

    let mut controller = RealtimeController::new(device, CAPTURE_RING_FRAMES);
    controller.start(pipeline).context("starting audio devices")?;
    controller
        .run(Duration::from_secs(1))
        .context("audio device failed")?;
    Ok(())
}

fn check_sample_rate(kernel: &ImpulseResponse, stream_rate: u32) {
    if kernel.sample_rate() != stream_rate {
        warn!(
            "Impulse response is {} Hz but the stream runs at {} Hz; no resampling is done",
            kernel.sample_rate(),
            stream_rate
        );
    }
}
