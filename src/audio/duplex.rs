//! CPAL duplex session built from the default input and output devices.

use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, DefaultStreamConfigError, Stream, StreamConfig, SupportedStreamConfig};
use crossbeam::channel::{self, Receiver, Sender};

use super::device::device_name;
use crate::stream::{CaptureFeed, DuplexDevice, RealtimeProcessor};
use crate::{StreamError, MAX_OUTPUT_CHANNELS};

/// Device errors queued for the control thread; extras are dropped.
const DEVICE_ERROR_CAPACITY: usize = 16;

/// Keeps both streams alive while running. Dropping the streams stops
/// audio.
pub struct CpalDuplex {
    input_device: cpal::Device,
    output_device: cpal::Device,
    input_name: String,
    output_name: String,
    input_config: StreamConfig,
    output_config: StreamConfig,
    streams: Option<(Stream, Stream)>,
    error_tx: Sender<StreamError>,
    error_rx: Receiver<StreamError>,
}

fn stream_config(
    device: &str,
    supported: Result<SupportedStreamConfig, DefaultStreamConfigError>,
    sample_rate: u32,
) -> Result<StreamConfig, StreamError> {
    let supported = supported.map_err(|e| StreamError::DeviceConfig {
        device: device.to_string(),
        reason: e.to_string(),
    })?;
    Ok(StreamConfig {
        channels: supported.channels().min(MAX_OUTPUT_CHANNELS as u16),
        sample_rate: cpal::SampleRate(sample_rate),
        buffer_size: BufferSize::Default,
    })
}

/// Stream error callback. Never blocks; errors past the queue capacity are
/// dropped.
fn forward_errors(tx: Sender<StreamError>) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        let _ = tx.try_send(StreamError::Device(err.to_string()));
    }
}

impl CpalDuplex {
    /// Opens the default capture and playback devices at `sample_rate`
    /// with at most two channels each.
    pub fn open_default(sample_rate: u32) -> Result<Self, StreamError> {
        let host = cpal::default_host();
        let input_device = host
            .default_input_device()
            .ok_or(StreamError::NoDefaultDevice("input"))?;
        let output_device = host
            .default_output_device()
            .ok_or(StreamError::NoDefaultDevice("output"))?;
        let input_name = device_name(&input_device);
        let output_name = device_name(&output_device);

        let input_config = stream_config(
            &input_name,
            input_device.default_input_config(),
            sample_rate,
        )?;
        let output_config = stream_config(
            &output_name,
            output_device.default_output_config(),
            sample_rate,
        )?;

        log::info!(
            "Capture: {} ({} ch), playback: {} ({} ch), {} Hz",
            input_name,
            input_config.channels,
            output_name,
            output_config.channels,
            sample_rate
        );

        let (error_tx, error_rx) = channel::bounded(DEVICE_ERROR_CAPACITY);
        Ok(Self {
            input_device,
            output_device,
            input_name,
            output_name,
            input_config,
            output_config,
            streams: None,
            error_tx,
            error_rx,
        })
    }

    fn error_callback(&self) -> impl FnMut(cpal::StreamError) + Send + 'static {
        forward_errors(self.error_tx.clone())
    }
}

impl DuplexDevice for CpalDuplex {
    fn input_channels(&self) -> usize {
        self.input_config.channels as usize
    }

    fn output_channels(&self) -> usize {
        self.output_config.channels as usize
    }

    fn sample_rate(&self) -> u32 {
        self.output_config.sample_rate.0
    }

    fn start(
        &mut self,
        mut feed: CaptureFeed,
        mut processor: RealtimeProcessor,
    ) -> Result<(), StreamError> {
        let input_stream = self
            .input_device
            .build_input_stream(
                &self.input_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    feed.push(data);
                },
                self.error_callback(),
                None,
            )
            .map_err(|e| StreamError::StreamBuild {
                device: self.input_name.clone(),
                reason: e.to_string(),
            })?;

        let output_stream = self
            .output_device
            .build_output_stream(
                &self.output_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    processor.render(data);
                },
                self.error_callback(),
                None,
            )
            .map_err(|e| StreamError::StreamBuild {
                device: self.output_name.clone(),
                reason: e.to_string(),
            })?;

        input_stream.play().map_err(|e| StreamError::StreamPlay {
            device: self.input_name.clone(),
            reason: e.to_string(),
        })?;
        output_stream.play().map_err(|e| StreamError::StreamPlay {
            device: self.output_name.clone(),
            reason: e.to_string(),
        })?;

        self.streams = Some((input_stream, output_stream));
        Ok(())
    }

    fn stop(&mut self) {
        self.streams = None;
    }

    fn poll_error(&mut self, timeout: Duration) -> Option<StreamError> {
        self.error_rx.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn callback_errors_reach_the_control_thread_without_blocking() {
        let (tx, rx) = channel::bounded(DEVICE_ERROR_CAPACITY);
        let mut callback = forward_errors(tx);
        for _ in 0..DEVICE_ERROR_CAPACITY + 4 {
            callback(cpal::StreamError::DeviceNotAvailable);
        }

        let first = rx.recv_timeout(Duration::from_millis(10)).unwrap();
        assert!(matches!(first, StreamError::Device(_)));
        assert_eq!(rx.try_iter().count(), DEVICE_ERROR_CAPACITY - 1);
        assert!(rx.recv_timeout(Duration::from_millis(1)).is_err());
    }
}
