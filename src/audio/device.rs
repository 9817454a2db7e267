//! Audio device enumeration

use cpal::traits::{DeviceTrait, HostTrait};

use crate::StreamError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Output,
    Input,
}

impl DeviceKind {
    fn label(self) -> &'static str {
        match self {
            DeviceKind::Output => "output",
            DeviceKind::Input => "input",
        }
    }
}

/// One device of the default host
#[derive(Clone, Debug)]
pub struct AudioDevice {
    pub kind: DeviceKind,
    /// Position in the host's device list for this kind
    pub index: usize,
    pub name: String,
    pub is_default: bool,
}

pub(crate) fn device_name(device: &cpal::Device) -> String {
    device.name().unwrap_or_else(|_| "<unknown>".to_string())
}

/// Output devices first, then input devices.
pub fn get_devices() -> Result<Vec<AudioDevice>, StreamError> {
    let host = cpal::default_host();
    let default_output = host.default_output_device().map(|d| device_name(&d));
    let default_input = host.default_input_device().map(|d| device_name(&d));

    let mut devices = Vec::new();

    let outputs = host
        .output_devices()
        .map_err(|e| StreamError::Enumerate(e.to_string()))?;
    for (index, device) in outputs.enumerate() {
        let name = device_name(&device);
        devices.push(AudioDevice {
            kind: DeviceKind::Output,
            index,
            is_default: default_output.as_deref() == Some(name.as_str()),
            name,
        });
    }

    let inputs = host
        .input_devices()
        .map_err(|e| StreamError::Enumerate(e.to_string()))?;
    for (index, device) in inputs.enumerate() {
        let name = device_name(&device);
        devices.push(AudioDevice {
            kind: DeviceKind::Input,
            index,
            is_default: default_input.as_deref() == Some(name.as_str()),
            name,
        });
    }

    log::debug!("Found {} audio devices on {:?}", devices.len(), host.id());
    Ok(devices)
}

pub fn format_devices(devices: &[AudioDevice]) -> String {
    let mut out = String::from("Audio devices:\n");
    for device in devices {
        out.push('\n');
        out.push_str(&format!("  Type:     {}\n", device.kind.label()));
        out.push_str(&format!("  Id:       {}\n", device.index));
        out.push_str(&format!("  Name:     {}\n", device.name));
        out.push_str(&format!(
            "  Default:  {}\n",
            if device.is_default { "YES" } else { "no" }
        ));
    }
    out.push('\n');
    out
}

/// Prints all devices to stdout.
pub fn list_devices() -> Result<(), StreamError> {
    let devices = get_devices()?;
    print!("{}", format_devices(&devices));
    Ok(())
}
