//! Audio device backend (CPAL)
//!
//! cpal exposes capture and playback as two independent streams, so the
//! duplex session is assembled from one input stream feeding the capture
//! ring and one output stream running the convolution.

pub mod device;
pub mod duplex;

pub use device::{list_devices, AudioDevice, DeviceKind};
pub use duplex::CpalDuplex;
