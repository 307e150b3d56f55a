//! PCM device boundary.
//!
//! The engine talks to hardware only through [`PcmBackend`] and [`PcmDevice`]:
//! - [`crate::alsa::AlsaBackend`] drives real sound cards on Linux
//! - [`crate::mock::MockBackend`] is an in-memory device for tests
//!
//! Closing a device is dropping its handle.

use std::fmt;

use serde::Serialize;

use crate::format::SampleEncoding;

/// Transfer direction of a stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Capture,
    Playback,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::Playback => f.write_str("playback"),
        }
    }
}

/// Hardware configuration requested from a device.
///
/// Access is always interleaved read/write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwRequest {
    pub encoding: SampleEncoding,
    pub channels: u16,
    pub rate: u32,
    pub period_frames: usize,
    pub buffer_time_us: u32,
    pub period_time_us: u32,
}

/// Configuration the device actually committed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HwGrant {
    pub rate: u32,
    pub period_frames: usize,
    pub buffer_frames: usize,
}

/// Failure reported by a device operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    /// Overrun on capture or underrun on playback. Recoverable with
    /// [`PcmDevice::recover`].
    #[error("xrun")]
    Xrun,
    /// Anything else; fatal for the session.
    #[error("{0}")]
    Backend(String),
}

impl DeviceError {
    pub fn backend(err: impl fmt::Display) -> Self {
        Self::Backend(err.to_string())
    }
}

/// One open PCM stream.
pub trait PcmDevice {
    /// Apply `request` and report what was granted.
    fn configure(&mut self, request: &HwRequest) -> Result<HwGrant, DeviceError>;

    /// Read interleaved frames into `buf`, which holds a whole number of frames.
    /// Returns the number of frames read. Blocks until data is available.
    fn read_frames(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError>;

    /// Write the interleaved frames in `buf`. Returns the number of frames accepted.
    fn write_frames(&mut self, buf: &[u8]) -> Result<usize, DeviceError>;

    /// Bring the stream back to a runnable state after an xrun.
    fn recover(&mut self) -> Result<(), DeviceError>;

    /// Block until queued frames have been played (playback) or stop the stream (capture).
    fn drain(&mut self) -> Result<(), DeviceError>;
}

/// Opens PCM streams by name.
pub trait PcmBackend {
    fn open(&self, name: &str, direction: Direction) -> Result<Box<dyn PcmDevice>, DeviceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_display_is_lowercase() {
        assert_eq!(Direction::Capture.to_string(), "capture");
        assert_eq!(Direction::Playback.to_string(), "playback");
    }

    #[test]
    fn backend_error_keeps_message() {
        let err = DeviceError::backend("Device or resource busy");
        assert_eq!(err.to_string(), "Device or resource busy");
        assert_ne!(err, DeviceError::Xrun);
    }
}
