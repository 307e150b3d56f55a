//! Error types for the streaming engine.
//!
//! Only fatal conditions are represented here. Overruns, underruns and short
//! transfers are handled inside the streaming loop and surface as counters in
//! the [`SessionReport`](crate::report::SessionReport).

use std::path::PathBuf;

use crate::device::Direction;

/// Coarse classification of a [`StreamError`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected before any file or device was opened.
    Configuration,
    /// A file or device could not be opened.
    Resource,
    /// The device failed while configuring or streaming.
    Device,
    /// The file failed while streaming.
    Io,
}

/// Fatal errors that end a stream session.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Bit depth outside of 8/16/24/32.
    #[error("unsupported bit depth: {bits} (expected 8, 16, 24 or 32)")]
    UnsupportedBitDepth {
        /// Requested depth.
        bits: u16,
    },

    /// Rate, channel count or another session parameter is unusable.
    #[error("invalid stream configuration: {reason}")]
    InvalidConfig {
        /// What was wrong.
        reason: String,
    },

    /// Another session still owns the cancellation context.
    #[error("a stream session is already active")]
    SessionActive,

    /// The capture/playback file could not be opened.
    #[error("cannot open {path}: {source}")]
    FileOpen {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The PCM device could not be opened.
    #[error("cannot open {direction} device '{device}': {reason}")]
    DeviceOpen {
        /// Device name as passed to the backend.
        device: String,
        /// Stream direction.
        direction: Direction,
        /// Backend message.
        reason: String,
    },

    /// The device rejected the requested hardware parameters.
    #[error("{direction} device rejected hardware parameters: {reason}")]
    Negotiation {
        /// Stream direction.
        direction: Direction,
        /// Backend message.
        reason: String,
    },

    /// A device operation failed for a reason other than an xrun.
    #[error("{direction} device {op} failed: {reason}")]
    Device {
        /// Stream direction.
        direction: Direction,
        /// Operation name (`read`, `write`, `prepare`).
        op: &'static str,
        /// Backend message.
        reason: String,
    },

    /// Reading or writing the PCM file failed mid-stream.
    #[error("{op} {path} failed: {source}")]
    Io {
        /// Operation name (`read` or `write`).
        op: &'static str,
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl StreamError {
    /// Returns the coarse error class.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedBitDepth { .. } | Self::InvalidConfig { .. } | Self::SessionActive => {
                ErrorKind::Configuration
            }
            Self::FileOpen { .. } | Self::DeviceOpen { .. } => ErrorKind::Resource,
            Self::Negotiation { .. } | Self::Device { .. } => ErrorKind::Device,
            Self::Io { .. } => ErrorKind::Io,
        }
    }

    pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_bit_depth_is_a_configuration_error() {
        let err = StreamError::UnsupportedBitDepth { bits: 12 };
        assert_eq!(err.kind(), ErrorKind::Configuration);
        assert_eq!(
            err.to_string(),
            "unsupported bit depth: 12 (expected 8, 16, 24 or 32)"
        );
    }

    #[test]
    fn device_errors_carry_direction_and_operation() {
        let err = StreamError::Device {
            direction: Direction::Capture,
            op: "read",
            reason: "No such device".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Device);
        assert_eq!(err.to_string(), "capture device read failed: No such device");
    }

    #[test]
    fn file_open_error_mentions_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err = StreamError::FileOpen {
            path: PathBuf::from("/tmp/take1.raw"),
            source: io_err,
        };
        assert_eq!(err.kind(), ErrorKind::Resource);
        assert!(err.to_string().contains("/tmp/take1.raw"));
    }
}
