//! Session parameters and resource lifecycle.
//!
//! [`acquire`] opens the file, opens the device, negotiates and allocates the
//! transfer buffer, in that order. [`SessionHandles::release`] undoes all of it
//! in reverse order and is safe to call any number of times; it also runs on
//! drop, so a failed acquisition never leaks a handle.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cancel::CancellationFlag;
use crate::config::NegotiationPolicy;
use crate::device::{Direction, PcmBackend, PcmDevice};
use crate::error::StreamError;
use crate::format::HardwareFormat;
use crate::negotiate::{NegotiatedParams, negotiate};

/// One record or playback invocation.
#[derive(Clone, Debug)]
pub struct StreamSession {
    pub direction: Direction,
    pub path: PathBuf,
    pub device: String,
    pub rate: u32,
    pub bit_depth: u16,
    pub channels: u16,
    /// Capture length; `None` records until cancelled. Ignored for playback.
    pub duration: Option<Duration>,
    pub policy: NegotiationPolicy,
}

impl StreamSession {
    pub fn capture(path: impl Into<PathBuf>, rate: u32, bit_depth: u16, channels: u16) -> Self {
        Self::new(Direction::Capture, path.into(), rate, bit_depth, channels)
    }

    pub fn playback(path: impl Into<PathBuf>, rate: u32, bit_depth: u16, channels: u16) -> Self {
        Self::new(Direction::Playback, path.into(), rate, bit_depth, channels)
    }

    fn new(direction: Direction, path: PathBuf, rate: u32, bit_depth: u16, channels: u16) -> Self {
        Self {
            direction,
            path,
            device: crate::DEFAULT_DEVICE.to_string(),
            rate,
            bit_depth,
            channels,
            duration: None,
            policy: NegotiationPolicy::default(),
        }
    }

    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    /// A zero duration means "until cancelled".
    pub fn with_duration(mut self, duration: Option<Duration>) -> Self {
        self.duration = duration.filter(|d| !d.is_zero());
        self
    }

    pub fn with_policy(mut self, policy: NegotiationPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Check the parameters and derive the frame layout. Touches no resources.
    pub fn validate(&self) -> Result<HardwareFormat, StreamError> {
        let format = HardwareFormat::new(self.bit_depth, self.channels)?;
        if self.rate == 0 {
            return Err(StreamError::invalid_config("sample rate must be positive"));
        }
        if self.policy.period_frames == 0 {
            return Err(StreamError::invalid_config("period size must be positive"));
        }
        Ok(format)
    }
}

/// Device, transfer buffer and file of an open session.
pub struct SessionHandles {
    direction: Direction,
    device_name: String,
    path: PathBuf,
    format: HardwareFormat,
    params: Option<NegotiatedParams>,
    file: Option<File>,
    device: Option<Box<dyn PcmDevice>>,
    buffer: Option<Vec<u8>>,
    cancel: CancellationFlag,
    claimed: bool,
}

/// Borrowed view of the open resources used by one loop iteration.
pub(crate) struct Transfer<'a> {
    pub device: &'a mut dyn PcmDevice,
    pub buffer: &'a mut [u8],
    pub file: &'a mut File,
}

/// Open every resource of `session`, or none of them.
///
/// `cancel` must not be in use by another session.
pub fn acquire(
    session: &StreamSession,
    backend: &dyn PcmBackend,
    cancel: &CancellationFlag,
) -> Result<SessionHandles, StreamError> {
    let format = session.validate()?;
    if !cancel.claim() {
        return Err(StreamError::SessionActive);
    }
    cancel.reset();

    let mut handles = SessionHandles {
        direction: session.direction,
        device_name: session.device.clone(),
        path: session.path.clone(),
        format,
        params: None,
        file: None,
        device: None,
        buffer: None,
        cancel: cancel.clone(),
        claimed: true,
    };

    handles.file = Some(open_file(session.direction, &session.path)?);

    let device = handles.device.insert(
        backend
            .open(&session.device, session.direction)
            .map_err(|e| StreamError::DeviceOpen {
                device: session.device.clone(),
                direction: session.direction,
                reason: e.to_string(),
            })?,
    );

    let params = negotiate(
        device.as_mut(),
        session.direction,
        session.rate,
        session.bit_depth,
        session.channels,
        &session.policy,
    )?;
    handles.params = Some(params);
    handles.buffer = Some(vec![0u8; format.bytes_for_frames(params.period_frames)]);

    tracing::debug!(
        direction = %session.direction,
        path = %session.path.display(),
        buffer_bytes = format.bytes_for_frames(params.period_frames),
        "session acquired"
    );
    Ok(handles)
}

fn open_file(direction: Direction, path: &Path) -> Result<File, StreamError> {
    let mut options = OpenOptions::new();
    match direction {
        Direction::Capture => options.write(true).create(true).truncate(true),
        Direction::Playback => options.read(true),
    };
    options.open(path).map_err(|source| StreamError::FileOpen {
        path: path.to_path_buf(),
        source,
    })
}

impl SessionHandles {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format(&self) -> HardwareFormat {
        self.format
    }

    /// Granted parameters; `None` before negotiation succeeded.
    pub fn params(&self) -> Option<NegotiatedParams> {
        self.params
    }

    pub fn cancel_flag(&self) -> &CancellationFlag {
        &self.cancel
    }

    /// Transfer buffer length in bytes, or `None` once released.
    pub fn buffer_len(&self) -> Option<usize> {
        self.buffer.as_ref().map(Vec::len)
    }

    /// Device, buffer and file are all held.
    pub fn is_open(&self) -> bool {
        self.device.is_some() && self.buffer.is_some() && self.file.is_some()
    }

    /// Nothing is held any more and the cancellation flag is free.
    pub fn is_released(&self) -> bool {
        self.device.is_none() && self.buffer.is_none() && self.file.is_none() && !self.claimed
    }

    pub(crate) fn transfer(&mut self) -> Option<Transfer<'_>> {
        match (&mut self.device, &mut self.buffer, &mut self.file) {
            (Some(device), Some(buffer), Some(file)) => Some(Transfer {
                device: &mut **device,
                buffer: buffer.as_mut_slice(),
                file,
            }),
            _ => None,
        }
    }

    /// Drain and close the device, free the buffer, close the file and reset
    /// the cancellation flag. Resources that are already gone are skipped.
    pub fn release(&mut self) {
        if let Some(mut device) = self.device.take() {
            // an unconfigured device has nothing queued
            if self.params.is_some() {
                if let Err(e) = device.drain() {
                    tracing::warn!(direction = %self.direction, "device drain failed: {e}");
                }
            }
            drop(device);
        }
        self.buffer = None;
        if let Some(file) = self.file.take() {
            if self.direction == Direction::Capture {
                if let Err(e) = file.sync_all() {
                    tracing::warn!(path = %self.path.display(), "file sync failed: {e}");
                }
            }
            drop(file);
        }
        if self.claimed {
            self.cancel.reset();
            self.cancel.unclaim();
            self.claimed = false;
            tracing::debug!(direction = %self.direction, "session released");
        }
    }
}

impl Drop for SessionHandles {
    fn drop(&mut self) {
        self.release();
    }
}
