//! ALSA PCM backend.
//!
//! Frames are moved as raw bytes (`io_bytes`), so every supported encoding goes
//! through the same code path without sample conversion.

use alsa::pcm::{Access, Format, Frames, HwParams, PCM, State};
use alsa::ValueOr;

use crate::device::{DeviceError, Direction, HwGrant, HwRequest, PcmBackend, PcmDevice};
use crate::format::{ByteOrder, SampleEncoding};

/// Opens ALSA PCM devices in blocking mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct AlsaBackend;

impl PcmBackend for AlsaBackend {
    fn open(&self, name: &str, direction: Direction) -> Result<Box<dyn PcmDevice>, DeviceError> {
        let pcm = PCM::new(name, alsa_direction(direction), false).map_err(DeviceError::backend)?;
        tracing::debug!(device = name, %direction, "ALSA device opened");
        Ok(Box::new(AlsaDevice {
            pcm,
            name: name.to_string(),
            direction,
        }))
    }
}

struct AlsaDevice {
    pcm: PCM,
    name: String,
    direction: Direction,
}

impl AlsaDevice {
    /// Map a failed transfer to `Xrun` when ALSA flagged the stream as such.
    fn transfer_error(&self, err: alsa::Error) -> DeviceError {
        if self.pcm.state() == State::XRun {
            DeviceError::Xrun
        } else {
            DeviceError::backend(err)
        }
    }
}

impl PcmDevice for AlsaDevice {
    fn configure(&mut self, request: &HwRequest) -> Result<HwGrant, DeviceError> {
        let format = alsa_format(request.encoding)?;
        let hwp = HwParams::any(&self.pcm).map_err(DeviceError::backend)?;

        tracing::debug!(
            device = %self.name,
            rate_min = hwp.get_rate_min().unwrap_or(0),
            rate_max = hwp.get_rate_max().unwrap_or(0),
            channels_min = hwp.get_channels_min().unwrap_or(0),
            channels_max = hwp.get_channels_max().unwrap_or(0),
            "ALSA probe"
        );

        hwp.set_access(Access::RWInterleaved)
            .map_err(|e| DeviceError::Backend(format!("interleaved access: {e}")))?;
        hwp.set_format(format)
            .map_err(|e| DeviceError::Backend(format!("format {}: {e}", request.encoding)))?;
        hwp.set_channels(u32::from(request.channels))
            .map_err(|e| DeviceError::Backend(format!("{} channels: {e}", request.channels)))?;
        hwp.set_rate_near(request.rate, ValueOr::Nearest)
            .map_err(|e| DeviceError::Backend(format!("rate {} Hz: {e}", request.rate)))?;

        // Timing targets are hints; a refused hint leaves the driver default in place.
        let period_frames = period_hint(request.period_frames)?;
        if let Err(e) = hwp.set_period_size_near(period_frames, ValueOr::Nearest) {
            tracing::warn!(period_frames = request.period_frames, "period size hint refused: {e}");
        }
        if let Err(e) = hwp.set_buffer_time_near(request.buffer_time_us, ValueOr::Nearest) {
            tracing::warn!(buffer_time_us = request.buffer_time_us, "buffer time hint refused: {e}");
        }
        if let Err(e) = hwp.set_period_time_near(request.period_time_us, ValueOr::Nearest) {
            tracing::warn!(period_time_us = request.period_time_us, "period time hint refused: {e}");
        }

        self.pcm.hw_params(&hwp).map_err(DeviceError::backend)?;

        let current = self.pcm.hw_params_current().map_err(DeviceError::backend)?;
        let rate = current.get_rate().map_err(DeviceError::backend)?;
        let period = current.get_period_size().map_err(DeviceError::backend)?;
        let buffer = current.get_buffer_size().map_err(DeviceError::backend)?;

        Ok(HwGrant {
            rate,
            period_frames: usize::try_from(period).unwrap_or(0),
            buffer_frames: usize::try_from(buffer).unwrap_or(0),
        })
    }

    fn read_frames(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let io = self.pcm.io_bytes();
        io.readi(buf).map_err(|e| self.transfer_error(e))
    }

    fn write_frames(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
        let io = self.pcm.io_bytes();
        io.writei(buf).map_err(|e| self.transfer_error(e))
    }

    fn recover(&mut self) -> Result<(), DeviceError> {
        self.pcm.prepare().map_err(DeviceError::backend)
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        self.pcm.drain().map_err(DeviceError::backend)
    }
}

impl Drop for AlsaDevice {
    fn drop(&mut self) {
        tracing::debug!(device = %self.name, direction = %self.direction, "ALSA device closed");
    }
}

fn alsa_direction(direction: Direction) -> alsa::Direction {
    match direction {
        Direction::Capture => alsa::Direction::Capture,
        Direction::Playback => alsa::Direction::Playback,
    }
}

fn period_hint(frames: usize) -> Result<Frames, DeviceError> {
    Frames::try_from(frames)
        .map_err(|e| DeviceError::Backend(format!("period size {frames} frames: {e}")))
}

fn alsa_format(encoding: SampleEncoding) -> Result<Format, DeviceError> {
    let format = match (encoding.signed, encoding.width_bytes, encoding.byte_order) {
        (false, 1, _) => Format::U8,
        (true, 2, ByteOrder::Little) => Format::S16LE,
        (true, 2, ByteOrder::Big) => Format::S16BE,
        (true, 3, ByteOrder::Little) => Format::S243LE,
        (true, 3, ByteOrder::Big) => Format::S243BE,
        (true, 4, ByteOrder::Little) => Format::S32LE,
        (true, 4, ByteOrder::Big) => Format::S32BE,
        _ => {
            return Err(DeviceError::Backend(format!(
                "no ALSA format for {encoding}"
            )));
        }
    };
    Ok(format)
}
