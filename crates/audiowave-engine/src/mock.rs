//! In-memory PCM backend for exercising the engine without audio hardware.
//!
//! Capture devices produce a deterministic sawtooth (see [`synth_frame`]);
//! playback devices append everything they accept to a shared buffer.
//! Transfers can be scripted with [`MockEvent`]s to inject xruns, short
//! transfers and hard failures.
//!
//! ```
//! use audiowave_engine::mock::{MockBackend, MockEvent};
//!
//! let backend = MockBackend::new();
//! backend.push_event(MockEvent::Xrun);
//! backend.push_event(MockEvent::Short(10));
//! assert_eq!(backend.opens(), 0);
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::cancel::CancellationFlag;
use crate::device::{DeviceError, Direction, HwGrant, HwRequest, PcmBackend, PcmDevice};
use crate::format::{ByteOrder, SampleEncoding};

/// Frames per sawtooth cycle produced by capture devices.
pub const SAWTOOTH_PERIOD: u64 = 64;

/// Static behavior of a mock device.
#[derive(Clone, Debug, Default)]
pub struct MockConfig {
    /// Grant this period size instead of the requested one.
    pub grant_period_frames: Option<usize>,
    /// Grant this rate instead of the requested one.
    pub grant_rate: Option<u32>,
    /// Refuse every configuration.
    pub reject_configure: bool,
    /// Refuse to open.
    pub fail_open: bool,
    /// Report a failure from `drain`.
    pub fail_drain: bool,
    /// Sleep for the duration of each transferred block, like a real device.
    pub realtime: bool,
}

/// Scripted outcome for the next transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MockEvent {
    /// Fail with an overrun/underrun.
    Xrun,
    /// Transfer at most this many frames.
    Short(usize),
    /// Fail with a non-recoverable error.
    Fail(String),
}

#[derive(Debug, Default)]
struct MockShared {
    config: MockConfig,
    events: VecDeque<MockEvent>,
    cancel_after: Option<(usize, CancellationFlag)>,
    opens: usize,
    live: usize,
    configure_calls: usize,
    last_request: Option<HwRequest>,
    transfers: usize,
    recoveries: usize,
    drains: usize,
    played: Vec<u8>,
}

/// Handle to a family of mock devices sharing one script and one set of counters.
#[derive(Clone, Debug, Default)]
pub struct MockBackend {
    shared: Arc<Mutex<MockShared>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MockConfig) -> Self {
        let backend = Self::default();
        backend.lock().config = config;
        backend
    }

    fn lock(&self) -> MutexGuard<'_, MockShared> {
        lock_shared(&self.shared)
    }

    /// Queue an outcome for a future transfer; unscripted transfers succeed in full.
    pub fn push_event(&self, event: MockEvent) {
        self.lock().events.push_back(event);
    }

    /// Raise `flag` while the `transfers`-th transfer is in flight.
    pub fn cancel_after(&self, transfers: usize, flag: &CancellationFlag) {
        self.lock().cancel_after = Some((transfers, flag.clone()));
    }

    /// Number of successful `open` calls.
    pub fn opens(&self) -> usize {
        self.lock().opens
    }

    /// Devices opened and not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.lock().live
    }

    pub fn configure_calls(&self) -> usize {
        self.lock().configure_calls
    }

    pub fn last_request(&self) -> Option<HwRequest> {
        self.lock().last_request
    }

    /// Read/write calls made, including failed ones.
    pub fn transfers(&self) -> usize {
        self.lock().transfers
    }

    pub fn recoveries(&self) -> usize {
        self.lock().recoveries
    }

    pub fn drains(&self) -> usize {
        self.lock().drains
    }

    /// Bytes accepted by playback devices so far.
    pub fn played(&self) -> Vec<u8> {
        self.lock().played.clone()
    }
}

impl PcmBackend for MockBackend {
    fn open(&self, name: &str, direction: Direction) -> Result<Box<dyn PcmDevice>, DeviceError> {
        let mut shared = self.lock();
        if shared.config.fail_open {
            return Err(DeviceError::Backend(format!("cannot open '{name}': No such device")));
        }
        shared.opens += 1;
        shared.live += 1;
        drop(shared);
        Ok(Box::new(MockDevice {
            shared: self.shared.clone(),
            direction,
            layout: None,
            rate: 0,
            cursor: 0,
        }))
    }
}

fn lock_shared(shared: &Mutex<MockShared>) -> MutexGuard<'_, MockShared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Copy, Debug)]
struct Layout {
    encoding: SampleEncoding,
    channels: u16,
}

impl Layout {
    fn frame_bytes(&self) -> usize {
        self.encoding.width_bytes * usize::from(self.channels)
    }
}

struct MockDevice {
    shared: Arc<Mutex<MockShared>>,
    direction: Direction,
    layout: Option<Layout>,
    rate: u32,
    cursor: u64,
}

impl MockDevice {
    fn layout(&self) -> Result<Layout, DeviceError> {
        self.layout
            .ok_or_else(|| DeviceError::Backend("device not configured".to_string()))
    }

    /// Count the transfer, fire a pending cancellation and pop the next scripted event.
    fn begin_transfer(&self) -> (Option<MockEvent>, bool) {
        let mut shared = lock_shared(&self.shared);
        shared.transfers += 1;
        if let Some((after, flag)) = &shared.cancel_after {
            if shared.transfers >= *after {
                flag.raise();
            }
        }
        (shared.events.pop_front(), shared.config.realtime)
    }

    fn pace(&self, frames: usize, realtime: bool) {
        if realtime && self.rate > 0 {
            std::thread::sleep(Duration::from_secs_f64(frames as f64 / f64::from(self.rate)));
        }
    }
}

impl PcmDevice for MockDevice {
    fn configure(&mut self, request: &HwRequest) -> Result<HwGrant, DeviceError> {
        let mut shared = lock_shared(&self.shared);
        shared.configure_calls += 1;
        shared.last_request = Some(*request);
        if shared.config.reject_configure {
            return Err(DeviceError::Backend("Invalid argument".to_string()));
        }
        let rate = shared.config.grant_rate.unwrap_or(request.rate);
        let period_frames = shared
            .config
            .grant_period_frames
            .unwrap_or(request.period_frames);
        let buffer_frames =
            (u64::from(request.buffer_time_us) * u64::from(rate) / 1_000_000) as usize;
        drop(shared);

        self.layout = Some(Layout {
            encoding: request.encoding,
            channels: request.channels,
        });
        self.rate = rate;
        Ok(HwGrant {
            rate,
            period_frames,
            buffer_frames: buffer_frames.max(period_frames),
        })
    }

    fn read_frames(&mut self, buf: &mut [u8]) -> Result<usize, DeviceError> {
        let layout = self.layout()?;
        let frame_bytes = layout.frame_bytes();
        let requested = buf.len() / frame_bytes;
        let (event, realtime) = self.begin_transfer();
        let frames = match event {
            Some(MockEvent::Xrun) => return Err(DeviceError::Xrun),
            Some(MockEvent::Fail(msg)) => return Err(DeviceError::Backend(msg)),
            Some(MockEvent::Short(n)) => n.min(requested),
            None => requested,
        };
        for (i, frame) in buf[..frames * frame_bytes]
            .chunks_exact_mut(frame_bytes)
            .enumerate()
        {
            let sample = synth_frame(layout.encoding, layout.channels, self.cursor + i as u64);
            frame.copy_from_slice(&sample);
        }
        self.cursor += frames as u64;
        self.pace(frames, realtime);
        Ok(frames)
    }

    fn write_frames(&mut self, buf: &[u8]) -> Result<usize, DeviceError> {
        let frame_bytes = self.layout()?.frame_bytes();
        let offered = buf.len() / frame_bytes;
        let (event, realtime) = self.begin_transfer();
        let frames = match event {
            Some(MockEvent::Xrun) => return Err(DeviceError::Xrun),
            Some(MockEvent::Fail(msg)) => return Err(DeviceError::Backend(msg)),
            Some(MockEvent::Short(n)) => n.min(offered),
            None => offered,
        };
        lock_shared(&self.shared)
            .played
            .extend_from_slice(&buf[..frames * frame_bytes]);
        self.cursor += frames as u64;
        self.pace(frames, realtime);
        Ok(frames)
    }

    fn recover(&mut self) -> Result<(), DeviceError> {
        lock_shared(&self.shared).recoveries += 1;
        Ok(())
    }

    fn drain(&mut self) -> Result<(), DeviceError> {
        let mut shared = lock_shared(&self.shared);
        shared.drains += 1;
        if shared.config.fail_drain {
            return Err(DeviceError::Backend(format!(
                "{} drain: Input/output error",
                self.direction
            )));
        }
        Ok(())
    }
}

impl Drop for MockDevice {
    fn drop(&mut self) {
        let mut shared = lock_shared(&self.shared);
        shared.live = shared.live.saturating_sub(1);
    }
}

/// Bytes of frame `index` of the capture sawtooth, identical on every channel.
pub fn synth_frame(encoding: SampleEncoding, channels: u16, index: u64) -> Vec<u8> {
    let value = ((index % SAWTOOTH_PERIOD) * 4) as i16 - 128;
    let mut sample = vec![0u8; encoding.width_bytes];
    encode_sample(value, encoding, &mut sample);
    sample.repeat(usize::from(channels))
}

/// Place an 8-bit `value` in the most significant byte of a sample of the given encoding.
fn encode_sample(value: i16, encoding: SampleEncoding, out: &mut [u8]) {
    if !encoding.signed {
        out[0] = (value + 128) as u8;
        return;
    }
    let width = encoding.width_bytes;
    let wide = i32::from(value) << (8 * (width - 1));
    let le = wide.to_le_bytes();
    match encoding.byte_order {
        ByteOrder::Little => out[..width].copy_from_slice(&le[..width]),
        ByteOrder::Big => {
            for (dst, src) in out[..width].iter_mut().zip(le[..width].iter().rev()) {
                *dst = *src;
            }
        }
    }
}
