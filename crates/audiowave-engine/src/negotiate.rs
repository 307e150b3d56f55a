//! Hardware parameter negotiation.

use serde::Serialize;

use crate::config::NegotiationPolicy;
use crate::device::{Direction, HwRequest, PcmDevice};
use crate::error::StreamError;
use crate::format::resolve_format;

/// Parameters the device actually granted. All sizing after negotiation uses these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct NegotiatedParams {
    pub rate: u32,
    pub channels: u16,
    pub period_frames: usize,
    pub buffer_frames: usize,
}

impl NegotiatedParams {
    pub fn period_time_us(&self) -> u64 {
        frames_to_us(self.period_frames, self.rate)
    }

    pub fn buffer_time_us(&self) -> u64 {
        frames_to_us(self.buffer_frames, self.rate)
    }
}

fn frames_to_us(frames: usize, rate: u32) -> u64 {
    if rate == 0 {
        return 0;
    }
    (frames as u64).saturating_mul(1_000_000) / u64::from(rate)
}

/// Configure `device` for interleaved transfer of `bit_depth`/`channels` at `rate`.
///
/// There is no fallback: if the device refuses the configuration the session
/// cannot start.
pub fn negotiate(
    device: &mut dyn PcmDevice,
    direction: Direction,
    rate: u32,
    bit_depth: u16,
    channels: u16,
    policy: &NegotiationPolicy,
) -> Result<NegotiatedParams, StreamError> {
    let encoding = resolve_format(bit_depth)?;
    let request = HwRequest {
        encoding,
        channels,
        rate,
        period_frames: policy.period_frames,
        buffer_time_us: policy.buffer_time_us,
        period_time_us: policy.period_time_us,
    };

    let grant = device
        .configure(&request)
        .map_err(|e| StreamError::Negotiation {
            direction,
            reason: e.to_string(),
        })?;

    if grant.period_frames == 0 {
        return Err(StreamError::Negotiation {
            direction,
            reason: "device granted an empty period".to_string(),
        });
    }
    if grant.rate != rate {
        tracing::info!(requested_hz = rate, granted_hz = grant.rate, "sample rate adjusted by device");
    }
    if grant.period_frames != policy.period_frames {
        tracing::info!(
            requested = policy.period_frames,
            granted = grant.period_frames,
            "period size adjusted by device"
        );
    }

    let params = NegotiatedParams {
        rate: grant.rate,
        channels,
        period_frames: grant.period_frames,
        buffer_frames: grant.buffer_frames,
    };
    tracing::info!(
        %direction,
        format = %encoding,
        rate_hz = params.rate,
        channels,
        period_frames = params.period_frames,
        buffer_frames = params.buffer_frames,
        period_us = params.period_time_us(),
        buffer_us = params.buffer_time_us(),
        "hardware parameters negotiated"
    );
    Ok(params)
}
