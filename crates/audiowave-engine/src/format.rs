//! Bit depth to sample encoding translation.
//!
//! Raw files carry no header, so the encoding used on the wire is fully
//! determined by the requested bit depth and the byte order of the host.

use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;

use crate::error::StreamError;

/// Byte order of multi-byte samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ByteOrder {
    Little,
    Big,
}

static HOST_ORDER: OnceLock<ByteOrder> = OnceLock::new();

impl ByteOrder {
    /// Native byte order of the running host, probed once.
    pub fn host() -> Self {
        *HOST_ORDER.get_or_init(probe_host_order)
    }
}

/// Look at the lowest-addressed byte of a known two-byte value.
fn probe_host_order() -> ByteOrder {
    let probe: u16 = 0x0001;
    if probe.to_ne_bytes()[0] == 0x01 {
        ByteOrder::Little
    } else {
        ByteOrder::Big
    }
}

/// User-facing bit depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BitDepth {
    #[serde(rename = "8")]
    Eight,
    #[serde(rename = "16")]
    Sixteen,
    #[serde(rename = "24")]
    TwentyFour,
    #[serde(rename = "32")]
    ThirtyTwo,
}

impl BitDepth {
    pub fn from_bits(bits: u16) -> Result<Self, StreamError> {
        match bits {
            8 => Ok(Self::Eight),
            16 => Ok(Self::Sixteen),
            24 => Ok(Self::TwentyFour),
            32 => Ok(Self::ThirtyTwo),
            other => Err(StreamError::UnsupportedBitDepth { bits: other }),
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            Self::Eight => 8,
            Self::Sixteen => 16,
            Self::TwentyFour => 24,
            Self::ThirtyTwo => 32,
        }
    }

    /// Bytes per sample on the wire.
    pub fn bytes(self) -> usize {
        usize::from(self.bits() / 8)
    }
}

impl TryFrom<u16> for BitDepth {
    type Error = StreamError;

    fn try_from(bits: u16) -> Result<Self, Self::Error> {
        Self::from_bits(bits)
    }
}

/// Concrete sample encoding handed to the device.
///
/// 24-bit samples are packed into three bytes (no padding), so
/// `width_bytes * channels` is always the frame size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SampleEncoding {
    pub signed: bool,
    pub width_bytes: usize,
    /// Meaningless for 8-bit samples; set to the host order there.
    pub byte_order: ByteOrder,
}

impl SampleEncoding {
    pub fn for_depth(depth: BitDepth, order: ByteOrder) -> Self {
        Self {
            signed: depth != BitDepth::Eight,
            width_bytes: depth.bytes(),
            byte_order: order,
        }
    }

    /// ALSA-style short name, e.g. `S16_LE` or `S24_3BE`.
    pub fn name(&self) -> &'static str {
        match (self.signed, self.width_bytes, self.byte_order) {
            (false, 1, _) => "U8",
            (true, 1, _) => "S8",
            (true, 2, ByteOrder::Little) => "S16_LE",
            (true, 2, ByteOrder::Big) => "S16_BE",
            (true, 3, ByteOrder::Little) => "S24_3LE",
            (true, 3, ByteOrder::Big) => "S24_3BE",
            (true, 4, ByteOrder::Little) => "S32_LE",
            (true, 4, ByteOrder::Big) => "S32_BE",
            _ => "UNKNOWN",
        }
    }
}

impl fmt::Display for SampleEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Resolve a user bit depth against the host byte order.
pub fn resolve_format(bit_depth: u16) -> Result<SampleEncoding, StreamError> {
    resolve_format_for(bit_depth, ByteOrder::host())
}

/// Resolve a user bit depth against an explicit byte order.
pub fn resolve_format_for(bit_depth: u16, order: ByteOrder) -> Result<SampleEncoding, StreamError> {
    let depth = BitDepth::from_bits(bit_depth)?;
    Ok(SampleEncoding::for_depth(depth, order))
}

/// Encoding plus channel layout for one session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HardwareFormat {
    pub depth: BitDepth,
    pub encoding: SampleEncoding,
    pub channels: u16,
}

impl HardwareFormat {
    pub fn new(bit_depth: u16, channels: u16) -> Result<Self, StreamError> {
        let depth = BitDepth::try_from(bit_depth)?;
        if channels == 0 {
            return Err(StreamError::invalid_config("channel count must be at least 1"));
        }
        Ok(Self {
            depth,
            encoding: SampleEncoding::for_depth(depth, ByteOrder::host()),
            channels,
        })
    }

    /// Bytes per interleaved frame.
    pub fn frame_bytes(&self) -> usize {
        self.depth.bytes() * usize::from(self.channels)
    }

    pub fn bytes_for_frames(&self, frames: usize) -> usize {
        frames * self.frame_bytes()
    }

    /// Whole frames contained in `bytes`; a trailing partial frame is not counted.
    pub fn frames_in(&self, bytes: usize) -> usize {
        bytes / self.frame_bytes()
    }
}
