use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::device::Direction;
use crate::format::HardwareFormat;
use crate::negotiate::NegotiatedParams;

/// Why a streaming loop stopped without error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The requested capture duration elapsed.
    DurationElapsed,
    /// The cancellation flag was raised.
    Cancelled,
    /// The playback file was exhausted.
    EndOfInput,
}

/// Counters and negotiated settings of one finished session.
#[derive(Clone, Debug, Serialize)]
pub struct SessionReport {
    pub direction: Direction,
    pub device: String,
    pub path: PathBuf,
    pub format: HardwareFormat,
    pub params: NegotiatedParams,
    /// `None` until the loop stops.
    pub stop_reason: Option<StopReason>,
    /// Loop iterations, including ones lost to xruns.
    pub periods: u64,
    /// Frames moved between device and file.
    pub frames: u64,
    /// Bytes written to (capture) or accepted from (playback) the file.
    pub bytes: u64,
    /// Overruns (capture) or underruns (playback) recovered in place.
    pub xruns: u64,
    /// Device transfers that moved fewer frames than offered.
    pub short_transfers: u64,
    /// Trailing bytes of the playback file that did not form a whole frame.
    pub discarded_bytes: u64,
    /// Wall time spent in the loop.
    pub elapsed_ms: u64,
}

impl SessionReport {
    pub fn new(
        direction: Direction,
        device: impl Into<String>,
        path: impl Into<PathBuf>,
        format: HardwareFormat,
        params: NegotiatedParams,
    ) -> Self {
        Self {
            direction,
            device: device.into(),
            path: path.into(),
            format,
            params,
            stop_reason: None,
            periods: 0,
            frames: 0,
            bytes: 0,
            xruns: 0,
            short_transfers: 0,
            discarded_bytes: 0,
            elapsed_ms: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    /// Length of the transferred audio at the negotiated rate.
    pub fn audio_duration(&self) -> Duration {
        if self.params.rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames as f64 / f64::from(self.params.rate))
    }
}

/// Format a duration as `hh:mm:ss`, truncating sub-second parts.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> SessionReport {
        SessionReport::new(
            Direction::Capture,
            "plughw:0,0",
            "take.raw",
            HardwareFormat::new(16, 2).unwrap(),
            NegotiatedParams {
                rate: 48_000,
                channels: 2,
                period_frames: 1024,
                buffer_frames: 48_000,
            },
        )
    }

    #[test]
    fn format_elapsed_pads_fields() {
        assert_eq!(format_elapsed(Duration::ZERO), "00:00:00");
        assert_eq!(format_elapsed(Duration::from_millis(59_999)), "00:00:59");
        assert_eq!(format_elapsed(Duration::from_secs(3_723)), "01:02:03");
        assert_eq!(format_elapsed(Duration::from_secs(100 * 3600)), "100:00:00");
    }

    #[test]
    fn audio_duration_uses_negotiated_rate() {
        let mut report = report();
        report.frames = 96_000;
        assert_eq!(report.audio_duration(), Duration::from_secs(2));
    }

    #[test]
    fn serializes_snake_case_fields() {
        let mut report = report();
        report.stop_reason = Some(StopReason::Cancelled);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["direction"], "capture");
        assert_eq!(json["stop_reason"], "cancelled");
        assert_eq!(json["format"]["depth"], "16");
        assert_eq!(json["params"]["period_frames"], 1024);
    }
}
