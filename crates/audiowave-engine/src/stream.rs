//! Period-by-period transfer loop.
//!
//! One loop serves both directions; only the per-period step differs:
//! - **capture**: device → buffer → file
//! - **playback**: file → buffer → device
//!
//! Overruns, underruns and short transfers are recovered in place and only
//! counted. Any other device or file failure stops the loop with an error.
//! The cancellation flag is polled after every period, so a stop request is
//! observed within one period of blocking I/O.

use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use std::time::{Duration, Instant};

use crate::cancel::CancellationFlag;
use crate::device::{DeviceError, Direction, PcmBackend};
use crate::error::StreamError;
use crate::format::HardwareFormat;
use crate::report::{SessionReport, StopReason, format_elapsed};
use crate::session::{SessionHandles, StreamSession, Transfer, acquire};

enum Step {
    Continue,
    Stop(StopReason),
}

/// Acquire, stream and release one session.
///
/// Resources are released before this returns, on success and on error.
pub fn run_session(
    session: &StreamSession,
    backend: &dyn PcmBackend,
    cancel: &CancellationFlag,
) -> Result<SessionReport, StreamError> {
    let mut handles = acquire(session, backend, cancel)?;
    let duration = match session.direction {
        Direction::Capture => session.duration,
        Direction::Playback => None,
    };
    let result = run(&mut handles, duration);
    handles.release();

    if let Ok(report) = &result {
        tracing::info!(
            direction = %report.direction,
            reason = ?report.stop_reason,
            periods = report.periods,
            frames = report.frames,
            bytes = report.bytes,
            xruns = report.xruns,
            short_transfers = report.short_transfers,
            audio = %format_elapsed(report.audio_duration()),
            "session finished"
        );
    }
    result
}

/// Stream until the duration elapses, the input ends, cancellation is raised
/// or a fatal error occurs. `duration` only applies to capture sessions.
///
/// The handles are left open; the caller releases them.
pub fn run(
    handles: &mut SessionHandles,
    duration: Option<Duration>,
) -> Result<SessionReport, StreamError> {
    let direction = handles.direction();
    let format = handles.format();
    let params = handles
        .params()
        .ok_or_else(|| StreamError::invalid_config("session is not open"))?;
    let cancel = handles.cancel_flag().clone();
    let path = handles.path().to_path_buf();
    let mut report = SessionReport::new(direction, handles.device_name(), &path, format, params);

    let mut io = handles
        .transfer()
        .ok_or_else(|| StreamError::invalid_config("session is not open"))?;

    tracing::debug!(%direction, period_frames = params.period_frames, "streaming");
    let start = Instant::now();
    let outcome = loop {
        let step = match direction {
            Direction::Capture => capture_period(&mut io, &format, &path, &mut report),
            Direction::Playback => playback_period(&mut io, &format, &path, &mut report),
        };
        report.periods += 1;
        match step {
            Ok(Step::Continue) => {}
            Ok(Step::Stop(reason)) => break Ok(reason),
            Err(e) => break Err(e),
        }
        if cancel.is_raised() {
            break Ok(StopReason::Cancelled);
        }
        if let Some(limit) = duration {
            if start.elapsed() >= limit {
                break Ok(StopReason::DurationElapsed);
            }
        }
    };
    report.elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

    match outcome {
        Ok(reason) => {
            tracing::debug!(%direction, ?reason, "draining");
            report.stop_reason = Some(reason);
            Ok(report)
        }
        Err(e) => {
            tracing::error!(
                %direction,
                periods = report.periods,
                bytes = report.bytes,
                "stream aborted: {e}"
            );
            Err(e)
        }
    }
}

fn capture_period(
    io: &mut Transfer<'_>,
    format: &HardwareFormat,
    path: &Path,
    report: &mut SessionReport,
) -> Result<Step, StreamError> {
    let requested = format.frames_in(io.buffer.len());
    let frames = match io.device.read_frames(&mut io.buffer[..]) {
        Ok(frames) => frames,
        Err(DeviceError::Xrun) => {
            report.xruns += 1;
            tracing::warn!(period = report.periods, "capture overrun; re-preparing device");
            io.device
                .recover()
                .map_err(|e| device_error(Direction::Capture, "prepare", e))?;
            return Ok(Step::Continue);
        }
        Err(e) => return Err(device_error(Direction::Capture, "read", e)),
    };
    if frames != requested {
        report.short_transfers += 1;
        tracing::warn!(frames, requested, "short read");
    }

    let bytes = format.bytes_for_frames(frames);
    io.file
        .write_all(&io.buffer[..bytes])
        .map_err(|source| StreamError::Io {
            op: "write",
            path: path.to_path_buf(),
            source,
        })?;
    report.frames += frames as u64;
    report.bytes += bytes as u64;
    Ok(Step::Continue)
}

fn playback_period(
    io: &mut Transfer<'_>,
    format: &HardwareFormat,
    path: &Path,
    report: &mut SessionReport,
) -> Result<Step, StreamError> {
    let filled = read_full(io.file, io.buffer).map_err(|source| StreamError::Io {
        op: "read",
        path: path.to_path_buf(),
        source,
    })?;
    if filled == 0 {
        tracing::info!("end of input");
        return Ok(Step::Stop(StopReason::EndOfInput));
    }

    let frames = format.frames_in(filled);
    let whole = format.bytes_for_frames(frames);
    if whole < filled {
        report.discarded_bytes += (filled - whole) as u64;
        tracing::warn!(bytes = filled - whole, "discarding trailing partial frame");
    }
    if frames == 0 {
        return Ok(Step::Stop(StopReason::EndOfInput));
    }

    match io.device.write_frames(&io.buffer[..whole]) {
        Ok(written) => {
            if written != frames {
                report.short_transfers += 1;
                tracing::warn!(written, submitted = frames, "short write");
            }
            report.frames += written as u64;
            report.bytes += format.bytes_for_frames(written) as u64;
        }
        Err(DeviceError::Xrun) => {
            report.xruns += 1;
            tracing::warn!(period = report.periods, "playback underrun; re-preparing device");
            io.device
                .recover()
                .map_err(|e| device_error(Direction::Playback, "prepare", e))?;
        }
        Err(e) => return Err(device_error(Direction::Playback, "write", e)),
    }
    Ok(Step::Continue)
}

/// Fill `buf` from `file`, stopping early only at end of file.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn device_error(direction: Direction, op: &'static str, err: DeviceError) -> StreamError {
    StreamError::Device {
        direction,
        op,
        reason: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBackend, MockConfig, MockEvent, synth_frame};

    fn scratch() -> tempfile::TempDir {
        tempfile::tempdir().expect("tempdir")
    }

    #[test]
    fn capture_stops_on_cancellation_and_writes_whole_periods() {
        let dir = scratch();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        backend.cancel_after(5, &cancel);
        let session = StreamSession::capture(dir.path().join("c.raw"), 8000, 16, 2);

        let report = run_session(&session, &backend, &cancel).unwrap();
        assert_eq!(report.stop_reason, Some(StopReason::Cancelled));
        assert_eq!(report.periods, 5);
        assert_eq!(report.frames, 5 * 128);

        let bytes = std::fs::read(&session.path).unwrap();
        assert_eq!(bytes.len(), 5 * 128 * 4);
        assert!(!cancel.is_raised());
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn capture_overrun_is_recovered_and_skipped() {
        let dir = scratch();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        backend.push_event(MockEvent::Xrun);
        backend.cancel_after(4, &cancel);
        let session = StreamSession::capture(dir.path().join("o.raw"), 8000, 16, 1);

        let report = run_session(&session, &backend, &cancel).unwrap();
        assert_eq!(report.xruns, 1);
        assert_eq!(backend.recoveries(), 1);
        assert_eq!(report.periods, 4);
        assert_eq!(report.frames, 3 * 128);
        assert_eq!(std::fs::metadata(&session.path).unwrap().len(), 3 * 128 * 2);
    }

    #[test]
    fn short_read_writes_only_returned_frames() {
        let dir = scratch();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        backend.push_event(MockEvent::Short(50));
        backend.cancel_after(2, &cancel);
        let session = StreamSession::capture(dir.path().join("s.raw"), 8000, 24, 2);

        let report = run_session(&session, &backend, &cancel).unwrap();
        assert_eq!(report.short_transfers, 1);
        assert_eq!(report.frames, 50 + 128);

        let bytes = std::fs::read(&session.path).unwrap();
        assert_eq!(bytes.len(), (50 + 128) * 6);
        let format = session.validate().unwrap();
        // frames continue seamlessly across the short read
        assert_eq!(&bytes[50 * 6..51 * 6], synth_frame(format.encoding, 2, 50).as_slice());
    }

    #[test]
    fn fatal_read_error_ends_session_and_releases() {
        let dir = scratch();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        backend.push_event(MockEvent::Short(128));
        backend.push_event(MockEvent::Fail("Input/output error".to_string()));
        let session = StreamSession::capture(dir.path().join("f.raw"), 8000, 16, 2);

        let err = run_session(&session, &backend, &cancel).unwrap_err();
        assert!(matches!(err, StreamError::Device { op: "read", .. }));
        assert_eq!(backend.live_handles(), 0);
        assert_eq!(backend.drains(), 1);
        assert!(!cancel.is_claimed());
        // the period written before the failure survives
        assert_eq!(std::fs::metadata(&session.path).unwrap().len(), 128 * 4);
    }

    #[test]
    fn device_failure_during_cancellation_is_still_an_error() {
        let dir = scratch();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        backend.cancel_after(1, &cancel);
        backend.push_event(MockEvent::Fail("No such device".to_string()));
        let session = StreamSession::capture(dir.path().join("i.raw"), 8000, 16, 2);

        let err = run_session(&session, &backend, &cancel).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Device { direction: Direction::Capture, op: "read", .. }
        ));
        assert_eq!(backend.live_handles(), 0);
        assert!(!cancel.is_raised());
        assert!(!cancel.is_claimed());
    }

    #[test]
    fn bounded_capture_stops_after_duration() {
        let dir = scratch();
        let backend = MockBackend::with_config(MockConfig {
            realtime: true,
            ..MockConfig::default()
        });
        let cancel = CancellationFlag::new();
        // 128 frames at 8 kHz = 16 ms per period
        let session = StreamSession::capture(dir.path().join("d.raw"), 8000, 16, 2)
            .with_duration(Some(Duration::from_millis(100)));

        let report = run_session(&session, &backend, &cancel).unwrap();
        assert_eq!(report.stop_reason, Some(StopReason::DurationElapsed));
        assert!(report.elapsed() >= Duration::from_millis(100));
        // each period sleeps at least 16 ms, so the 7th period is the last that
        // can start before the limit
        assert!(report.periods >= 1 && report.periods <= 7, "{}", report.periods);
        assert_eq!(report.frames, report.periods * 128);
        let len = std::fs::metadata(&session.path).unwrap().len();
        assert_eq!(len, report.periods * 128 * 4);
    }

    #[test]
    fn playback_of_empty_file_ends_at_eof() {
        let dir = scratch();
        let path = dir.path().join("empty.raw");
        std::fs::write(&path, b"").unwrap();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        let session = StreamSession::playback(&path, 8000, 16, 2);

        let report = run_session(&session, &backend, &cancel).unwrap();
        assert_eq!(report.stop_reason, Some(StopReason::EndOfInput));
        assert_eq!(report.frames, 0);
        assert_eq!(backend.transfers(), 0);
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn playback_discards_trailing_partial_frame() {
        let dir = scratch();
        let path = dir.path().join("odd.raw");
        let data: Vec<u8> = (0..=202u8).collect();
        std::fs::write(&path, &data).unwrap();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        let session = StreamSession::playback(&path, 8000, 16, 2);

        let report = run_session(&session, &backend, &cancel).unwrap();
        assert_eq!(report.stop_reason, Some(StopReason::EndOfInput));
        assert_eq!(report.frames, 50);
        assert_eq!(report.discarded_bytes, 3);
        assert_eq!(backend.played(), data[..200].to_vec());
    }

    #[test]
    fn playback_underrun_and_short_write_are_not_fatal() {
        let dir = scratch();
        let path = dir.path().join("u.raw");
        std::fs::write(&path, vec![7u8; 3 * 128 * 4]).unwrap();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        backend.push_event(MockEvent::Xrun);
        backend.push_event(MockEvent::Short(100));
        let session = StreamSession::playback(&path, 8000, 16, 2);

        let report = run_session(&session, &backend, &cancel).unwrap();
        assert_eq!(report.stop_reason, Some(StopReason::EndOfInput));
        assert_eq!(report.xruns, 1);
        assert_eq!(report.short_transfers, 1);
        assert_eq!(report.frames, 100 + 128);
        assert_eq!(backend.recoveries(), 1);
        assert_eq!(backend.drains(), 1);
    }

    #[test]
    fn playback_write_failure_is_fatal() {
        let dir = scratch();
        let path = dir.path().join("w.raw");
        std::fs::write(&path, vec![0u8; 1024]).unwrap();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        backend.push_event(MockEvent::Fail("No such device".to_string()));
        let session = StreamSession::playback(&path, 8000, 16, 2);

        let err = run_session(&session, &backend, &cancel).unwrap_err();
        assert!(matches!(
            err,
            StreamError::Device { direction: Direction::Playback, op: "write", .. }
        ));
        assert_eq!(backend.live_handles(), 0);
    }

    #[test]
    fn playback_ignores_duration() {
        let dir = scratch();
        let path = dir.path().join("long.raw");
        std::fs::write(&path, vec![0u8; 10 * 128 * 2]).unwrap();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        let session = StreamSession::playback(&path, 8000, 16, 1)
            .with_duration(Some(Duration::from_nanos(1)));

        let report = run_session(&session, &backend, &cancel).unwrap();
        assert_eq!(report.stop_reason, Some(StopReason::EndOfInput));
        assert_eq!(report.frames, 10 * 128);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn capture_file_write_failure_is_fatal() {
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        let session = StreamSession::capture("/dev/full", 8000, 16, 2);

        let err = run_session(&session, &backend, &cancel).unwrap_err();
        assert!(matches!(err, StreamError::Io { op: "write", .. }));
        assert_eq!(err.kind(), crate::error::ErrorKind::Io);
        assert_eq!(backend.live_handles(), 0);
        assert!(!cancel.is_claimed());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn playback_file_read_failure_is_fatal() {
        // a directory opens read-only but fails every read with EISDIR
        let dir = scratch();
        let backend = MockBackend::new();
        let cancel = CancellationFlag::new();
        let session = StreamSession::playback(dir.path(), 8000, 16, 2);

        let err = run_session(&session, &backend, &cancel).unwrap_err();
        assert!(matches!(err, StreamError::Io { op: "read", .. }));
        assert_eq!(backend.transfers(), 0);
        assert_eq!(backend.live_handles(), 0);
        assert!(!cancel.is_claimed());
    }

    #[test]
    fn read_full_spans_short_reads() {
        let dir = scratch();
        let path = dir.path().join("r.raw");
        std::fs::write(&path, [1u8, 2, 3, 4, 5]).unwrap();
        let mut file = File::open(&path).unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(read_full(&mut file, &mut buf).unwrap(), 5);
        assert_eq!(read_full(&mut file, &mut buf).unwrap(), 0);
    }
}
