//! Record and play entry points.
//!
//! Builds a session from the parsed config, wires Ctrl-C to the session's
//! cancellation flag and runs it on the platform backend.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::{Context, Result};
use audiowave_engine::{
    CancellationFlag, DEFAULT_DEVICE, PcmBackend, SessionReport, StreamSession,
    install_interrupt_handler, run_session,
};

use crate::config::{PlayConfig, RecordConfig, StreamConfig};

/// Capture from the configured device into the configured file.
pub fn run_record(config: RecordConfig) -> Result<SessionReport> {
    let duration = Duration::from_secs(config.duration_secs);
    let session = build_session(StreamSession::capture, &config.stream)
        .with_duration(Some(duration));
    tracing::info!(
        path = %session.path.display(),
        device = %session.device,
        rate_hz = session.rate,
        bits = session.bit_depth,
        channels = session.channels,
        duration_s = config.duration_secs,
        "recording"
    );
    run(&session)
}

/// Play the configured file through the configured device.
pub fn run_play(config: PlayConfig) -> Result<SessionReport> {
    let session = build_session(StreamSession::playback, &config.stream);
    tracing::info!(
        path = %session.path.display(),
        device = %session.device,
        rate_hz = session.rate,
        bits = session.bit_depth,
        channels = session.channels,
        "playing"
    );
    run(&session)
}

fn build_session(
    make: fn(std::path::PathBuf, u32, u16, u16) -> StreamSession,
    config: &StreamConfig,
) -> StreamSession {
    let device = normalize_device_name(config.device.clone())
        .unwrap_or_else(|| DEFAULT_DEVICE.to_string());
    make(config.path.clone(), config.rate, config.bits, config.channels)
        .with_device(device)
        .with_policy(config.policy)
}

fn run(session: &StreamSession) -> Result<SessionReport> {
    let cancel = interrupt_flag()?;
    let backend = backend()?;
    run_session(session, backend.as_ref(), &cancel)
        .with_context(|| format!("{} session on '{}'", session.direction, session.device))
}

/// Process-wide flag raised by Ctrl-C; the handler is installed on first use.
fn interrupt_flag() -> Result<CancellationFlag> {
    static FLAG: OnceLock<CancellationFlag> = OnceLock::new();
    if let Some(flag) = FLAG.get() {
        return Ok(flag.clone());
    }
    let flag = CancellationFlag::new();
    install_interrupt_handler(&flag).context("install Ctrl-C handler")?;
    Ok(FLAG.get_or_init(|| flag).clone())
}

#[cfg(target_os = "linux")]
fn backend() -> Result<Box<dyn PcmBackend>> {
    Ok(Box::new(audiowave_engine::AlsaBackend))
}

#[cfg(not(target_os = "linux"))]
fn backend() -> Result<Box<dyn PcmBackend>> {
    anyhow::bail!("no PCM backend for this platform (ALSA is Linux-only)")
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use audiowave_engine::{Direction, NegotiationPolicy};

    fn stream_config(device: Option<&str>) -> StreamConfig {
        StreamConfig {
            path: "take.raw".into(),
            device: device.map(str::to_string),
            rate: 22_050,
            bits: 8,
            channels: 1,
            policy: NegotiationPolicy {
                period_frames: 64,
                ..NegotiationPolicy::default()
            },
        }
    }

    #[test]
    fn normalize_device_name_trims_and_drops_empty() {
        assert_eq!(normalize_device_name(None), None);
        assert_eq!(normalize_device_name(Some("".to_string())), None);
        assert_eq!(normalize_device_name(Some("  ".to_string())), None);
        assert_eq!(
            normalize_device_name(Some("  hw:1,0 ".to_string())),
            Some("hw:1,0".to_string())
        );
    }

    #[test]
    fn blank_device_falls_back_to_default() {
        let session = build_session(StreamSession::capture, &stream_config(Some("   ")));
        assert_eq!(session.device, DEFAULT_DEVICE);
        assert_eq!(session.direction, Direction::Capture);
    }

    #[test]
    fn session_carries_stream_settings() {
        let session = build_session(StreamSession::playback, &stream_config(Some(" hw:2,0")));
        assert_eq!(session.direction, Direction::Playback);
        assert_eq!(session.device, "hw:2,0");
        assert_eq!(session.rate, 22_050);
        assert_eq!(session.bit_depth, 8);
        assert_eq!(session.channels, 1);
        assert_eq!(session.policy.period_frames, 64);
    }
}
