use std::path::PathBuf;

use audiowave_engine::NegotiationPolicy;

/// Stream settings shared by both directions.
#[derive(Clone, Debug)]
pub struct StreamConfig {
    pub path: PathBuf,
    /// `None` or blank selects the default device.
    pub device: Option<String>,
    pub rate: u32,
    pub bits: u16,
    pub channels: u16,
    pub policy: NegotiationPolicy,
}

#[derive(Clone, Debug)]
pub struct RecordConfig {
    pub stream: StreamConfig,
    /// Zero records until interrupted.
    pub duration_secs: u64,
}

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub stream: StreamConfig,
}
