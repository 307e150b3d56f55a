use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use audiowave_engine::{DEFAULT_DEVICE, NegotiationPolicy};

use crate::config::{PlayConfig, RecordConfig, StreamConfig};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("AUDIOWAVE_GIT_SHA"),
    ", ",
    env!("AUDIOWAVE_BUILD_DATE"),
    ")"
);

#[derive(Parser, Debug)]
#[command(name = "audiowave", version = VERSION, about)]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Print the session report as JSON on stdout when done
    #[arg(long, global = true)]
    pub report_json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Capture from a sound card into a raw PCM file
    Record {
        #[command(flatten)]
        stream: StreamArgs,

        /// Seconds to record; 0 records until Ctrl-C
        #[arg(short = 's', long, default_value_t = 0)]
        duration: u64,
    },

    /// Play a raw PCM file through a sound card
    Play {
        #[command(flatten)]
        stream: StreamArgs,
    },
}

/// Options shared by `record` and `play`.
#[derive(ClapArgs, Debug, Clone)]
pub struct StreamArgs {
    /// Headerless interleaved PCM file
    #[arg(short = 'f', long = "file")]
    pub path: PathBuf,

    /// ALSA device name, e.g. hw:1,0
    #[arg(short = 'D', long, default_value = DEFAULT_DEVICE)]
    pub device: String,

    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value_t = 8000)]
    pub rate: u32,

    /// Bits per sample: 8, 16, 24 or 32
    #[arg(short = 'b', long, default_value_t = 16)]
    pub bits: u16,

    /// Interleaved channel count
    #[arg(short = 'c', long, default_value_t = 2)]
    pub channels: u16,

    /// Requested period size in frames (the device may round it)
    #[arg(long, default_value_t = NegotiationPolicy::DEFAULT_PERIOD_FRAMES)]
    pub period_frames: usize,

    /// Requested hardware buffer length in microseconds
    #[arg(long, default_value_t = NegotiationPolicy::DEFAULT_BUFFER_TIME_US)]
    pub buffer_time_us: u32,

    /// Requested period length in microseconds
    #[arg(long, default_value_t = NegotiationPolicy::DEFAULT_PERIOD_TIME_US)]
    pub period_time_us: u32,
}

impl StreamArgs {
    fn into_config(self) -> StreamConfig {
        StreamConfig {
            path: self.path,
            device: Some(self.device),
            rate: self.rate,
            bits: self.bits,
            channels: self.channels,
            policy: NegotiationPolicy {
                period_frames: self.period_frames,
                buffer_time_us: self.buffer_time_us,
                period_time_us: self.period_time_us,
            },
        }
    }
}

impl Command {
    pub fn record_config(&self) -> Option<RecordConfig> {
        match self {
            Command::Record { stream, duration } => Some(RecordConfig {
                stream: stream.clone().into_config(),
                duration_secs: *duration,
            }),
            Command::Play { .. } => None,
        }
    }

    pub fn play_config(&self) -> Option<PlayConfig> {
        match self {
            Command::Play { stream } => Some(PlayConfig {
                stream: stream.clone().into_config(),
            }),
            Command::Record { .. } => None,
        }
    }
}
