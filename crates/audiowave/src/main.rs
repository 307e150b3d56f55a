//! audiowave: record raw PCM from a sound card, or play a raw PCM file back.
//!
//! Files are headerless interleaved samples; the same rate, depth and channel
//! count used to record must be given to play them back.

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use audiowave::cli::{self, Command};
use audiowave::runtime;
use audiowave_engine::format_elapsed;

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,audiowave=info")),
        )
        .init();

    let report = match &args.cmd {
        Command::Record { .. } => {
            let config = args.cmd.record_config().context("record config")?;
            runtime::run_record(config)?
        }
        Command::Play { .. } => {
            let config = args.cmd.play_config().context("play config")?;
            runtime::run_play(config)?
        }
    };

    tracing::info!(
        elapsed = %format_elapsed(report.elapsed()),
        stop = ?report.stop_reason,
        "done"
    );
    if args.report_json {
        let json = serde_json::to_string_pretty(&report).context("serialize session report")?;
        println!("{json}");
    }
    Ok(())
}
