//! # bankmap-bin
//!
//! Command line front-ends for bankmap:
//!
//! - `bank_cluster` measures row-conflict latencies on this machine, groups
//!   addresses by bank and writes the groups to a sample file.
//! - `find_algo` reads a sample file and searches the XOR bank functions that
//!   are consistent with every group.
//!
//! `bank_cluster` needs root privileges for the pagemap and MSR interfaces.
//! Logging is configured through `RUST_LOG` (default `info`).

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::info;
use serde::Serialize;

pub fn init_logging_with_progress() -> anyhow::Result<MultiProgress> {
    let logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).build();
    let progress = MultiProgress::new();
    LogWrapper::new(progress.clone(), logger).try_init()?;
    Ok(progress)
}

/// Writes `value` as pretty JSON to `filename`.
pub fn save_json<T: Serialize>(value: &T, filename: impl AsRef<Path>) -> anyhow::Result<()> {
    let file = File::create(filename.as_ref())?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    info!("Results saved to {}", filename.as_ref().display());
    Ok(())
}
