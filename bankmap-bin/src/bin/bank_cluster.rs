use std::fs::File;
use std::io::BufWriter;

use anyhow::Result;
use bankmap_bin::{init_logging_with_progress, save_json};
use bankmap_core::cluster::{BankClusterer, ClusterSession, Inconsistency, MappingReport};
use bankmap_core::config::Config;
use bankmap_core::hypothesis::XorBankFunction;
use bankmap_core::sample::write_samples;
use bankmap_x86::{ContiguousBlock, CpuGuard, RdtscOracle};
use clap::Parser;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

/// CLI arguments for the `bank_cluster` binary.
#[derive(Debug, Parser, Serialize, Clone)]
struct CliArgs {
    /// The bankmap config file. Defaults are used if not given.
    #[clap(long = "config")]
    config: Option<String>,
    /// Percentage above the mean latency that counts as a row conflict.
    #[clap(long = "outlier-percentage")]
    outlier_percentage: Option<f64>,
    /// Maximum number of addresses to cluster.
    #[clap(long = "max-entries")]
    max_entries: Option<usize>,
    /// Minimum cluster size written to the groups file.
    #[clap(long = "min-group-size", default_value = "8")]
    min_group_size: usize,
    /// Write the clusters to this sample file for `find_algo`.
    #[clap(long = "groups")]
    groups: Option<String>,
    /// Output file for results (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClusterResults {
    args: CliArgs,
    entries: usize,
    report: MappingReport,
    inconsistencies: Vec<Inconsistency>,
}

fn main() -> Result<()> {
    let progress = init_logging_with_progress()?;
    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);

    let mut config = match &args.config {
        Some(path) => Config::from_jsonfile(path)?,
        None => Config::default(),
    };
    if let Some(pct) = args.outlier_percentage {
        config.cluster.outlier_percentage = pct;
    }
    if let Some(max) = args.max_entries {
        config.cluster.max_entries = max;
    }
    config.validate()?;

    let guard = CpuGuard::acquire(config.measure.cpu_core, config.measure.disable_prefetch)?;
    let block = ContiguousBlock::allocate(&config.measure)?;

    let stride = config.measure.stride;
    let mut session = ClusterSession::from_contiguous(
        block.ptr() as usize,
        block.phys(),
        block.len(),
        stride,
        config.cluster.max_entries,
    );
    info!("Prepared {} entries with stride 0x{:x}", session.len(), stride);

    // SAFETY: the block is mapped, locked and larger than one page
    let oracle = unsafe { RdtscOracle::calibrate(block.ptr(), &config.measure) };
    let hypothesis = XorBankFunction::from_bitdefs(&config.bank_bits);
    let clusterer = BankClusterer::new(config.cluster.clone(), Some(progress));
    clusterer.cluster(&mut session, &oracle, &hypothesis)?;
    let report = session.check_mapping(&hypothesis, &config.cluster)?;

    for m in session.masters() {
        let master = &session.entries()[m];
        let Some(bank) = master.bank() else {
            continue;
        };
        let siblings = master
            .siblings()
            .iter()
            .map(|&s| format!("0x{:x}", session.entries()[s].phys_addr()))
            .join(" ");
        println!(
            "Bank {:2} (0x{:x}): {} siblings: {}",
            bank,
            master.phys_addr(),
            master.siblings().len(),
            siblings
        );
    }
    if let Some((min, max, avg)) = report.occupancy_range() {
        println!(
            "Banks: {}, addresses per bank: min {}, max {}, avg {:.1}",
            report.occupancy.len(),
            min,
            max,
            avg
        );
    }
    if report.is_consistent() {
        info!("Clusters agree with the configured bank function");
    } else {
        warn!(
            "{} mismatches, {} aliases, {} unresolved entries",
            report.mismatches.len(),
            report.aliases.len(),
            report.unresolved.len()
        );
    }

    if let Some(path) = &args.groups {
        let groups = session.groups(args.min_group_size);
        write_samples(BufWriter::new(File::create(path)?), groups.iter().map(|(id, s)| (*id, s)))?;
        info!("Wrote {} groups to {}", groups.len(), path);
    }
    if let Some(output) = &args.output {
        let results = ClusterResults {
            args: args.clone(),
            entries: session.len(),
            report,
            inconsistencies: session.inconsistencies().to_vec(),
        };
        save_json(&results, output)?;
    }
    drop(block);
    drop(guard);
    Ok(())
}
