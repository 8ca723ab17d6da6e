use std::fs::File;
use std::io::BufReader;

use anyhow::{Context, Result, bail};
use bankmap_bin::{init_logging_with_progress, save_json};
use bankmap_core::config::{BitWindow, Config};
use bankmap_core::sample::SampleReader;
use bankmap_core::solver::{SampleOutcome, SolverSession, solutions_from_bitdefs};
use clap::Parser;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;

/// CLI arguments for the `find_algo` binary.
#[derive(Debug, Parser, Serialize, Clone)]
struct CliArgs {
    /// Sample file with `Bank <id>` headers followed by hex addresses.
    #[clap(default_value = "data.txt")]
    input: String,
    /// The bankmap config file. Defaults are used if not given.
    #[clap(long = "config")]
    config: Option<String>,
    /// Lowest address bit to search.
    #[clap(long = "lo")]
    lo: Option<usize>,
    /// Highest address bit to search.
    #[clap(long = "hi")]
    hi: Option<usize>,
    /// Maximum number of solutions per sample.
    #[clap(long = "max-solutions")]
    max_solutions: Option<usize>,
    /// Output file for the report (JSON format).
    #[clap(long = "output")]
    output: Option<String>,
}

fn main() -> Result<()> {
    init_logging_with_progress()?;
    let args = CliArgs::parse();
    info!("CLI args: {:?}", args);

    let mut config = match &args.config {
        Some(path) => Config::from_jsonfile(path)?,
        None => Config::default(),
    };
    let window = config.solver.window;
    if args.lo.is_some() || args.hi.is_some() {
        let lo = args.lo.unwrap_or(window.lo);
        let hi = args.hi.unwrap_or(window.hi);
        config.solver.window = BitWindow::try_new(lo, hi)?;
    }
    if let Some(max) = args.max_solutions {
        config.solver.max_solutions = max;
    }
    config.validate()?;

    let known = if config.solver.check_known {
        solutions_from_bitdefs(&config.bank_bits)
    } else {
        vec![]
    };
    let file = File::open(&args.input).with_context(|| format!("open {}", args.input))?;
    let reader = SampleReader::new(BufReader::new(file), config.solver.max_addrs_per_sample);
    let mut session = SolverSession::new(&config.solver, known);

    for sample in reader {
        let sample = sample?;
        if sample.is_empty() {
            warn!("Skipping empty sample {}", session.samples());
            continue;
        }
        if session.process(&sample)? == SampleOutcome::Exhausted {
            break;
        }
    }
    if session.samples() == 0 {
        bail!("No samples in {}", args.input);
    }

    let report = session.finish();
    for solution in &report.solutions {
        println!("Indexes: {}", solution.indexes().iter().join(" "));
        println!("Ops: {}", solution.ops().iter().join(" "));
    }
    println!("Number of solutions: {}", report.solutions.len());
    if report.exhausted {
        warn!("No function is consistent with all {} samples", report.samples);
    }
    if !report.known_failures.is_empty() {
        warn!("{} known hypothesis checks failed", report.known_failures.len());
    }

    if let Some(output) = &args.output {
        save_json(&report, output)?;
    }
    Ok(())
}
