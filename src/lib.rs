//! # bankmap
//!
//! Recovers the XOR functions a memory controller uses to map physical
//! addresses to DRAM banks.
//!
//! Measuring is done in two steps:
//!
//! 1. Cluster addresses by bank from row-conflict timing
//!    ([`cluster::BankClusterer`], hardware access in `bankmap-x86`).
//! 2. Search the XOR functions that are constant within every cluster
//!    ([`solver::SolverSession`]).
//!
//! The binaries `bank_cluster` and `find_algo` in `bankmap-bin` run these
//! steps from the command line.
//!
//! ## Features
//!
//! - `x86`: re-exports the Linux x86-64 hardware layer as [`x86`].

pub use bankmap_core::*;

#[cfg(feature = "x86")]
pub use bankmap_x86 as x86;
