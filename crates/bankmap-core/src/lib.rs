//! # bankmap core
//!
//! `bankmap-core` recovers the function a memory controller uses to map
//! physical addresses to DRAM banks. It has two halves:
//!
//! - [`cluster`] groups addresses into same-bank clusters from pairwise access
//!   latencies (row conflicts are slow) and validates the clusters against a
//!   [`hypothesis::MappingHypothesis`].
//! - [`solver`] searches, for a set of same-bank address groups, every XOR of
//!   address bits that is constant within each group, intersects the results
//!   across groups and removes redundant combinations.
//!
//! Hardware access is consumed through narrow traits in [`memory`]:
//! [`memory::LatencyOracle`] for timing and [`memory::VirtToPhysResolver`] for
//! address translation. Linux/x86-64 implementations live in `bankmap-x86`.
//!
//! All algorithms are single threaded and deterministic. Measurement accuracy
//! depends on serialised execution.

#![warn(missing_docs)]

pub mod cluster;
pub mod config;
pub mod hypothesis;
pub mod memory;
pub mod sample;
pub mod solver;
pub mod util;

pub use crate::cluster::{BankClusterer, ClusterError, ClusterSession, MappingReport};
pub use crate::config::{BitDef, BitWindow, Config};
pub use crate::hypothesis::{MappingHypothesis, XorBankFunction};
pub use crate::sample::{AddressSample, SampleError, SampleReader};
pub use crate::solver::{Solution, SolutionSet, SolverError, SolverReport, SolverSession};
