//! Timing-driven clustering of addresses into banks.
//!
//! A [`ClusterSession`] owns the entries of one run. [`BankClusterer`]
//! measures them through a [`crate::memory::LatencyOracle`] and groups them;
//! [`ClusterSession::check_mapping`] then validates the groups against a
//! [`crate::hypothesis::MappingHypothesis`].

mod check;
mod clusterer;
mod entry;
mod session;

pub use self::check::{Aliasing, MappingReport, Mismatch};
pub use self::clusterer::BankClusterer;
pub use self::entry::{Bank, Entry, MasterStats};
pub use self::session::{ClusterSession, SessionState};

use serde::Serialize;
use thiserror::Error;

/// Errors that abort a clustering run.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The entry arena is full
    #[error("entry capacity of {max} exhausted")]
    TooManyEntries {
        /// The configured capacity
        max: usize,
    },
    /// The clusters map to more banks than configured
    #[error("{found} banks exceed the maximum of {max}")]
    TooManyBanks {
        /// Distinct banks found so far
        found: usize,
        /// The configured maximum
        max: usize,
    },
    /// An operation was called in the wrong session state
    #[error("session is {found:?}, expected {expected:?}")]
    InvalidState {
        /// Required state
        expected: SessionState,
        /// Actual state
        found: SessionState,
    },
}

/// How a row conflict contradicts the hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InconsistencyKind {
    /// The hypothesis places the candidate and the conflicting cluster in different banks
    BankMismatch,
    /// The candidate already joined another cluster and also conflicts with this one
    SplitCluster {
        /// Master the candidate was merged into
        merged_into: usize,
    },
}

/// A row conflict that the hypothesis cannot explain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Inconsistency {
    /// Master candidate being measured
    pub entry: usize,
    /// Entry that showed the conflict
    pub conflicting: usize,
    /// Master of the conflicting entry
    pub master: usize,
    /// Hypothesised bank of the candidate
    pub entry_bank: usize,
    /// Hypothesised bank of the conflicting cluster
    pub master_bank: usize,
    /// Nature of the contradiction
    pub kind: InconsistencyKind,
}
