use serde::Serialize;

use crate::memory::PhysAddr;

/// Latency statistics of one cluster master.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MasterStats {
    /// Number of later entries measured against the master
    pub measured: usize,
    /// Mean latency over all measured pairs
    pub mean: f64,
    /// Latencies at or above this value count as row conflicts
    pub threshold: f64,
    /// Slowest latency that stayed below the threshold
    pub max_quiet: Option<f64>,
    /// Number of pairs at or above the threshold
    pub conflicts: usize,
}

/// An address under test.
///
/// Entries live in the arena of a [`super::ClusterSession`] and refer to each
/// other by arena index.
#[derive(Debug, Clone)]
pub struct Entry {
    virt_addr: usize,
    phys_addr: PhysAddr,
    pub(crate) bank: Option<usize>,
    pub(crate) siblings: Vec<usize>,
    pub(crate) associated: bool,
    pub(crate) master: Option<usize>,
    pub(crate) stats: Option<MasterStats>,
}

impl Entry {
    pub(crate) fn new(virt_addr: usize, phys_addr: PhysAddr) -> Self {
        Entry {
            virt_addr,
            phys_addr,
            bank: None,
            siblings: vec![],
            associated: false,
            master: None,
            stats: None,
        }
    }

    /// Virtual address used for measurements.
    pub fn virt_addr(&self) -> usize {
        self.virt_addr
    }

    /// Physical address used for hypothesis checks.
    pub fn phys_addr(&self) -> PhysAddr {
        self.phys_addr
    }

    /// Bank id assigned by the last mapping check.
    pub fn bank(&self) -> Option<usize> {
        self.bank
    }

    /// Indices of the entries believed to share this entry's bank.
    pub fn siblings(&self) -> &[usize] {
        &self.siblings
    }

    /// Returns true if this entry belongs to another entry's cluster.
    pub fn is_associated(&self) -> bool {
        self.associated
    }

    /// Index of the master this entry was attached to.
    pub fn master(&self) -> Option<usize> {
        self.master
    }

    /// Measurement statistics, present for entries measured as master candidates.
    pub fn stats(&self) -> Option<&MasterStats> {
        self.stats.as_ref()
    }

    /// Returns true if this entry heads a cluster.
    pub fn is_master(&self) -> bool {
        !self.associated
    }
}

/// A bank and the master entry representing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Bank {
    /// Bank id assigned by the mapping hypothesis
    pub id: usize,
    /// Arena index of the master entry
    pub master: usize,
}
