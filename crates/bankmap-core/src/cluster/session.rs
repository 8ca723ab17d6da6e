use std::collections::BTreeMap;

use serde::Serialize;

use super::{Bank, ClusterError, Entry, Inconsistency};
use crate::memory::PhysAddr;
use crate::sample::AddressSample;

/// Lifecycle of a [`ClusterSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// Entries may still be added
    Unprocessed,
    /// Clustering is running
    Measuring,
    /// Clusters are final and can be checked
    Clustered,
}

/// State of one clustering run: the entry arena, the bank table and the
/// inconsistencies found so far.
///
/// A session is built fresh for every run and never reused.
#[derive(Debug)]
pub struct ClusterSession {
    pub(crate) entries: Vec<Entry>,
    capacity: usize,
    pub(crate) state: SessionState,
    pub(crate) inconsistencies: Vec<Inconsistency>,
    pub(crate) banks: BTreeMap<usize, Bank>,
}

impl ClusterSession {
    /// Creates an empty session holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        ClusterSession {
            entries: Vec::with_capacity(capacity.min(1 << 16)),
            capacity,
            state: SessionState::Unprocessed,
            inconsistencies: vec![],
            banks: BTreeMap::new(),
        }
    }

    /// Creates a session over a physically contiguous block.
    ///
    /// Entry `i` is `virt + i * stride` at `phys + i * stride`, for
    /// `i < min(capacity, len / stride)`.
    pub fn from_contiguous(
        virt: usize,
        phys: PhysAddr,
        len: usize,
        stride: usize,
        capacity: usize,
    ) -> Self {
        assert!(stride > 0, "stride must be positive");
        let mut session = Self::new(capacity);
        let count = (len / stride).min(capacity);
        session.entries.extend((0..count).map(|i| {
            let offset = i * stride;
            Entry::new(virt + offset, PhysAddr::new(phys.as_u64() + offset as u64))
        }));
        session
    }

    /// Adds an address pair under test and returns its arena index.
    ///
    /// `virt_addr` is handed to the latency oracle and must stay mapped for
    /// the lifetime of the session.
    ///
    /// # Errors
    ///
    /// - [`ClusterError::TooManyEntries`] if the arena is full
    /// - [`ClusterError::InvalidState`] if clustering already started
    pub fn push(&mut self, virt_addr: usize, phys_addr: PhysAddr) -> Result<usize, ClusterError> {
        self.expect_state(SessionState::Unprocessed)?;
        if self.entries.len() >= self.capacity {
            return Err(ClusterError::TooManyEntries {
                max: self.capacity,
            });
        }
        self.entries.push(Entry::new(virt_addr, phys_addr));
        Ok(self.entries.len() - 1)
    }

    pub(crate) fn expect_state(&self, expected: SessionState) -> Result<(), ClusterError> {
        if self.state != expected {
            return Err(ClusterError::InvalidState {
                expected,
                found: self.state,
            });
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// All entries in arena order.
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the session holds no entry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Indices of the cluster masters in arena order.
    pub fn masters(&self) -> impl Iterator<Item = usize> + '_ {
        self.entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.is_master())
            .map(|(i, _)| i)
    }

    /// Hypothesis inconsistencies recorded while clustering.
    pub fn inconsistencies(&self) -> &[Inconsistency] {
        &self.inconsistencies
    }

    /// Bank table built by the last mapping check, keyed by bank id.
    pub fn banks(&self) -> &BTreeMap<usize, Bank> {
        &self.banks
    }

    /// The clusters with at least `min_size` members as address samples.
    ///
    /// Groups are numbered by master order. The master comes first in each group.
    pub fn groups(&self, min_size: usize) -> Vec<(usize, AddressSample)> {
        self.masters()
            .map(|m| {
                let members = std::iter::once(m).chain(self.entries[m].siblings.iter().copied());
                members
                    .map(|i| self.entries[i].phys_addr())
                    .collect::<AddressSample>()
            })
            .filter(|sample| sample.len() >= min_size)
            .enumerate()
            .collect()
    }
}
