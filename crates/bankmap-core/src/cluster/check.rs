use std::collections::BTreeMap;

use log::{info, warn};
use serde::Serialize;

use super::{Bank, ClusterError, ClusterSession, SessionState};
use crate::config::ClusterConfig;
use crate::hypothesis::MappingHypothesis;

/// A sibling the hypothesis places in a different bank than its master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Mismatch {
    /// Arena index of the sibling
    pub entry: usize,
    /// Arena index of its master
    pub master: usize,
    /// Bank id of the master
    pub expected: usize,
    /// Bank id of the sibling
    pub found: usize,
}

/// Two clusters the hypothesis maps to the same bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Aliasing {
    /// The shared bank id
    pub bank: usize,
    /// Master that claimed the bank first
    pub first: usize,
    /// Master that maps to the same bank
    pub second: usize,
}

/// Outcome of validating clusters against a mapping hypothesis.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MappingReport {
    /// Number of clusters checked
    pub clusters: usize,
    /// Siblings disagreeing with their master
    pub mismatches: Vec<Mismatch>,
    /// Clusters collapsed onto one bank id
    pub aliases: Vec<Aliasing>,
    /// Entries that never received a bank id
    pub unresolved: Vec<usize>,
    /// Entries per bank id
    pub occupancy: BTreeMap<usize, usize>,
}

impl MappingReport {
    /// Returns true if the hypothesis explains every cluster.
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty() && self.aliases.is_empty() && self.unresolved.is_empty()
    }

    /// Smallest, largest and mean number of entries per bank.
    pub fn occupancy_range(&self) -> Option<(usize, usize, f64)> {
        let min = *self.occupancy.values().min()?;
        let max = *self.occupancy.values().max()?;
        let total: usize = self.occupancy.values().sum();
        Some((min, max, total as f64 / self.occupancy.len() as f64))
    }
}

impl ClusterSession {
    /// Assigns bank ids to all clusters and checks them against `hypothesis`.
    ///
    /// Every disagreement is reported, none is fatal.
    ///
    /// # Errors
    ///
    /// - [`ClusterError::InvalidState`] if the session is not clustered yet
    /// - [`ClusterError::TooManyBanks`] if the clusters span more than `config.max_banks` banks,
    ///   in which case the bank assignment of the previous check is kept
    pub fn check_mapping(
        &mut self,
        hypothesis: &dyn MappingHypothesis,
        config: &ClusterConfig,
    ) -> Result<MappingReport, ClusterError> {
        self.expect_state(SessionState::Clustered)?;

        // results are committed to the session only once the check succeeded
        let mut banks: BTreeMap<usize, Bank> = BTreeMap::new();
        let mut assigned: Vec<Option<usize>> = vec![None; self.entries.len()];
        let mut report = MappingReport::default();
        let masters: Vec<usize> = self.masters().collect();
        report.clusters = masters.len();

        for &m in &masters {
            let id = hypothesis.bank_of(self.entries[m].phys_addr());
            assigned[m] = Some(id);
            match banks.get(&id) {
                Some(bank) => {
                    warn!(
                        "Clusters of {} and {} both map to bank {}",
                        bank.master, m, id
                    );
                    report.aliases.push(Aliasing {
                        bank: id,
                        first: bank.master,
                        second: m,
                    });
                }
                None => {
                    banks.insert(id, Bank { id, master: m });
                    if banks.len() > config.max_banks {
                        return Err(ClusterError::TooManyBanks {
                            found: banks.len(),
                            max: config.max_banks,
                        });
                    }
                }
            }

            let siblings = self.entries[m].siblings();
            for &s in siblings {
                let found = hypothesis.bank_of(self.entries[s].phys_addr());
                assigned[s] = Some(id);
                if found != id {
                    warn!(
                        "Bank mismatch: entry {} ({:?}) maps to {}, master {} to {}",
                        s,
                        self.entries[s].phys_addr(),
                        found,
                        m,
                        id
                    );
                    report.mismatches.push(Mismatch {
                        entry: s,
                        master: m,
                        expected: id,
                        found,
                    });
                }
            }
            *report.occupancy.entry(id).or_insert(0) += 1 + siblings.len();
        }

        report.unresolved = assigned
            .iter()
            .enumerate()
            .filter(|(_, bank)| bank.is_none())
            .map(|(i, _)| i)
            .collect();
        for &i in &report.unresolved {
            warn!("Entry {} was not assigned a bank", i);
        }
        for (entry, bank) in self.entries.iter_mut().zip(assigned) {
            entry.bank = bank;
        }
        self.banks = banks;
        if report.clusters < config.min_banks {
            warn!(
                "Only {} clusters found, expected at least {} banks",
                report.clusters, config.min_banks
            );
        }
        info!(
            "Mapping check: {} banks, {} mismatches, {} aliased, {} unresolved",
            self.banks.len(),
            report.mismatches.len(),
            report.aliases.len(),
            report.unresolved.len()
        );
        Ok(report)
    }
}
