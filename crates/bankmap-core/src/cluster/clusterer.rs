use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::{debug, info, warn};

use super::{ClusterError, ClusterSession, Inconsistency, InconsistencyKind, MasterStats, SessionState};
use crate::config::ClusterConfig;
use crate::hypothesis::MappingHypothesis;
use crate::memory::LatencyOracle;
use crate::util::NamedProgress;

/// Groups entries into same-bank clusters from pairwise access latencies.
///
/// Entries are visited in arena order. Every entry that is not yet part of a
/// cluster becomes a master candidate and is measured against all later
/// entries. Pairs whose latency exceeds the mean of the candidate's
/// measurements by more than the outlier percentage count as row conflicts
/// and join the candidate's cluster.
pub struct BankClusterer {
    config: ClusterConfig,
    progress: Option<MultiProgress>,
}

impl BankClusterer {
    /// Creates a clusterer, optionally reporting progress.
    pub fn new(config: ClusterConfig, progress: Option<MultiProgress>) -> Self {
        BankClusterer { config, progress }
    }

    /// The clusterer's configuration.
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Clusters the entries of `session`.
    ///
    /// A conflicting entry that already belongs to another master is resolved
    /// with `hypothesis`: if the candidate and that master map to the same
    /// bank, the candidate joins the existing cluster; otherwise the
    /// disagreement is recorded and the pair stays apart.
    ///
    /// Returns the number of clusters.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::InvalidState`] if the session was already clustered.
    pub fn cluster(
        &self,
        session: &mut ClusterSession,
        oracle: &dyn LatencyOracle,
        hypothesis: &dyn MappingHypothesis,
    ) -> Result<usize, ClusterError> {
        session.expect_state(SessionState::Unprocessed)?;
        session.state = SessionState::Measuring;

        let n = session.entries.len();
        let p = self.progress.as_ref().map(|p| {
            p.add(ProgressBar::new(n as u64).with_style(ProgressStyle::named_bar("Clustering")))
        });
        info!("Clustering {} entries", n);

        for i in 0..n {
            if let Some(p) = &p {
                p.inc(1);
            }
            if session.entries[i].associated {
                continue;
            }
            let a = session.entries[i].virt_addr() as *const u8;
            let latencies: Vec<(usize, f64)> = (i + 1..n)
                .map(|j| {
                    let b = session.entries[j].virt_addr() as *const u8;
                    // SAFETY: entry addresses stay mapped for the lifetime of the session
                    (j, unsafe { oracle.measure_latency(a, b) })
                })
                .collect();
            if latencies.is_empty() {
                continue;
            }

            let mean = latencies.iter().map(|(_, t)| t).sum::<f64>() / latencies.len() as f64;
            let threshold = self.config.threshold(mean);
            let mut stats = MasterStats {
                measured: latencies.len(),
                mean,
                threshold,
                max_quiet: None,
                conflicts: 0,
            };

            // master that receives new siblings; changes once `i` is absorbed
            let mut target = i;
            for (j, latency) in latencies {
                if latency < threshold {
                    stats.max_quiet = Some(stats.max_quiet.map_or(latency, |m| m.max(latency)));
                    continue;
                }
                stats.conflicts += 1;
                match session.entries[j].master {
                    None => session.attach(target, j),
                    Some(m) if m == target => {}
                    Some(m) => {
                        let entry_bank = hypothesis.bank_of(session.entries[i].phys_addr());
                        let master_bank = hypothesis.bank_of(session.entries[m].phys_addr());
                        if target == i && entry_bank == master_bank {
                            debug!("Merging entry {} into cluster of {} (bank {})", i, m, master_bank);
                            session.absorb(i, m);
                            target = m;
                            continue;
                        }
                        let kind = if target == i {
                            InconsistencyKind::BankMismatch
                        } else {
                            InconsistencyKind::SplitCluster { merged_into: target }
                        };
                        warn!(
                            "Entry {} conflicts with {} of cluster {}: {:?} (banks {} vs {})",
                            i, j, m, kind, entry_bank, master_bank
                        );
                        session.inconsistencies.push(Inconsistency {
                            entry: i,
                            conflicting: j,
                            master: m,
                            entry_bank,
                            master_bank,
                            kind,
                        });
                    }
                }
            }
            debug!(
                "Entry {}: mean {:.1}, threshold {:.1}, {} conflicts, max quiet {:?}",
                i, stats.mean, stats.threshold, stats.conflicts, stats.max_quiet
            );
            session.entries[i].stats = Some(stats);
        }
        if let Some(p) = &p {
            p.finish();
        }

        session.state = SessionState::Clustered;
        let clusters = session.masters().count();
        info!(
            "Found {} clusters, {} inconsistencies",
            clusters,
            session.inconsistencies.len()
        );
        Ok(clusters)
    }
}

impl ClusterSession {
    /// Attaches the unassociated entry `j` to the cluster of `master`.
    fn attach(&mut self, master: usize, j: usize) {
        self.entries[master].siblings.push(j);
        self.entries[j].associated = true;
        self.entries[j].master = Some(master);
    }

    /// Moves master `i` and its siblings into the cluster of `master`.
    fn absorb(&mut self, i: usize, master: usize) {
        let moved = std::mem::take(&mut self.entries[i].siblings);
        for &s in &moved {
            self.entries[s].master = Some(master);
        }
        self.entries[i].associated = true;
        self.entries[i].master = Some(master);
        self.entries[master].siblings.push(i);
        self.entries[master].siblings.extend(moved);
    }
}
