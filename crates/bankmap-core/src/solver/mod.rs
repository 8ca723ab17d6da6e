//! Combinatorial search for XOR bank functions.
//!
//! Given groups of addresses that share a bank, the solver looks for every XOR
//! of bits inside a [`BitWindow`] that is constant within each group:
//!
//! 1. [`Combinations`] enumerates the bit subsets depth by depth.
//! 2. [`Solution::check`] tests one subset against a sample.
//! 3. [`Solver::find_solutions`] collects the consistent subsets of one sample.
//! 4. [`Intersection`] keeps the subsets consistent with every sample so far.
//! 5. [`SolutionSet::find_unique`] drops subsets implied by shorter ones.
//!
//! [`SolverSession`] drives these steps over a stream of samples.
//!
//! Only XOR chains are searched. The solution is consistent with the observed
//! samples; it is not claimed to be the only possible bank function.

mod combination;
mod known;
mod solution;
mod solution_set;

pub use self::combination::Combinations;
pub use self::known::{KNOWN_CPU_FUNCTIONS, known_cpu_solutions, solutions_from_bitdefs};
pub use self::solution::{Op, Solution};
pub use self::solution_set::{CapacityExceeded, Intersection, SolutionSet};

use log::{debug, info, warn};
use serde::Serialize;
use thiserror::Error;

use crate::config::{BitWindow, SolverConfig};
use crate::sample::AddressSample;
use crate::util::binomial;

/// Errors that abort a solver run.
#[derive(Debug, Error)]
pub enum SolverError {
    /// More consistent solutions than the solution set can hold
    #[error(transparent)]
    Capacity(#[from] CapacityExceeded),
    /// No candidate function is constant over a sample
    #[error("sample {sample} has no consistent function in bits [{}, {}]", window.lo, window.hi)]
    Unsolvable {
        /// Index of the sample
        sample: usize,
        /// The searched window
        window: BitWindow,
    },
    /// A sample was submitted after the intersection became empty
    #[error("no common function left; sample {sample} not processed")]
    Exhausted {
        /// Index of the rejected sample
        sample: usize,
    },
}

/// Finds the XOR functions consistent with a single sample.
#[derive(Debug, Clone)]
pub struct Solver {
    window: BitWindow,
    max_solutions: usize,
}

impl Solver {
    /// Creates a solver over `config.window` with `config.max_solutions` capacity.
    pub fn new(config: &SolverConfig) -> Self {
        Solver {
            window: config.window,
            max_solutions: config.max_solutions,
        }
    }

    /// The searched bit window.
    pub fn window(&self) -> BitWindow {
        self.window
    }

    /// Returns every XOR chain in the window that is constant over `sample`.
    ///
    /// Solutions are ordered by depth, then lexicographically.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`] if more solutions are found than the configured capacity.
    pub fn find_solutions(&self, sample: &AddressSample) -> Result<SolutionSet, CapacityExceeded> {
        let mut set = SolutionSet::with_capacity(self.max_solutions);
        for depth in 1..=self.window.max_depth() {
            let before = set.len();
            let mut combinations = Combinations::new(self.window, depth);
            while let Some(indexes) = combinations.advance() {
                let mut candidate = Solution::xor(indexes);
                if candidate.check(sample) {
                    set.push(candidate)?;
                }
            }
            debug!(
                "depth {}: {} of {} candidates consistent",
                depth,
                set.len() - before,
                binomial(self.window.max_depth(), depth)
            );
        }
        Ok(set)
    }
}

/// Outcome of feeding one sample to a [`SolverSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleOutcome {
    /// The sample was intersected with the previous ones
    Narrowed {
        /// Solutions consistent with this sample alone
        found: usize,
        /// Solutions consistent with every sample so far
        surviving: usize,
    },
    /// No solution is consistent with every sample so far
    Exhausted,
}

/// A known hypothesis that is not constant over a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct KnownFailure {
    /// Index into the known hypotheses
    pub hypothesis: usize,
    /// Index of the sample
    pub sample: usize,
}

/// Result of a solver run.
#[derive(Debug, Serialize)]
pub struct SolverReport {
    /// RFC 3339 timestamp of the run
    pub date: String,
    /// The searched bit window
    pub window: BitWindow,
    /// Number of samples processed
    pub samples: usize,
    /// True if the intersection became empty
    pub exhausted: bool,
    /// Deduplicated solutions consistent with every sample
    pub solutions: Vec<Solution>,
    /// Known hypotheses that failed on some sample
    pub known_failures: Vec<KnownFailure>,
}

/// Runs the solver over a stream of samples and intersects the results.
pub struct SolverSession {
    solver: Solver,
    known: Vec<Solution>,
    intersection: Intersection,
    samples: usize,
    exhausted: bool,
    known_failures: Vec<KnownFailure>,
}

impl SolverSession {
    /// Creates a session that additionally checks `known` against every sample.
    pub fn new(config: &SolverConfig, known: Vec<Solution>) -> Self {
        SolverSession {
            solver: Solver::new(config),
            known,
            intersection: Intersection::new(),
            samples: 0,
            exhausted: false,
            known_failures: vec![],
        }
    }

    /// Number of samples processed so far.
    pub fn samples(&self) -> usize {
        self.samples
    }

    /// The running intersection, once a sample was processed.
    pub fn current(&self) -> Option<&SolutionSet> {
        self.intersection.get()
    }

    /// Solves `sample` and intersects its solutions with the previous samples.
    ///
    /// # Errors
    ///
    /// - [`SolverError::Capacity`] if the sample has too many solutions
    /// - [`SolverError::Unsolvable`] if the sample has no solution at all
    /// - [`SolverError::Exhausted`] if an earlier sample already emptied the intersection
    pub fn process(&mut self, sample: &AddressSample) -> Result<SampleOutcome, SolverError> {
        let index = self.samples;
        if self.exhausted {
            return Err(SolverError::Exhausted { sample: index });
        }
        self.samples += 1;

        let set = self.solver.find_solutions(sample)?;
        let found = set.len();
        if found == 0 {
            return Err(SolverError::Unsolvable {
                sample: index,
                window: self.solver.window(),
            });
        }
        if !self.intersection.absorb(set) {
            warn!("No common function left after sample {}", index);
            self.exhausted = true;
            return Ok(SampleOutcome::Exhausted);
        }

        for (i, hypothesis) in self.known.iter().enumerate() {
            if !hypothesis.is_constant_over(sample) {
                warn!("Known solution invalid: {} ({}) on sample {}", i, hypothesis, index);
                self.known_failures.push(KnownFailure {
                    hypothesis: i,
                    sample: index,
                });
            }
        }

        let surviving = self.intersection.get().map_or(0, |g| g.valid_count());
        info!(
            "Sample {} ({} addresses): {} solutions, {} common",
            index,
            sample.len(),
            found,
            surviving
        );
        Ok(SampleOutcome::Narrowed { found, surviving })
    }

    /// Deduplicates the surviving solutions and returns the run result.
    pub fn finish(self) -> SolverReport {
        let solutions = match self.intersection.into_inner() {
            Some(mut global) if !self.exhausted => {
                global.find_unique();
                global.valid().cloned().collect()
            }
            _ => vec![],
        };
        SolverReport {
            date: chrono::Local::now().to_rfc3339(),
            window: self.solver.window(),
            samples: self.samples,
            exhausted: self.exhausted,
            solutions,
            known_failures: self.known_failures,
        }
    }
}
