//! Run configuration.
//!
//! Every tunable of a run lives in [`Config`], which is loaded from a JSON file.
//! Missing fields fall back to the defaults below.
//!
//! ```json
//! {
//!   "solver": { "window": { "lo": 11, "hi": 24 }, "max_solutions": 1000 },
//!   "cluster": { "outlier_percentage": 20.0 },
//!   "bank_bits": [14, [15, 18], [16, 19], [17, 20], [12, 13, 15, 16]]
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

use crate::util::{ADDR_BITS, MB, MIN_BANK_SIZE};

/// Defines which physical address bits feed one bank-id bit.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum BitDef {
    /// Single address bit
    Single(u64),
    /// XOR of multiple address bits
    Multi(Vec<u64>),
}

impl BitDef {
    /// Converts the bit definition to a bitmask with the referenced bits set.
    pub fn to_bitstr(&self) -> u64 {
        match self {
            BitDef::Single(bit) => 1 << bit,
            BitDef::Multi(bits) => bits.iter().fold(0, |acc, bit| acc | 1 << bit),
        }
    }

    /// The referenced address bits in ascending order.
    pub fn bits(&self) -> Vec<usize> {
        let mut bits = match self {
            BitDef::Single(bit) => vec![*bit as usize],
            BitDef::Multi(bits) => bits.iter().map(|b| *b as usize).collect(),
        };
        bits.sort_unstable();
        bits.dedup();
        bits
    }
}

/// Inclusive range of address bits searched for the bank function.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct BitWindow {
    /// Lowest candidate bit
    pub lo: usize,
    /// Highest candidate bit (inclusive)
    pub hi: usize,
}

impl BitWindow {
    /// Creates a window over `lo..=hi`.
    ///
    /// # Panics
    ///
    /// Panics if `lo > hi` or `hi` is not a valid address bit.
    pub fn new(lo: usize, hi: usize) -> Self {
        assert!(lo <= hi, "empty bit window [{}, {}]", lo, hi);
        assert!(hi < ADDR_BITS, "bit {} exceeds address width", hi);
        BitWindow { lo, hi }
    }

    /// Creates a window from user input, rejecting what [`BitWindow::new`] would panic on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `lo > hi` or `hi` is not a valid address bit.
    pub fn try_new(lo: usize, hi: usize) -> Result<Self> {
        if lo > hi || hi >= ADDR_BITS {
            return Err(ConfigError::Invalid(format!("bit window [{}, {}]", lo, hi)));
        }
        Ok(BitWindow { lo, hi })
    }

    /// Number of bits in the window, which bounds the depth of any solution.
    pub fn max_depth(&self) -> usize {
        self.hi - self.lo + 1
    }

    /// Returns true if `bit` lies in the window.
    pub fn contains(&self, bit: usize) -> bool {
        (self.lo..=self.hi).contains(&bit)
    }
}

impl Default for BitWindow {
    fn default() -> Self {
        BitWindow { lo: 11, hi: 24 }
    }
}

/// Parameters of the combinatorial solver.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SolverConfig {
    /// Candidate bit window
    pub window: BitWindow,
    /// Maximum number of addresses in a single sample
    pub max_addrs_per_sample: usize,
    /// Capacity of a solution set
    pub max_solutions: usize,
    /// Check the known hypotheses against every sample
    pub check_known: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            window: BitWindow::default(),
            max_addrs_per_sample: 1000,
            max_solutions: 1000,
            check_known: true,
        }
    }
}

/// Parameters of the bank clusterer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ClusterConfig {
    /// How far above the mean (in percent) a latency must be to count as a row conflict
    pub outlier_percentage: f64,
    /// Fewer clusters than this is reported as suspicious
    pub min_banks: usize,
    /// More distinct banks than this aborts the run
    pub max_banks: usize,
    /// Capacity of the entry arena
    pub max_entries: usize,
}

impl ClusterConfig {
    /// Latency threshold for a given mean latency.
    pub fn threshold(&self, mean: f64) -> f64 {
        mean * (1.0 + self.outlier_percentage / 100.0)
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            outlier_percentage: 20.0,
            min_banks: 8,
            max_banks: 64,
            max_entries: (16 * MB) / MIN_BANK_SIZE,
        }
    }
}

/// Parameters of the measurement layer.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct MeasureConfig {
    /// Size of the physically contiguous block under test in bytes
    pub mem_size: usize,
    /// Distance between two entries in bytes
    pub stride: usize,
    /// Access pairs per timed round
    pub inner_rounds: usize,
    /// Timed rounds per measurement
    pub outer_rounds: usize,
    /// Rounds slower than this multiple of the baseline are rejected
    pub threshold_multiplier: f64,
    /// Core to pin to, `None` selects the last online core
    pub cpu_core: Option<usize>,
    /// Disable the hardware prefetchers through `IA32_MISC_ENABLE`
    pub disable_prefetch: bool,
    /// Allocate the block from a 1 GB hugepage instead of probing mmap regions
    pub hugepage: bool,
    /// Attempts to find contiguous pages when not using hugepages
    pub mmap_attempts: usize,
}

impl Default for MeasureConfig {
    fn default() -> Self {
        Self {
            mem_size: 16 * MB,
            stride: MIN_BANK_SIZE,
            inner_rounds: 10,
            outer_rounds: 1000,
            threshold_multiplier: 5.0,
            cpu_core: None,
            disable_prefetch: true,
            hugepage: true,
            mmap_attempts: 100,
        }
    }
}

/// Errors that can occur when loading or validating a configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The configuration file is not valid JSON for [`Config`]
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    /// A value is out of its permitted range
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Complete run configuration.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Solver parameters
    pub solver: SolverConfig,
    /// Clusterer parameters
    pub cluster: ClusterConfig,
    /// Measurement parameters
    pub measure: MeasureConfig,
    /// Mapping hypothesis used to validate clusters
    pub bank_bits: Vec<BitDef>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver: SolverConfig::default(),
            cluster: ClusterConfig::default(),
            measure: MeasureConfig::default(),
            bank_bits: vec![
                BitDef::Single(14),
                BitDef::Multi(vec![15, 18]),
                BitDef::Multi(vec![16, 19]),
                BitDef::Multi(vec![17, 20]),
                BitDef::Multi(vec![12, 13, 15, 16]),
            ],
        }
    }
}

impl Config {
    /// Loads and validates a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails [`Config::validate`].
    pub fn from_jsonfile(filepath: impl AsRef<Path>) -> Result<Config> {
        let mut file = File::open(filepath.as_ref())?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config: Config = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges that deserialisation alone cannot enforce.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first offending value.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let window = self.solver.window;
        if window.lo > window.hi || window.hi >= ADDR_BITS {
            return invalid(format!("bit window [{}, {}]", window.lo, window.hi));
        }
        if self.solver.max_solutions == 0 || self.solver.max_addrs_per_sample == 0 {
            return invalid("solver capacities must be positive".into());
        }
        if self.cluster.outlier_percentage < 0.0 {
            return invalid(format!(
                "outlier percentage {}",
                self.cluster.outlier_percentage
            ));
        }
        if self.cluster.min_banks > self.cluster.max_banks {
            return invalid(format!(
                "min_banks {} > max_banks {}",
                self.cluster.min_banks, self.cluster.max_banks
            ));
        }
        if self.cluster.max_entries == 0 || self.measure.stride == 0 {
            return invalid("entry capacity and stride must be positive".into());
        }
        if let Some(bit) = self
            .bank_bits
            .iter()
            .flat_map(|def| def.bits())
            .find(|bit| *bit >= ADDR_BITS)
        {
            return invalid(format!("bank bit {} exceeds address width", bit));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_from_user_input() {
        assert_eq!(BitWindow::try_new(11, 24).ok(), Some(BitWindow::new(11, 24)));
        assert_eq!(BitWindow::try_new(63, 63).ok(), Some(BitWindow::new(63, 63)));
        assert!(matches!(BitWindow::try_new(11, 64), Err(ConfigError::Invalid(_))));
        assert!(matches!(BitWindow::try_new(20, 12), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "solver": { "window": { "lo": 6, "hi": 9 } } }"#)
                .expect("valid json");
        assert_eq!(config.solver.window, BitWindow::new(6, 9));
        assert_eq!(config.solver.max_solutions, 1000);
        assert_eq!(config.cluster, ClusterConfig::default());
        assert_eq!(config.bank_bits.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bitdef_untagged() {
        let defs: Vec<BitDef> = serde_json::from_str("[14, [18, 15]]").expect("valid json");
        assert_eq!(defs[0], BitDef::Single(14));
        assert_eq!(defs[1].bits(), vec![15, 18]);
        assert_eq!(defs[1].to_bitstr(), (1 << 15) | (1 << 18));
    }

    #[test]
    fn test_validate_rejects_bad_window() {
        let mut config = Config::default();
        config.solver.window = BitWindow { lo: 20, hi: 10 };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_bank_bounds() {
        let mut config = Config::default();
        config.cluster.min_banks = 128;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_threshold() {
        let cluster = ClusterConfig::default();
        assert!((cluster.threshold(350.0) - 420.0).abs() < 1e-9);
    }

    #[test]
    fn test_window_depth() {
        assert_eq!(BitWindow::default().max_depth(), 14);
        assert!(BitWindow::default().contains(24));
        assert!(!BitWindow::default().contains(10));
    }
}
