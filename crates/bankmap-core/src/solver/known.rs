use super::Solution;
use crate::config::BitDef;

/// Bank functions reported for a desktop CPU memory controller.
///
/// Each entry is one bank-id bit given as the XOR of the listed address bits.
pub const KNOWN_CPU_FUNCTIONS: [&[usize]; 5] =
    [&[14], &[15, 18], &[16, 19], &[17, 20], &[12, 13, 15, 16]];

/// The known CPU bank functions as solutions.
pub fn known_cpu_solutions() -> Vec<Solution> {
    KNOWN_CPU_FUNCTIONS
        .iter()
        .map(|bits| Solution::xor(bits))
        .collect()
}

/// Converts configured bank bit definitions to solutions.
pub fn solutions_from_bitdefs(defs: &[BitDef]) -> Vec<Solution> {
    defs.iter().map(Solution::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_default_bank_bits_match_known_table() {
        let configured = solutions_from_bitdefs(&Config::default().bank_bits);
        assert_eq!(configured, known_cpu_solutions());
    }
}
