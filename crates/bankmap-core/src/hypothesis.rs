//! Mapping hypotheses: candidate functions from physical address to bank id.
//!
//! Hypotheses validate clusters after the fact; they never produce them.

use crate::config::BitDef;
use crate::memory::PhysAddr;
use crate::solver::{Solution, SolutionSet};

/// A candidate bank function.
pub trait MappingHypothesis {
    /// Returns the bank id the hypothesis assigns to `addr`.
    fn bank_of(&self, addr: PhysAddr) -> usize;
}

impl<F> MappingHypothesis for F
where
    F: Fn(PhysAddr) -> usize,
{
    fn bank_of(&self, addr: PhysAddr) -> usize {
        self(addr)
    }
}

/// Bank function made of XORed address bits.
///
/// Each mask yields one bank-id bit, the parity of the masked address. The
/// first mask is the most significant bit of the bank id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct XorBankFunction {
    masks: Vec<u64>,
}

impl XorBankFunction {
    /// Creates a function from raw bit masks.
    pub fn new(masks: Vec<u64>) -> Self {
        XorBankFunction { masks }
    }

    /// Creates a function with one bank-id bit per bit definition.
    pub fn from_bitdefs(defs: &[BitDef]) -> Self {
        Self::new(defs.iter().map(BitDef::to_bitstr).collect())
    }

    /// Creates a function with one bank-id bit per solution.
    pub fn from_solutions<'a>(solutions: impl IntoIterator<Item = &'a Solution>) -> Self {
        Self::new(solutions.into_iter().map(Solution::mask).collect())
    }

    /// The bit masks, most significant bank-id bit first.
    pub fn masks(&self) -> &[u64] {
        &self.masks
    }

    /// Number of distinct bank ids this function can produce.
    pub fn bank_count(&self) -> usize {
        1 << self.masks.len()
    }
}

impl From<&SolutionSet> for XorBankFunction {
    fn from(set: &SolutionSet) -> Self {
        Self::from_solutions(set.valid())
    }
}

impl MappingHypothesis for XorBankFunction {
    fn bank_of(&self, addr: PhysAddr) -> usize {
        let p = addr.as_u64();
        self.masks
            .iter()
            .fold(0, |res, mask| (res << 1) | ((p & mask).count_ones() as usize & 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_default_hypothesis() {
        let f = XorBankFunction::from_bitdefs(&Config::default().bank_bits);
        assert_eq!(f.bank_count(), 32);
        assert_eq!(f.bank_of(PhysAddr::new(0)), 0);
        // bit 14 is the most significant bank-id bit
        assert_eq!(f.bank_of(PhysAddr::new(1 << 14)), 0b10000);
        // bit 15 feeds the second and the last bank-id bit
        assert_eq!(f.bank_of(PhysAddr::new(1 << 15)), 0b01001);
        // 15 ^ 18 cancels
        assert_eq!(f.bank_of(PhysAddr::new((1 << 15) | (1 << 18))), 0b00001);
    }

    #[test]
    fn test_from_solutions() {
        let f = XorBankFunction::from_solutions(&[Solution::xor(&[3]), Solution::xor(&[1, 2])]);
        assert_eq!(f.masks(), &[0b1000, 0b0110]);
        assert_eq!(f.bank_of(PhysAddr::new(0b1010)), 0b11);
        assert_eq!(f.bank_of(PhysAddr::new(0b0110)), 0b00);
    }

    #[test]
    fn test_closure_hypothesis() {
        let h = |a: PhysAddr| (a.as_u64() >> 13) as usize & 7;
        assert_eq!(h.bank_of(PhysAddr::new(5 << 13)), 5);
    }
}
