use std::fmt::{self, Display, Formatter};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::config::BitDef;
use crate::sample::AddressSample;
use crate::memory::PhysAddr;

/// Operator combining two successive bits of a [`Solution`].
///
/// Only [`Op::Xor`] is produced by the solver. `Or` and `And` are part of the
/// operand vocabulary but never enumerated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    /// Bitwise or
    Or,
    /// Bitwise and
    And,
    /// Bitwise exclusive or
    Xor,
}

impl Op {
    fn apply(self, acc: u64, bit: u64) -> u64 {
        match self {
            Op::Or => acc | bit,
            Op::And => acc & bit,
            Op::Xor => acc ^ bit,
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        let s = match self {
            Op::Or => "OR",
            Op::And => "AND",
            Op::Xor => "XOR",
        };
        f.write_str(s)
    }
}

/// A candidate bank-selection bit: address bits combined left to right by operators.
///
/// Two solutions are equal if they select the same bits with the same
/// operators; validity is not part of equality.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Solution {
    indexes: Vec<usize>,
    ops: Vec<Op>,
    #[serde(skip)]
    valid: bool,
}

impl PartialEq for Solution {
    fn eq(&self, other: &Self) -> bool {
        self.indexes == other.indexes && self.ops == other.ops
    }
}

impl Eq for Solution {}

impl Solution {
    /// Creates an XOR chain over `indexes`, initially invalid.
    ///
    /// # Panics
    ///
    /// Panics if `indexes` is empty.
    pub fn xor(indexes: &[usize]) -> Self {
        assert!(!indexes.is_empty(), "solution depth must be positive");
        Solution {
            indexes: indexes.to_vec(),
            ops: vec![Op::Xor; indexes.len() - 1],
            valid: false,
        }
    }

    /// The selected address bits.
    pub fn indexes(&self) -> &[usize] {
        &self.indexes
    }

    /// The operators between successive bits.
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Number of selected bits.
    pub fn depth(&self) -> usize {
        self.indexes.len()
    }

    /// Returns true if the last evaluation found this solution consistent.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub(crate) fn set_valid(&mut self, valid: bool) {
        self.valid = valid;
    }

    /// Bitmask of the selected bits.
    pub fn mask(&self) -> u64 {
        self.indexes.iter().fold(0, |acc, i| acc | 1 << i)
    }

    /// Returns true if every bit of `self` also appears in `other`.
    pub fn is_subset_of(&self, other: &Solution) -> bool {
        self.indexes.iter().all(|i| other.indexes.contains(i))
    }

    /// Evaluates the function on a single address.
    ///
    /// # Panics
    ///
    /// Panics if the depth is zero or a bit index exceeds the address width.
    pub fn evaluate(&self, addr: u64) -> u64 {
        assert!(self.depth() >= 1, "solution depth must be positive");
        let addr = PhysAddr::new(addr);
        let bit = |i: usize| addr.bit(i);
        self.indexes[1..]
            .iter()
            .zip(&self.ops)
            .fold(bit(self.indexes[0]), |acc, (&i, op)| op.apply(acc, bit(i)) & 1)
    }

    /// Returns true if the function yields the same bit for every address of `sample`.
    ///
    /// The value of that bit is irrelevant. An empty sample is trivially constant.
    pub fn is_constant_over(&self, sample: &AddressSample) -> bool {
        let mut values = sample.addrs().iter().map(|a| self.evaluate(a.as_u64()));
        match values.next() {
            Some(first) => values.all(|v| v == first),
            None => true,
        }
    }

    /// Evaluates against `sample` and records the outcome as validity.
    pub fn check(&mut self, sample: &AddressSample) -> bool {
        self.valid = self.is_constant_over(sample);
        self.valid
    }
}

impl From<&BitDef> for Solution {
    fn from(def: &BitDef) -> Self {
        Solution::xor(&def.bits())
    }
}

impl Display for Solution {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.indexes.iter().join(", "),
            self.indexes.iter().map(|i| format!("b{}", i)).join(" ^ ")
        )
    }
}
