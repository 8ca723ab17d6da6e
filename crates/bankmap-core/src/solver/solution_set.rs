use log::debug;
use thiserror::Error;

use super::Solution;

/// Error raised when a [`SolutionSet`] is full.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("solution set capacity of {capacity} exhausted")]
pub struct CapacityExceeded {
    /// The configured capacity
    pub capacity: usize,
}

/// Bounded arena of solutions.
///
/// Solutions keep their slot for the lifetime of the set. Invalidation flips a
/// flag instead of removing the slot, and an invalidated solution never becomes
/// valid again.
#[derive(Clone, Debug)]
pub struct SolutionSet {
    solutions: Vec<Solution>,
    capacity: usize,
}

impl SolutionSet {
    /// Creates an empty set holding at most `capacity` solutions.
    pub fn with_capacity(capacity: usize) -> Self {
        SolutionSet {
            solutions: Vec::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Appends a solution.
    ///
    /// # Errors
    ///
    /// Returns [`CapacityExceeded`] if the set is full.
    pub fn push(&mut self, solution: Solution) -> Result<(), CapacityExceeded> {
        if self.solutions.len() >= self.capacity {
            return Err(CapacityExceeded {
                capacity: self.capacity,
            });
        }
        self.solutions.push(solution);
        Ok(())
    }

    /// All slots, valid or not, in insertion order.
    pub fn slots(&self) -> &[Solution] {
        &self.solutions
    }

    /// Valid solutions in slot order.
    pub fn valid(&self) -> impl Iterator<Item = &Solution> {
        self.solutions.iter().filter(|s| s.is_valid())
    }

    /// Number of valid solutions.
    pub fn valid_count(&self) -> usize {
        self.valid().count()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.solutions.len()
    }

    /// Returns true if no slot is occupied.
    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }

    /// Returns true if a valid solution equal to `solution` is present.
    pub fn contains_valid(&self, solution: &Solution) -> bool {
        self.valid().any(|s| s == solution)
    }

    /// Keeps only the solutions that are also valid in `other`.
    ///
    /// Returns false if no valid solution survives.
    pub fn intersect(&mut self, other: &SolutionSet) -> bool {
        for s in self.solutions.iter_mut().filter(|s| s.is_valid()) {
            if !other.contains_valid(s) {
                s.set_valid(false);
            }
        }
        self.valid_count() > 0
    }

    /// Invalidates every solution whose bits are a superset of an earlier valid solution.
    ///
    /// Relies on slots being ordered by non-decreasing depth, which the solver
    /// guarantees by enumerating depth by depth.
    pub fn find_unique(&mut self) {
        let n = self.solutions.len();
        for i in 0..n {
            if !self.solutions[i].is_valid() {
                continue;
            }
            for j in i + 1..n {
                if self.solutions[j].is_valid()
                    && self.solutions[i].is_subset_of(&self.solutions[j])
                {
                    debug!(
                        "{} is redundant with {}",
                        self.solutions[j], self.solutions[i]
                    );
                    self.solutions[j].set_valid(false);
                }
            }
        }
    }
}

/// Running intersection of the solution sets of all processed samples.
///
/// Starts uninitialised and adopts the first set it is given verbatim.
#[derive(Clone, Debug, Default)]
pub struct Intersection {
    global: Option<SolutionSet>,
}

impl Intersection {
    /// Creates an uninitialised intersection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Intersects the running set with `set`.
    ///
    /// Returns false if no common solution survives.
    pub fn absorb(&mut self, set: SolutionSet) -> bool {
        if let Some(global) = self.global.as_mut() {
            return global.intersect(&set);
        }
        let any = set.valid_count() > 0;
        self.global = Some(set);
        any
    }

    /// The running set, if at least one sample was absorbed.
    pub fn get(&self) -> Option<&SolutionSet> {
        self.global.as_ref()
    }

    /// Consumes the intersection and returns the running set.
    pub fn into_inner(self) -> Option<SolutionSet> {
        self.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn set_of(solutions: &[&[usize]]) -> SolutionSet {
        let mut set = SolutionSet::with_capacity(64);
        for idx in solutions {
            let mut s = Solution::xor(idx);
            s.set_valid(true);
            set.push(s).expect("capacity");
        }
        set
    }

    fn valid_indexes(set: &SolutionSet) -> Vec<Vec<usize>> {
        set.valid().map(|s| s.indexes().to_vec()).sorted().collect()
    }

    #[test]
    fn test_capacity() {
        let mut set = SolutionSet::with_capacity(1);
        assert!(set.push(Solution::xor(&[1])).is_ok());
        assert_eq!(
            set.push(Solution::xor(&[2])),
            Err(CapacityExceeded { capacity: 1 })
        );
    }

    #[test]
    fn test_intersect_keeps_common() {
        let mut a = set_of(&[&[1], &[2], &[1, 3]]);
        let b = set_of(&[&[2], &[1, 3], &[4]]);
        assert!(a.intersect(&b));
        assert_eq!(valid_indexes(&a), vec![vec![1, 3], vec![2]]);
        // slots are kept
        assert_eq!(a.len(), 3);
    }

    #[test]
    fn test_intersect_ignores_invalid_in_other() {
        let mut a = set_of(&[&[1], &[2]]);
        let mut b = set_of(&[&[1], &[2]]);
        b.solutions[0].set_valid(false);
        assert!(a.intersect(&b));
        assert_eq!(valid_indexes(&a), vec![vec![2]]);
    }

    #[test]
    fn test_intersect_empty() {
        let mut a = set_of(&[&[1]]);
        assert!(!a.intersect(&set_of(&[&[2]])));
        assert_eq!(a.valid_count(), 0);
        // no resurrection
        assert!(!a.intersect(&set_of(&[&[1]])));
    }

    #[test]
    fn test_intersect_idempotent() {
        let a = set_of(&[&[1], &[2, 5], &[3, 4, 6]]);
        let mut b = a.clone();
        assert!(b.intersect(&a));
        assert_eq!(valid_indexes(&a), valid_indexes(&b));
    }

    #[test]
    fn test_intersection_order_independent() {
        let a = set_of(&[&[1], &[2], &[3], &[1, 2]]);
        let b = set_of(&[&[2], &[3], &[1, 2], &[4]]);
        let c = set_of(&[&[1, 2], &[3], &[5]]);
        let orders = [[&a, &b, &c], [&c, &a, &b], [&b, &c, &a]];
        let results = orders
            .iter()
            .map(|order| {
                let mut acc = Intersection::new();
                for set in order {
                    acc.absorb((*set).clone());
                }
                valid_indexes(acc.get().expect("initialised"))
            })
            .collect_vec();
        assert_eq!(results[0], vec![vec![1, 2], vec![3]]);
        assert!(results.iter().all_equal());
    }

    #[test]
    fn test_first_absorb_adopts() {
        let mut acc = Intersection::new();
        assert!(acc.get().is_none());
        assert!(acc.absorb(set_of(&[&[7]])));
        assert_eq!(valid_indexes(acc.get().expect("initialised")), vec![vec![7]]);
    }

    #[test]
    fn test_find_unique_removes_supersets() {
        let mut set = set_of(&[&[1], &[2], &[1, 3], &[2, 3], &[3, 4], &[3, 4, 5]]);
        set.find_unique();
        assert_eq!(valid_indexes(&set), vec![vec![1], vec![2], vec![3, 4]]);
    }

    #[test]
    fn test_find_unique_idempotent() {
        let mut once = set_of(&[&[1], &[1, 2], &[2, 3], &[1, 2, 3], &[4, 5]]);
        once.find_unique();
        let mut twice = once.clone();
        twice.find_unique();
        assert_eq!(valid_indexes(&once), valid_indexes(&twice));
    }

    #[test]
    fn test_find_unique_skips_invalid() {
        let mut set = set_of(&[&[1], &[1, 2]]);
        set.solutions[0].set_valid(false);
        set.find_unique();
        assert_eq!(valid_indexes(&set), vec![vec![1, 2]]);
    }
}
