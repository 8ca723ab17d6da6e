//! Utility types and constants shared across bankmap.
//!
//! - Constants for page geometry and sample files ([`PAGE_SIZE`], [`BANK_MARKER`], ...)
//! - [`NamedProgress`] for labelled progress bars
//! - [`binomial`] for sizing combination searches

mod constants;
mod named_progress;

pub use self::constants::*;
pub use self::named_progress::NamedProgress;

/// Number of `k`-subsets of an `n`-element set.
///
/// Saturates at `u64::MAX` instead of overflowing.
///
/// # Examples
///
/// ```
/// use bankmap_core::util::binomial;
///
/// assert_eq!(binomial(4, 2), 6);
/// assert_eq!(binomial(14, 0), 1);
/// assert_eq!(binomial(3, 5), 0);
/// ```
pub fn binomial(n: usize, k: usize) -> u64 {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: u64 = 1;
    for i in 0..k {
        // acc * (n - i) / (i + 1) stays integral at every step
        acc = match acc.checked_mul((n - i) as u64) {
            Some(v) => v / (i as u64 + 1),
            None => return u64::MAX,
        };
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::binomial;

    #[test]
    fn test_binomial_small() {
        assert_eq!(binomial(0, 0), 1);
        assert_eq!(binomial(5, 1), 5);
        assert_eq!(binomial(5, 5), 1);
        assert_eq!(binomial(14, 7), 3432);
    }

    #[test]
    fn test_binomial_window_sum() {
        // every non-empty subset of the default 14-bit window
        let total: u64 = (1..=14).map(|k| binomial(14, k)).sum();
        assert_eq!(total, (1 << 14) - 1);
    }
}
