use crate::config::BitWindow;

/// Lexicographic enumeration of the `k`-subsets of a bit window.
///
/// The first call to [`Combinations::advance`] yields `[lo, lo+1, .., lo+k-1]`,
/// every following call the lexicographic successor, until all
/// `C(hi-lo+1, k)` subsets have been produced. The cursor cannot be rewound;
/// create a new enumerator to start over.
#[derive(Debug, Clone)]
pub struct Combinations {
    cursor: Vec<usize>,
    lo: usize,
    hi: usize,
    started: bool,
    exhausted: bool,
}

impl Combinations {
    /// Creates an enumerator over the `k`-subsets of `window`.
    ///
    /// If `k` exceeds the window size the enumerator is empty.
    ///
    /// # Panics
    ///
    /// Panics if `k` is zero.
    pub fn new(window: BitWindow, k: usize) -> Self {
        assert!(k >= 1, "combination size must be positive");
        Combinations {
            cursor: vec![0; k],
            lo: window.lo,
            hi: window.hi,
            started: false,
            exhausted: k > window.max_depth(),
        }
    }

    /// Moves to the next combination and returns it.
    ///
    /// Returns `None` once every combination has been produced.
    pub fn advance(&mut self) -> Option<&[usize]> {
        if self.exhausted {
            return None;
        }
        if !self.started {
            self.started = true;
            for (i, slot) in self.cursor.iter_mut().enumerate() {
                *slot = self.lo + i;
            }
            return Some(&self.cursor);
        }

        let k = self.cursor.len();
        if self.cursor[k - 1] < self.hi {
            self.cursor[k - 1] += 1;
            return Some(&self.cursor);
        }

        // Rightmost position that still leaves room for the positions after it.
        let pivot = (0..k).rev().find(|&i| self.cursor[i] < self.hi - (k - 1 - i));
        match pivot {
            Some(i) => {
                self.cursor[i] += 1;
                for j in i + 1..k {
                    self.cursor[j] = self.cursor[j - 1] + 1;
                }
                Some(&self.cursor)
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}

impl Iterator for Combinations {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        self.advance().map(|c| c.to_vec())
    }
}
