//! External/internal index translation.

use crate::error::{NodalError, Result};
use crate::sparse::DenseVector;

/// A bijection between external (caller-visible) indices and internal
/// (factorization-order) indices.
///
/// Index 0 always maps to itself. Indices that were never swapped map to
/// themselves, the tables grow lazily as larger indices are requested.
#[derive(Debug, Clone)]
pub struct Translation {
    ext_to_int: Vec<usize>,
    int_to_ext: Vec<usize>,
}

impl Default for Translation {
    fn default() -> Self {
        Self::new()
    }
}

impl Translation {
    /// Create an identity translation.
    pub fn new() -> Self {
        Self {
            ext_to_int: vec![0],
            int_to_ext: vec![0],
        }
    }

    /// Number of indices covered so far.
    pub fn len(&self) -> usize {
        self.ext_to_int.len() - 1
    }

    /// Check if only the reference index is covered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expand(&mut self, size: usize) {
        let current = self.len();
        if size <= current {
            return;
        }
        self.ext_to_int.extend(current + 1..=size);
        self.int_to_ext.extend(current + 1..=size);
    }

    /// Internal index of an external index, extending the table if needed.
    pub fn forward(&mut self, external: usize) -> usize {
        self.expand(external);
        self.ext_to_int[external]
    }

    /// Internal index of an external index, without extending the table.
    pub fn find_forward(&self, external: usize) -> usize {
        self.ext_to_int.get(external).copied().unwrap_or(external)
    }

    /// External index of an internal index.
    pub fn reverse(&self, internal: usize) -> usize {
        self.int_to_ext.get(internal).copied().unwrap_or(internal)
    }

    /// Exchange the external indices mapped to two internal indices.
    pub fn swap(&mut self, a: usize, b: usize) -> Result<()> {
        if a == 0 || b == 0 {
            return Err(NodalError::invalid_index(0, self.len()));
        }
        self.swap_unchecked(a, b);
        Ok(())
    }

    /// Exchange two internal indices that are known to be nonzero.
    pub(crate) fn swap_unchecked(&mut self, a: usize, b: usize) {
        debug_assert!(a > 0 && b > 0);
        self.expand(a.max(b));
        self.int_to_ext.swap(a, b);
        let (ext_a, ext_b) = (self.int_to_ext[a], self.int_to_ext[b]);
        self.ext_to_int[ext_a] = a;
        self.ext_to_int[ext_b] = b;
    }

    /// Copy `source[internal]` into `target[external]` for every index of
    /// the target.
    pub fn unscramble<T: Copy + Default>(&self, source: &[T], target: &mut DenseVector<T>) {
        for internal in 1..=target.len() {
            target[self.reverse(internal)] = source[internal];
        }
    }

    /// Restore the identity mapping.
    pub fn clear(&mut self) {
        self.ext_to_int.truncate(1);
        self.int_to_ext.truncate(1);
    }

    /// Check that both tables are mutual inverses on `1..=len`.
    pub fn is_bijection(&self) -> bool {
        let n = self.len();
        let mut seen = vec![false; n + 1];
        for external in 1..=n {
            let internal = self.ext_to_int[external];
            if internal == 0 || internal > n || seen[internal] || self.int_to_ext[internal] != external {
                return false;
            }
            seen[internal] = true;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_identity_by_default() {
        let mut t = Translation::new();
        assert_eq!(t.forward(5), 5);
        assert_eq!(t.reverse(3), 3);
        assert_eq!(t.len(), 5);
        assert_eq!(t.forward(0), 0);
    }

    #[test]
    fn test_swap_updates_both_directions() {
        let mut t = Translation::new();
        t.swap(1, 3).unwrap();
        assert_eq!(t.forward(1), 3);
        assert_eq!(t.forward(3), 1);
        assert_eq!(t.reverse(1), 3);
        t.swap(3, 2).unwrap();
        assert_eq!(t.forward(1), 2);
        assert_eq!(t.reverse(2), 1);
        assert!(t.is_bijection());
    }

    #[test]
    fn test_swap_reference_fails() {
        let mut t = Translation::new();
        assert!(matches!(t.swap(0, 2), Err(NodalError::InvalidIndex { .. })));
    }

    #[test]
    fn test_random_swaps_stay_bijective() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut t = Translation::new();
        for _ in 0..500 {
            let a = rng.gen_range(1..=40);
            let b = rng.gen_range(1..=40);
            t.swap(a, b).unwrap();
            assert!(t.is_bijection());
        }
    }

    #[test]
    fn test_unscramble() {
        let mut t = Translation::new();
        t.swap(1, 2).unwrap();
        let source = [0.0, 10.0, 20.0, 30.0];
        let mut target = DenseVector::new(3);
        t.unscramble(&source, &mut target);
        assert_eq!(target.as_slice(), &[20.0, 10.0, 30.0]);
    }
}
