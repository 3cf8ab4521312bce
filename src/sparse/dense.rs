//! Dense vector with 1-based indexing.

use std::ops::{Index, IndexMut};

/// A dense vector of `len` values addressed `1..=len`.
///
/// Index 0 exists and holds the reference (ground) value.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseVector<T> {
    values: Vec<T>,
}

impl<T: Copy + Default> DenseVector<T> {
    /// Create a zeroed vector of the given length.
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![T::default(); len + 1],
        }
    }

    /// Create a vector from the values at indices `1..=values.len()`.
    pub fn from_values(values: &[T]) -> Self {
        let mut result = Self::new(values.len());
        result.values[1..].copy_from_slice(values);
        result
    }

    /// Number of addressable values, not counting index 0.
    pub fn len(&self) -> usize {
        self.values.len() - 1
    }

    /// Check if the vector has no addressable values.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set every value to zero.
    pub fn reset(&mut self) {
        self.values.fill(T::default());
    }

    /// Copy all values from another vector of the same length.
    pub fn copy_from(&mut self, other: &DenseVector<T>) {
        self.values.copy_from_slice(&other.values);
    }

    /// The values at indices `1..=len`.
    pub fn as_slice(&self) -> &[T] {
        &self.values[1..]
    }

    /// Iterate over the values at indices `1..=len`.
    pub fn iter(&self) -> impl Iterator<Item = &T> + '_ {
        self.values[1..].iter()
    }
}

impl<T> Index<usize> for DenseVector<T> {
    type Output = T;

    fn index(&self, index: usize) -> &T {
        &self.values[index]
    }
}

impl<T> IndexMut<usize> for DenseVector<T> {
    fn index_mut(&mut self, index: usize) -> &mut T {
        &mut self.values[index]
    }
}
