//! Traits through which collaborators reach the linear system.

use crate::sparse::{ElementId, MatrixLocation, VectorElementId};

/// Hands out stable handles to matrix and right-hand side locations.
///
/// Locations are external (caller-visible) indices. Index 0 is the
/// reference node and yields a handle whose writes are discarded.
pub trait ElementProvider {
    /// Find or create the matrix element at `location`.
    fn matrix_element(&mut self, location: MatrixLocation) -> ElementId;

    /// Find or create the right-hand side element of `row`.
    fn rhs_element(&mut self, row: usize) -> VectorElementId;
}

/// Accumulates contributions into previously obtained handles.
pub trait Stamps<T> {
    /// Add `value` to a matrix element.
    fn add_matrix(&mut self, id: ElementId, value: T);

    /// Add `value` to a right-hand side element.
    fn add_rhs(&mut self, id: VectorElementId, value: T);
}
