//! Markowitz pivot selection.
//!
//! At every elimination step the strategy looks for a pivot that keeps the
//! number of fill-ins low without giving up numerical stability. The cost
//! of a candidate is its Markowitz product
//!
//! ```text
//! (nonzeros in its row - 1) * (nonzeros in its column - 1)
//! ```
//!
//! counted over the part of the matrix that still has to be factored. A
//! candidate is only admissible if its magnitude is at least
//! `relative_threshold` times the largest magnitude in its column.
//!
//! Diagonal candidates are searched first. Only when no diagonal element is
//! admissible is the whole active submatrix searched.

use crate::error::{NodalError, Result};
use crate::sparse::{ElementId, SparseMatrix};

use super::scalar::Scalar;

/// Default relative pivot threshold.
pub const DEFAULT_RELATIVE_THRESHOLD: f64 = 1e-3;

/// Default absolute pivot threshold.
pub const DEFAULT_ABSOLUTE_THRESHOLD: f64 = 0.0;

/// Upper bound on the number of tied candidates examined per step.
pub const MAX_MARKOWITZ_TIES: usize = 100;

/// Tied candidates examined per unit of the minimal Markowitz product.
pub const TIES_MULTIPLIER: usize = 5;

/// Thresholds used to decide whether a pivot is admissible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotConfig {
    /// A pivot must be at least this fraction of the largest value in its column.
    pub relative_threshold: f64,
    /// A pivot must be strictly larger than this magnitude.
    pub absolute_threshold: f64,
}

impl Default for PivotConfig {
    fn default() -> Self {
        Self {
            relative_threshold: DEFAULT_RELATIVE_THRESHOLD,
            absolute_threshold: DEFAULT_ABSOLUTE_THRESHOLD,
        }
    }
}

impl PivotConfig {
    /// Create a configuration with default thresholds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the relative threshold, must lie in `(0, 1]`.
    pub fn with_relative_threshold(mut self, threshold: f64) -> Self {
        self.relative_threshold = threshold;
        self
    }

    /// Set the absolute threshold, must not be negative.
    pub fn with_absolute_threshold(mut self, threshold: f64) -> Self {
        self.absolute_threshold = threshold;
        self
    }

    /// Check that the thresholds are usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.relative_threshold > 0.0 && self.relative_threshold <= 1.0) {
            return Err(NodalError::invalid_parameter(
                "relative_threshold",
                format!("must be in (0, 1], got {}", self.relative_threshold),
            ));
        }
        if !(self.absolute_threshold >= 0.0) {
            return Err(NodalError::invalid_parameter(
                "absolute_threshold",
                format!("must not be negative, got {}", self.absolute_threshold),
            ));
        }
        Ok(())
    }
}

/// Outcome of a pivot search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pivot {
    /// An admissible pivot.
    Good(ElementId),
    /// The best that could be found, but it fails the stability test.
    Bad(ElementId),
    /// Nothing nonzero is left in the active submatrix.
    None,
}

impl Pivot {
    /// The chosen element, if any.
    pub fn element(&self) -> Option<ElementId> {
        match *self {
            Pivot::Good(id) | Pivot::Bad(id) => Some(id),
            Pivot::None => None,
        }
    }
}

/// Markowitz pivoting strategy.
#[derive(Debug, Clone, Default)]
pub struct Markowitz {
    config: PivotConfig,
    row_counts: Vec<usize>,
    column_counts: Vec<usize>,
    active: bool,
}

/// Running best candidate of a search.
struct Search {
    chosen: Option<ElementId>,
    min_product: usize,
    magnitude: f64,
    ties: usize,
}

impl Search {
    fn new() -> Self {
        Self {
            chosen: None,
            min_product: usize::MAX,
            magnitude: 0.0,
            ties: 0,
        }
    }

    /// Offer an admissible candidate. Returns `true` once the search may stop.
    fn offer(&mut self, id: ElementId, product: usize, magnitude: f64) -> bool {
        if product < self.min_product {
            self.chosen = Some(id);
            self.min_product = product;
            self.magnitude = magnitude;
            self.ties = 0;
            // A singleton creates no fill-in at all
            return product == 0;
        }
        self.ties += 1;
        if magnitude > self.magnitude {
            self.chosen = Some(id);
            self.magnitude = magnitude;
        }
        self.ties >= MAX_MARKOWITZ_TIES.min(self.min_product.saturating_mul(TIES_MULTIPLIER))
    }
}

impl Markowitz {
    /// Create a strategy with the given thresholds.
    pub fn new(config: PivotConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The thresholds in use.
    pub fn config(&self) -> &PivotConfig {
        &self.config
    }

    /// Replace the thresholds.
    pub fn set_config(&mut self, config: PivotConfig) {
        self.config = config;
    }

    /// Count the nonzeros of the active submatrix `step..=max`.
    pub fn setup<T: Scalar>(&mut self, matrix: &SparseMatrix<T>, step: usize, max: usize) {
        let size = matrix.size();
        self.row_counts.clear();
        self.row_counts.resize(size + 1, 0);
        self.column_counts.clear();
        self.column_counts.resize(size + 1, 0);

        for index in step..=max.min(size) {
            self.row_counts[index] = matrix
                .row_elements(index)
                .filter(|&id| (step..=max).contains(&matrix.column(id)))
                .count();
            self.column_counts[index] = matrix
                .column_elements(index)
                .filter(|&id| (step..=max).contains(&matrix.row(id)))
                .count();
        }
        self.active = true;
    }

    /// Stop tracking counts until the next [`setup`](Self::setup).
    pub fn finish(&mut self) {
        self.active = false;
    }

    /// Forget all counts.
    pub fn clear(&mut self) {
        self.row_counts.clear();
        self.column_counts.clear();
        self.active = false;
    }

    /// Markowitz product of a location in the active submatrix.
    pub fn product(&self, row: usize, column: usize) -> usize {
        let r = self.row_counts.get(row).copied().unwrap_or(0).saturating_sub(1);
        let c = self.column_counts.get(column).copied().unwrap_or(0).saturating_sub(1);
        r.saturating_mul(c)
    }

    fn is_admissible(&self, magnitude: f64, largest: f64) -> bool {
        magnitude > self.config.absolute_threshold
            && magnitude >= self.config.relative_threshold * largest
    }

    fn largest_in_column<T: Scalar>(
        &self,
        matrix: &SparseMatrix<T>,
        column: usize,
        step: usize,
        max: usize,
    ) -> f64 {
        matrix
            .column_elements(column)
            .filter(|&id| (step..=max).contains(&matrix.row(id)))
            .map(|id| matrix[id].magnitude())
            .fold(0.0, f64::max)
    }

    /// Check whether a diagonal element may be reused as pivot.
    ///
    /// The pivot has to beat the largest element below it (up to row `max`)
    /// by the relative threshold.
    pub fn is_valid_pivot<T: Scalar>(
        &self,
        matrix: &SparseMatrix<T>,
        pivot: Option<ElementId>,
        max: usize,
    ) -> bool {
        let Some(pivot) = pivot else {
            return false;
        };
        let magnitude = matrix[pivot].magnitude();
        if magnitude <= self.config.absolute_threshold {
            return false;
        }
        let mut largest = 0.0f64;
        let mut current = matrix.below(pivot);
        while let Some(id) = current {
            if matrix.row(id) > max {
                break;
            }
            largest = largest.max(matrix[id].magnitude());
            current = matrix.below(id);
        }
        largest * self.config.relative_threshold < magnitude
    }

    /// Find the pivot for elimination step `step`, searching rows and
    /// columns `step..=max`.
    pub fn find_pivot<T: Scalar>(&self, matrix: &SparseMatrix<T>, step: usize, max: usize) -> Pivot {
        if let Some(id) = self.search_diagonal(matrix, step, max) {
            return Pivot::Good(id);
        }
        if let Some(id) = self.search_submatrix(matrix, step, max) {
            return Pivot::Good(id);
        }
        match self.find_largest(matrix, step, max) {
            Some(id) => Pivot::Bad(id),
            None => Pivot::None,
        }
    }

    fn search_diagonal<T: Scalar>(&self, matrix: &SparseMatrix<T>, step: usize, max: usize) -> Option<ElementId> {
        let mut search = Search::new();
        for index in step..=max {
            let Some(id) = matrix.find_diagonal_element(index) else {
                continue;
            };
            let product = self.product(index, index);
            if product > search.min_product {
                continue;
            }
            let magnitude = matrix[id].magnitude();
            if !self.is_admissible(magnitude, self.largest_in_column(matrix, index, step, max)) {
                continue;
            }
            if search.offer(id, product, magnitude) {
                break;
            }
        }
        search.chosen
    }

    fn search_submatrix<T: Scalar>(&self, matrix: &SparseMatrix<T>, step: usize, max: usize) -> Option<ElementId> {
        let mut search = Search::new();
        for column in step..=max {
            let largest = self.largest_in_column(matrix, column, step, max);
            for id in matrix.column_elements(column) {
                let row = matrix.row(id);
                if row < step {
                    continue;
                }
                if row > max {
                    break;
                }
                let product = self.product(row, column);
                if product > search.min_product {
                    continue;
                }
                let magnitude = matrix[id].magnitude();
                if !self.is_admissible(magnitude, largest) {
                    continue;
                }
                if search.offer(id, product, magnitude) {
                    return search.chosen;
                }
            }
        }
        search.chosen
    }

    fn find_largest<T: Scalar>(&self, matrix: &SparseMatrix<T>, step: usize, max: usize) -> Option<ElementId> {
        let mut largest = None;
        let mut magnitude = 0.0;
        for column in step..=max {
            for id in matrix.column_elements(column) {
                if !(step..=max).contains(&matrix.row(id)) {
                    continue;
                }
                let m = matrix[id].magnitude();
                if m > magnitude {
                    largest = Some(id);
                    magnitude = m;
                }
            }
        }
        largest
    }

    /// Move the counts of the pivot's row and column to `step`.
    ///
    /// Must be called before the matrix rows and columns are swapped.
    pub fn move_pivot<T>(&mut self, matrix: &SparseMatrix<T>, pivot: ElementId, step: usize) {
        if !self.active {
            return;
        }
        let (row, column) = (matrix.row(pivot), matrix.column(pivot));
        if row < self.row_counts.len() && step < self.row_counts.len() {
            self.row_counts.swap(row, step);
        }
        if column < self.column_counts.len() && step < self.column_counts.len() {
            self.column_counts.swap(column, step);
        }
    }

    /// Remove the pivot's row and column from the counts of the lines that
    /// the upcoming elimination will touch.
    pub fn update<T>(&mut self, matrix: &SparseMatrix<T>, pivot: ElementId, max: usize) {
        if !self.active {
            return;
        }
        let mut current = matrix.below(pivot);
        while let Some(id) = current {
            let row = matrix.row(id);
            if row > max {
                break;
            }
            self.row_counts[row] = self.row_counts[row].saturating_sub(1);
            current = matrix.below(id);
        }
        let mut current = matrix.right(pivot);
        while let Some(id) = current {
            let column = matrix.column(id);
            if column > max {
                break;
            }
            self.column_counts[column] = self.column_counts[column].saturating_sub(1);
            current = matrix.right(id);
        }
    }

    /// Account for a fill-in created inside the active submatrix.
    pub fn create_fillin<T>(&mut self, matrix: &SparseMatrix<T>, fillin: ElementId, max: usize) {
        if !self.active {
            return;
        }
        let (row, column) = (matrix.row(fillin), matrix.column(fillin));
        if row <= max && row < self.row_counts.len() {
            self.row_counts[row] += 1;
        }
        if column <= max && column < self.column_counts.len() {
            self.column_counts[column] += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sparse::MatrixLocation;

    fn build(entries: &[(usize, usize, f64)]) -> SparseMatrix<f64> {
        let mut matrix = SparseMatrix::new();
        for &(row, column, value) in entries {
            let id = matrix.get_element(MatrixLocation::new(row, column));
            matrix[id] = value;
        }
        matrix
    }

    #[test]
    fn test_counts_and_products() {
        let matrix = build(&[(1, 1, 1.0), (1, 2, 1.0), (2, 2, 1.0), (3, 1, 1.0), (3, 3, 1.0)]);
        let mut strategy = Markowitz::default();
        strategy.setup(&matrix, 1, 3);
        assert_eq!(strategy.product(1, 1), 1);
        assert_eq!(strategy.product(2, 2), 0);
        assert_eq!(strategy.product(3, 3), 0);

        // Restricting the window drops the third row and column
        strategy.setup(&matrix, 1, 2);
        assert_eq!(strategy.product(1, 1), 0);
    }

    #[test]
    fn test_prefers_diagonal_singleton() {
        let matrix = build(&[(1, 1, 1.0), (1, 2, 1.0), (2, 1, 1.0), (2, 2, 1.0), (3, 3, 0.5)]);
        let mut strategy = Markowitz::default();
        strategy.setup(&matrix, 1, 3);
        let pivot = strategy.find_pivot(&matrix, 1, 3);
        assert_eq!(pivot, Pivot::Good(matrix.find_diagonal_element(3).unwrap()));
    }

    #[test]
    fn test_tie_break_prefers_larger_magnitude() {
        // No diagonal, every candidate has product 1
        let matrix = build(&[
            (1, 2, 4.0),
            (1, 3, 1.0),
            (2, 1, 2.0),
            (2, 3, 1.0),
            (3, 1, 1.0),
            (3, 2, 1.0),
        ]);
        let mut strategy = Markowitz::default();
        strategy.setup(&matrix, 1, 3);
        let pivot = strategy.find_pivot(&matrix, 1, 3);
        let id = pivot.element().unwrap();
        assert!(matches!(pivot, Pivot::Good(_)));
        assert_eq!(matrix.location(id), MatrixLocation::new(1, 2));
    }

    #[test]
    fn test_threshold_rejects_small_diagonal() {
        let matrix = build(&[(1, 1, 1e-6), (2, 1, 1.0), (1, 2, 1.0), (2, 2, 1e-6)]);
        let mut strategy = Markowitz::default();
        strategy.setup(&matrix, 1, 2);
        let pivot = strategy.find_pivot(&matrix, 1, 2);
        let location = matrix.location(pivot.element().unwrap());
        assert!(!location.is_diagonal());
    }

    #[test]
    fn test_bad_and_none() {
        let mut strategy = Markowitz::new(PivotConfig::new().with_absolute_threshold(1.0));
        let matrix = build(&[(1, 1, 0.5)]);
        strategy.setup(&matrix, 1, 1);
        assert!(matches!(strategy.find_pivot(&matrix, 1, 1), Pivot::Bad(_)));

        let matrix = build(&[(1, 1, 0.0)]);
        strategy.setup(&matrix, 1, 1);
        assert_eq!(strategy.find_pivot(&matrix, 1, 1), Pivot::None);
    }

    #[test]
    fn test_is_valid_pivot() {
        let matrix = build(&[(1, 1, 1e-2), (2, 1, 1.0), (3, 1, 1e3)]);
        let strategy = Markowitz::default();
        let pivot = matrix.find_diagonal_element(1);
        // Row 3 is outside the window when max = 2
        assert!(strategy.is_valid_pivot(&matrix, pivot, 2));
        assert!(!strategy.is_valid_pivot(&matrix, pivot, 3));
        assert!(!strategy.is_valid_pivot(&matrix, None, 3));
    }

    #[test]
    fn test_update_and_fillin() {
        let mut matrix = build(&[(1, 1, 2.0), (1, 2, 1.0), (2, 1, 1.0), (3, 1, 1.0), (2, 2, 1.0), (3, 3, 1.0)]);
        let mut strategy = Markowitz::default();
        strategy.setup(&matrix, 1, 3);
        assert_eq!(strategy.row_counts[2], 2);
        let pivot = matrix.find_diagonal_element(1).unwrap();
        strategy.update(&matrix, pivot, 3);
        assert_eq!(strategy.row_counts[2], 1);
        assert_eq!(strategy.row_counts[3], 1);
        assert_eq!(strategy.column_counts[2], 1);

        let fillin = matrix.get_element(MatrixLocation::new(3, 2));
        strategy.create_fillin(&matrix, fillin, 3);
        assert_eq!(strategy.row_counts[3], 2);
        assert_eq!(strategy.column_counts[2], 2);
    }

    #[test]
    fn test_config_validation() {
        assert!(PivotConfig::default().validate().is_ok());
        assert!(PivotConfig::new().with_relative_threshold(0.0).validate().is_err());
        assert!(PivotConfig::new().with_absolute_threshold(-1.0).validate().is_err());
    }
}
