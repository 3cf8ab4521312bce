//! Forward and backward substitution through the LU factors.

use crate::error::{NodalError, Result};
use crate::sparse::DenseVector;

use super::lu::SparseLuSolver;
use super::scalar::Scalar;

impl<T: Scalar> SparseLuSolver<T> {
    fn check_solvable(&mut self, operation: &'static str, solution: &DenseVector<T>) -> Result<()> {
        if !self.is_factored() {
            return Err(NodalError::NotFactored { operation });
        }
        let size = self.size();
        if solution.len() != size {
            return Err(NodalError::length_mismatch(size, solution.len()));
        }
        self.intermediate.clear();
        self.intermediate.resize(size + 1, T::zero());
        Ok(())
    }

    /// Solve `A·x = b` with the current factors.
    ///
    /// `solution` is indexed by external column. On entry its degenerate
    /// tail holds the known values of those unknowns, on return it holds `x`.
    pub fn solve(&mut self, solution: &mut DenseVector<T>) -> Result<()> {
        self.check_solvable("solve", solution)?;
        let size = self.size();
        let order = self.order();

        // Scramble
        for (index, &value) in self.vector.iter() {
            if index > order {
                break;
            }
            self.intermediate[index] = value;
        }
        for index in order + 1..=size {
            self.intermediate[index] = solution[self.column.reverse(index)];
        }

        // Forward substitution, the diagonal holds inverted pivots
        for step in 1..=order {
            let mut temp = self.intermediate[step];
            if temp.is_zero() {
                continue;
            }
            let Some(pivot) = self.matrix.find_diagonal_element(step) else {
                continue;
            };
            temp *= self.matrix[pivot];
            self.intermediate[step] = temp;
            let mut current = self.matrix.below(pivot);
            while let Some(id) = current {
                let row = self.matrix.row(id);
                if row > order {
                    break;
                }
                self.intermediate[row] -= temp * self.matrix[id];
                current = self.matrix.below(id);
            }
        }

        // Backward substitution
        for step in (1..=order).rev() {
            let mut temp = self.intermediate[step];
            if let Some(pivot) = self.matrix.find_diagonal_element(step) {
                let mut current = self.matrix.right(pivot);
                while let Some(id) = current {
                    temp -= self.matrix[id] * self.intermediate[self.matrix.column(id)];
                    current = self.matrix.right(id);
                }
            }
            self.intermediate[step] = temp;
        }

        self.column.unscramble(&self.intermediate, solution);
        Ok(())
    }

    /// Solve `Aᵀ·x = b` with the current factors.
    ///
    /// The right-hand side entry of external row `i` is read as entry `i`
    /// of `b`, and `solution` is indexed by external row.
    pub fn solve_transposed(&mut self, solution: &mut DenseVector<T>) -> Result<()> {
        self.check_solvable("solve transposed", solution)?;
        let size = self.size();
        let order = self.order();

        // Scramble
        for (index, &value) in self.vector.iter() {
            if index > order {
                break;
            }
            let target = self.column.find_forward(self.row.reverse(index));
            self.intermediate[target] = value;
        }
        for index in order + 1..=size {
            self.intermediate[index] = solution[self.row.reverse(index)];
        }

        // Forward elimination through the transposed upper factor
        for step in 1..=order {
            let temp = self.intermediate[step];
            if temp.is_zero() {
                continue;
            }
            let Some(pivot) = self.matrix.find_diagonal_element(step) else {
                continue;
            };
            let mut current = self.matrix.right(pivot);
            while let Some(id) = current {
                let column = self.matrix.column(id);
                if column > order {
                    break;
                }
                self.intermediate[column] -= temp * self.matrix[id];
                current = self.matrix.right(id);
            }
        }

        // Backward substitution through the transposed lower factor
        for step in (1..=order).rev() {
            let mut temp = self.intermediate[step];
            if let Some(pivot) = self.matrix.find_diagonal_element(step) {
                let mut current = self.matrix.below(pivot);
                while let Some(id) = current {
                    let row = self.matrix.row(id);
                    if row > order {
                        break;
                    }
                    temp -= self.intermediate[row] * self.matrix[id];
                    current = self.matrix.below(id);
                }
                temp *= self.matrix[pivot];
            }
            self.intermediate[step] = temp;
        }

        self.row.unscramble(&self.intermediate, solution);
        Ok(())
    }
}
