//! Doubly linked sparse matrix.

use std::fmt;
use std::ops::{Index, IndexMut};

/// Handle to an element of a [`SparseMatrix`].
///
/// A handle stays valid until the element is removed or the matrix is
/// cleared. Swapping rows or columns relinks elements but never moves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(usize);

/// A (row, column) position in a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MatrixLocation {
    pub row: usize,
    pub column: usize,
}

impl MatrixLocation {
    /// Create a new location.
    pub const fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }

    /// Check if the location lies on the diagonal.
    pub fn is_diagonal(&self) -> bool {
        self.row == self.column
    }

    /// Check if the location touches the reference (ground) line.
    pub fn is_reference(&self) -> bool {
        self.row == 0 || self.column == 0
    }
}

impl fmt::Display for MatrixLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.column)
    }
}

/// Direction of traversal.
///
/// `Row` walks along a row (ordered by column, linked left/right),
/// `Column` walks down a column (ordered by row, linked above/below).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Row,
    Column,
}

impl Axis {
    fn cross(self) -> Axis {
        match self {
            Axis::Row => Axis::Column,
            Axis::Column => Axis::Row,
        }
    }
}

#[derive(Debug, Clone)]
struct Element<T> {
    row: usize,
    column: usize,
    value: T,
    left: Option<ElementId>,
    right: Option<ElementId>,
    above: Option<ElementId>,
    below: Option<ElementId>,
}

impl<T: Default> Element<T> {
    fn new(row: usize, column: usize) -> Self {
        Self {
            row,
            column,
            value: T::default(),
            left: None,
            right: None,
            above: None,
            below: None,
        }
    }
}

impl<T> Element<T> {
    /// Index of the line this element sits on along `axis`.
    fn line(&self, axis: Axis) -> usize {
        match axis {
            Axis::Row => self.row,
            Axis::Column => self.column,
        }
    }

    /// Ordering key of this element within its line along `axis`.
    fn key(&self, axis: Axis) -> usize {
        match axis {
            Axis::Row => self.column,
            Axis::Column => self.row,
        }
    }

    fn set_line(&mut self, axis: Axis, line: usize) {
        match axis {
            Axis::Row => self.row = line,
            Axis::Column => self.column = line,
        }
    }

    fn next(&self, axis: Axis) -> Option<ElementId> {
        match axis {
            Axis::Row => self.right,
            Axis::Column => self.below,
        }
    }

    fn prev(&self, axis: Axis) -> Option<ElementId> {
        match axis {
            Axis::Row => self.left,
            Axis::Column => self.above,
        }
    }

    fn set_next(&mut self, axis: Axis, id: Option<ElementId>) {
        match axis {
            Axis::Row => self.right = id,
            Axis::Column => self.below = id,
        }
    }

    fn set_prev(&mut self, axis: Axis, id: Option<ElementId>) {
        match axis {
            Axis::Row => self.left = id,
            Axis::Column => self.above = id,
        }
    }
}

/// First and last element of every row (or every column).
#[derive(Debug, Clone, Default)]
struct Lines {
    first: Vec<Option<ElementId>>,
    last: Vec<Option<ElementId>>,
}

impl Lines {
    fn new() -> Self {
        Self {
            first: vec![None],
            last: vec![None],
        }
    }

    fn resize(&mut self, size: usize) {
        self.first.resize(size + 1, None);
        self.last.resize(size + 1, None);
    }

    fn swap(&mut self, a: usize, b: usize) {
        self.first.swap(a, b);
        self.last.swap(a, b);
    }
}

/// The element handed out for the reference line.
const TRASH_CAN: ElementId = ElementId(0);

/// A square sparse matrix with 1-based indices.
#[derive(Debug, Clone)]
pub struct SparseMatrix<T> {
    /// Element arena; slot 0 is the trash can
    elements: Vec<Element<T>>,
    /// Slots of removed elements, reused on the next allocation
    free: Vec<ElementId>,
    rows: Lines,
    columns: Lines,
    diagonal: Vec<Option<ElementId>>,
    size: usize,
    count: usize,
}

impl<T: Copy + Default> Default for SparseMatrix<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> SparseMatrix<T> {
    /// Create an empty matrix.
    pub fn new() -> Self {
        Self {
            elements: vec![Element::new(0, 0)],
            free: Vec::new(),
            rows: Lines::new(),
            columns: Lines::new(),
            diagonal: vec![None],
            size: 0,
            count: 0,
        }
    }

    /// Create an empty matrix with room for `size` rows and columns.
    pub fn with_size(size: usize) -> Self {
        let mut matrix = Self::new();
        matrix.expand(size);
        matrix
    }

    /// The largest row or column index allocated so far.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of elements linked into the matrix.
    pub fn element_count(&self) -> usize {
        self.count
    }

    fn lines(&self, axis: Axis) -> &Lines {
        match axis {
            Axis::Row => &self.rows,
            Axis::Column => &self.columns,
        }
    }

    fn lines_mut(&mut self, axis: Axis) -> &mut Lines {
        match axis {
            Axis::Row => &mut self.rows,
            Axis::Column => &mut self.columns,
        }
    }

    fn element(&self, id: ElementId) -> &Element<T> {
        &self.elements[id.0]
    }

    fn element_mut(&mut self, id: ElementId) -> &mut Element<T> {
        &mut self.elements[id.0]
    }

    fn coordinates(&self, id: ElementId) -> (usize, usize) {
        let element = self.element(id);
        (element.row, element.column)
    }

    /// Grow the matrix to at least `size` rows and columns.
    pub fn expand(&mut self, size: usize) {
        if size <= self.size {
            return;
        }
        self.rows.resize(size);
        self.columns.resize(size);
        self.diagonal.resize(size + 1, None);
        self.size = size;
    }

    /// Find the element at a location, creating it if it does not exist yet.
    ///
    /// Locations on the reference line return the trash can element.
    pub fn get_element(&mut self, location: MatrixLocation) -> ElementId {
        if location.is_reference() {
            return TRASH_CAN;
        }
        self.expand(location.row.max(location.column));

        if location.is_diagonal() {
            if let Some(id) = self.diagonal[location.row] {
                return id;
            }
        } else if let Some(id) = self.search(location) {
            return id;
        }

        let id = self.allocate(location);
        self.link(Axis::Row, id);
        self.link(Axis::Column, id);
        if location.is_diagonal() {
            self.diagonal[location.row] = Some(id);
        }
        self.count += 1;
        id
    }

    /// Find the element at a location without creating it.
    pub fn find_element(&self, location: MatrixLocation) -> Option<ElementId> {
        if location.is_reference() || location.row > self.size || location.column > self.size {
            return None;
        }
        if location.is_diagonal() {
            return self.diagonal[location.row];
        }
        self.search(location)
    }

    /// Remove the element at a location.
    ///
    /// Returns `false` if there was no element to remove.
    pub fn remove_element(&mut self, location: MatrixLocation) -> bool {
        let Some(id) = self.find_element(location) else {
            return false;
        };
        self.unlink(Axis::Row, id);
        self.unlink(Axis::Column, id);
        if location.is_diagonal() {
            self.diagonal[location.row] = None;
        }
        self.element_mut(id).value = T::default();
        self.free.push(id);
        self.count -= 1;
        true
    }

    /// The diagonal element of a row/column, if it exists.
    pub fn find_diagonal_element(&self, index: usize) -> Option<ElementId> {
        if index == 0 || index > self.size {
            return None;
        }
        self.diagonal[index]
    }

    fn search(&self, location: MatrixLocation) -> Option<ElementId> {
        // Short rows are the common case, a linear walk is cheapest
        let mut current = self.rows.first[location.row];
        while let Some(id) = current {
            let column = self.element(id).column;
            if column == location.column {
                return Some(id);
            }
            if column > location.column {
                return None;
            }
            current = self.element(id).right;
        }
        None
    }

    fn allocate(&mut self, location: MatrixLocation) -> ElementId {
        let element = Element::new(location.row, location.column);
        match self.free.pop() {
            Some(id) => {
                self.elements[id.0] = element;
                id
            }
            None => {
                self.elements.push(element);
                ElementId(self.elements.len() - 1)
            }
        }
    }

    /// Insert an element into its line along `axis`, keeping the line sorted.
    fn link(&mut self, axis: Axis, id: ElementId) {
        let line = self.element(id).line(axis);
        let key = self.element(id).key(axis);

        // Appending is by far the most frequent case while stamping
        let (prev, next) = match self.lines(axis).last[line] {
            Some(last) if self.element(last).key(axis) < key => (Some(last), None),
            _ => {
                let mut prev = None;
                let mut current = self.lines(axis).first[line];
                while let Some(c) = current {
                    if self.element(c).key(axis) > key {
                        break;
                    }
                    prev = Some(c);
                    current = self.element(c).next(axis);
                }
                (prev, current)
            }
        };

        self.element_mut(id).set_prev(axis, prev);
        self.element_mut(id).set_next(axis, next);
        match prev {
            Some(p) => self.element_mut(p).set_next(axis, Some(id)),
            None => self.lines_mut(axis).first[line] = Some(id),
        }
        match next {
            Some(n) => self.element_mut(n).set_prev(axis, Some(id)),
            None => self.lines_mut(axis).last[line] = Some(id),
        }
    }

    /// Take an element out of its line along `axis`.
    fn unlink(&mut self, axis: Axis, id: ElementId) {
        let line = self.element(id).line(axis);
        let prev = self.element(id).prev(axis);
        let next = self.element(id).next(axis);
        match prev {
            Some(p) => self.element_mut(p).set_next(axis, next),
            None => self.lines_mut(axis).first[line] = next,
        }
        match next {
            Some(n) => self.element_mut(n).set_prev(axis, prev),
            None => self.lines_mut(axis).last[line] = prev,
        }
        self.element_mut(id).set_prev(axis, None);
        self.element_mut(id).set_next(axis, None);
    }

    fn collect_line(&self, axis: Axis, line: usize) -> Vec<ElementId> {
        let mut ids = Vec::new();
        let mut current = self.lines(axis).first[line];
        while let Some(id) = current {
            ids.push(id);
            current = self.element(id).next(axis);
        }
        ids
    }

    /// Exchange two lines along `axis`.
    ///
    /// Elements keep their position inside their own line; only their links
    /// in the crossing lines are updated.
    fn swap_lines(&mut self, axis: Axis, a: usize, b: usize) {
        if a == b {
            return;
        }
        debug_assert!(a > 0 && b > 0 && a.max(b) <= self.size);
        let cross = axis.cross();
        let from_a = self.collect_line(axis, a);
        let from_b = self.collect_line(axis, b);

        for &id in from_a.iter().chain(from_b.iter()) {
            self.unlink(cross, id);
            let (row, column) = self.coordinates(id);
            if row == column && self.diagonal[row] == Some(id) {
                self.diagonal[row] = None;
            }
        }
        for &id in &from_a {
            self.element_mut(id).set_line(axis, b);
        }
        for &id in &from_b {
            self.element_mut(id).set_line(axis, a);
        }
        for &id in from_a.iter().chain(from_b.iter()) {
            self.link(cross, id);
            let (row, column) = self.coordinates(id);
            if row == column {
                self.diagonal[row] = Some(id);
            }
        }
        self.lines_mut(axis).swap(a, b);
    }

    /// Exchange two rows.
    pub fn swap_rows(&mut self, a: usize, b: usize) {
        self.swap_lines(Axis::Row, a, b);
    }

    /// Exchange two columns.
    pub fn swap_columns(&mut self, a: usize, b: usize) {
        self.swap_lines(Axis::Column, a, b);
    }

    /// Set every value to zero, keeping the structure.
    pub fn reset(&mut self) {
        for element in &mut self.elements {
            element.value = T::default();
        }
    }

    /// Remove all elements.
    pub fn clear(&mut self) {
        self.elements.truncate(1);
        self.elements[0].value = T::default();
        self.free.clear();
        self.rows = Lines::new();
        self.columns = Lines::new();
        self.diagonal = vec![None];
        self.size = 0;
        self.count = 0;
    }
}

impl<T> SparseMatrix<T> {
    /// Row of an element.
    pub fn row(&self, id: ElementId) -> usize {
        self.elements[id.0].row
    }

    /// Column of an element.
    pub fn column(&self, id: ElementId) -> usize {
        self.elements[id.0].column
    }

    /// Location of an element.
    pub fn location(&self, id: ElementId) -> MatrixLocation {
        let element = &self.elements[id.0];
        MatrixLocation::new(element.row, element.column)
    }

    /// Next element in the same row.
    pub fn right(&self, id: ElementId) -> Option<ElementId> {
        self.elements[id.0].right
    }

    /// Previous element in the same row.
    pub fn left(&self, id: ElementId) -> Option<ElementId> {
        self.elements[id.0].left
    }

    /// Previous element in the same column.
    pub fn above(&self, id: ElementId) -> Option<ElementId> {
        self.elements[id.0].above
    }

    /// Next element in the same column.
    pub fn below(&self, id: ElementId) -> Option<ElementId> {
        self.elements[id.0].below
    }

    /// First element of a row.
    pub fn first_in_row(&self, row: usize) -> Option<ElementId> {
        self.rows.first.get(row).copied().flatten()
    }

    /// Last element of a row.
    pub fn last_in_row(&self, row: usize) -> Option<ElementId> {
        self.rows.last.get(row).copied().flatten()
    }

    /// First element of a column.
    pub fn first_in_column(&self, column: usize) -> Option<ElementId> {
        self.columns.first.get(column).copied().flatten()
    }

    /// Last element of a column.
    pub fn last_in_column(&self, column: usize) -> Option<ElementId> {
        self.columns.last.get(column).copied().flatten()
    }

    /// Iterate over the elements of a row, left to right.
    pub fn row_elements(&self, row: usize) -> LineIter<'_, T> {
        LineIter {
            matrix: self,
            axis: Axis::Row,
            current: self.first_in_row(row),
        }
    }

    /// Iterate over the elements of a column, top to bottom.
    pub fn column_elements(&self, column: usize) -> LineIter<'_, T> {
        LineIter {
            matrix: self,
            axis: Axis::Column,
            current: self.first_in_column(column),
        }
    }
}

/// Iterator over the elements of one row or column.
pub struct LineIter<'a, T> {
    matrix: &'a SparseMatrix<T>,
    axis: Axis,
    current: Option<ElementId>,
}

impl<T> Iterator for LineIter<'_, T> {
    type Item = ElementId;

    fn next(&mut self) -> Option<ElementId> {
        let id = self.current?;
        self.current = self.matrix.elements[id.0].next(self.axis);
        Some(id)
    }
}

impl<T> Index<ElementId> for SparseMatrix<T> {
    type Output = T;

    fn index(&self, id: ElementId) -> &T {
        &self.elements[id.0].value
    }
}

impl<T> IndexMut<ElementId> for SparseMatrix<T> {
    fn index_mut(&mut self, id: ElementId) -> &mut T {
        &mut self.elements[id.0].value
    }
}

impl<T: fmt::Display> fmt::Display for SparseMatrix<T> {
    /// Dense dump of the matrix; structural zeros are shown as `.`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for row in 1..=self.size {
            let mut cells = vec![String::from("."); self.size];
            for id in self.row_elements(row) {
                cells[self.column(id) - 1] = format!("{}", self[id]);
            }
            let width = cells.iter().map(String::len).max().unwrap_or(1);
            let line: Vec<String> = cells.iter().map(|c| format!("{:>width$}", c)).collect();
            writeln!(f, "{}", line.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(row: usize, column: usize) -> MatrixLocation {
        MatrixLocation::new(row, column)
    }

    /// Assert that every row and column is sorted and doubly linked.
    fn check_links(matrix: &SparseMatrix<f64>) {
        for row in 1..=matrix.size() {
            let ids: Vec<_> = matrix.row_elements(row).collect();
            for pair in ids.windows(2) {
                assert!(matrix.column(pair[0]) < matrix.column(pair[1]));
                assert_eq!(matrix.left(pair[1]), Some(pair[0]));
            }
            for &id in &ids {
                assert_eq!(matrix.row(id), row);
            }
            assert_eq!(matrix.last_in_row(row), ids.last().copied());
        }
        for column in 1..=matrix.size() {
            let ids: Vec<_> = matrix.column_elements(column).collect();
            for pair in ids.windows(2) {
                assert!(matrix.row(pair[0]) < matrix.row(pair[1]));
                assert_eq!(matrix.above(pair[1]), Some(pair[0]));
            }
            for &id in &ids {
                assert_eq!(matrix.column(id), column);
            }
            assert_eq!(matrix.last_in_column(column), ids.last().copied());
            let diagonal = ids.iter().copied().find(|&id| matrix.row(id) == column);
            assert_eq!(matrix.find_diagonal_element(column), diagonal);
        }
    }

    #[test]
    fn test_get_element_is_stable() {
        let mut m = SparseMatrix::<f64>::new();
        let a = m.get_element(loc(2, 3));
        m[a] = 4.0;
        let b = m.get_element(loc(1, 3));
        let c = m.get_element(loc(2, 1));

        assert_eq!(m.get_element(loc(2, 3)), a);
        assert_eq!(m[a], 4.0);
        assert_eq!(m.size(), 3);
        assert_eq!(m.element_count(), 3);
        assert_eq!(m.first_in_column(3), Some(b));
        assert_eq!(m.first_in_row(2), Some(c));
        check_links(&m);
    }

    #[test]
    fn test_reference_line_is_trash() {
        let mut m = SparseMatrix::<f64>::new();
        let t = m.get_element(loc(0, 2));
        m[t] += 1.0;
        assert_eq!(m.element_count(), 0);
        assert_eq!(m.find_element(loc(0, 2)), None);
        assert_eq!(m.get_element(loc(3, 0)), t);
        m.reset();
        assert_eq!(m[t], 0.0);
    }

    #[test]
    fn test_find_and_remove() {
        let mut m = SparseMatrix::<f64>::new();
        for i in 1..=4 {
            m.get_element(loc(i, i));
            m.get_element(loc(i, 5 - i));
        }
        assert_eq!(m.element_count(), 8);
        assert!(m.find_element(loc(1, 4)).is_some());
        assert!(m.find_element(loc(1, 3)).is_none());

        assert!(m.remove_element(loc(2, 2)));
        assert!(!m.remove_element(loc(2, 2)));
        assert_eq!(m.find_diagonal_element(2), None);
        assert_eq!(m.element_count(), 7);
        check_links(&m);

        // Freed slots are reused
        let again = m.get_element(loc(2, 2));
        assert_eq!(m.find_diagonal_element(2), Some(again));
        check_links(&m);
    }

    #[test]
    fn test_swap_rows_keeps_order() {
        let mut m = SparseMatrix::<f64>::new();
        let entries = [(1, 1, 1.0), (1, 3, 2.0), (2, 2, 3.0), (3, 1, 4.0), (3, 2, 5.0), (4, 4, 6.0)];
        for &(r, c, v) in &entries {
            let id = m.get_element(loc(r, c));
            m[id] = v;
        }
        m.swap_rows(1, 3);
        check_links(&m);

        let value = |m: &SparseMatrix<f64>, r, c| m.find_element(loc(r, c)).map(|id| m[id]);
        assert_eq!(value(&m, 3, 1), Some(1.0));
        assert_eq!(value(&m, 3, 3), Some(2.0));
        assert_eq!(value(&m, 1, 1), Some(4.0));
        assert_eq!(value(&m, 1, 2), Some(5.0));
        assert_eq!(value(&m, 1, 3), None);
        assert_eq!(m.find_diagonal_element(3).map(|id| m[id]), Some(2.0));

        m.swap_columns(2, 4);
        check_links(&m);
        assert_eq!(value(&m, 1, 4), Some(5.0));
        assert_eq!(value(&m, 2, 4), Some(3.0));
        assert_eq!(value(&m, 4, 2), Some(6.0));
        assert_eq!(m.find_diagonal_element(2), None);
        assert_eq!(m.find_diagonal_element(4), None);
    }

    #[test]
    fn test_swap_moves_diagonals() {
        let mut m = SparseMatrix::<f64>::new();
        let upper = m.get_element(loc(1, 2));
        let lower = m.get_element(loc(2, 1));
        assert_eq!(m.find_diagonal_element(1), None);

        m.swap_rows(1, 2);
        check_links(&m);
        assert_eq!(m.find_diagonal_element(1), Some(lower));
        assert_eq!(m.find_diagonal_element(2), Some(upper));

        m.swap_columns(1, 2);
        check_links(&m);
        assert_eq!(m.find_diagonal_element(1), None);
        assert_eq!(m.find_diagonal_element(2), None);
        assert_eq!(m.location(upper), loc(2, 1));
    }

    #[test]
    fn test_swap_then_swap_back() {
        let mut m = SparseMatrix::<f64>::new();
        let ids: Vec<_> = [(1, 2), (2, 1), (2, 3), (3, 3), (3, 1)]
            .iter()
            .map(|&(r, c)| m.get_element(loc(r, c)))
            .collect();
        m.swap_columns(1, 3);
        m.swap_rows(2, 3);
        m.swap_rows(2, 3);
        m.swap_columns(1, 3);
        check_links(&m);
        for (&id, &(r, c)) in ids.iter().zip([(1, 2), (2, 1), (2, 3), (3, 3), (3, 1)].iter()) {
            assert_eq!(m.location(id), loc(r, c));
        }
    }

    #[test]
    fn test_clear() {
        let mut m = SparseMatrix::<f64>::new();
        m.get_element(loc(3, 3));
        m.clear();
        assert_eq!(m.size(), 0);
        assert_eq!(m.element_count(), 0);
        assert_eq!(m.find_element(loc(3, 3)), None);
    }

    #[test]
    fn test_display() {
        let mut m = SparseMatrix::<f64>::new();
        let a = m.get_element(loc(1, 1));
        m[a] = 1.0;
        let b = m.get_element(loc(2, 1));
        m[b] = 2.0;
        m.get_element(loc(2, 2));
        assert_eq!(m.to_string(), "1 .\n2 0\n");
    }
}
