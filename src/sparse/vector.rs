//! Linked sparse vector.

use std::ops::{Index, IndexMut};

/// Handle to an element of a [`SparseVector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VectorElementId(usize);

#[derive(Debug, Clone)]
struct Entry<T> {
    index: usize,
    value: T,
    below: Option<VectorElementId>,
}

const TRASH_CAN: VectorElementId = VectorElementId(0);

/// A sparse vector with 1-based indices, linked in increasing index order.
#[derive(Debug, Clone)]
pub struct SparseVector<T> {
    entries: Vec<Entry<T>>,
    free: Vec<VectorElementId>,
    first: Option<VectorElementId>,
    length: usize,
    count: usize,
}

impl<T: Copy + Default> Default for SparseVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Copy + Default> SparseVector<T> {
    /// Create an empty vector.
    pub fn new() -> Self {
        Self {
            entries: vec![Entry {
                index: 0,
                value: T::default(),
                below: None,
            }],
            free: Vec::new(),
            first: None,
            length: 0,
            count: 0,
        }
    }

    /// The largest index allocated so far.
    pub fn len(&self) -> usize {
        self.length
    }

    /// Check if nothing was ever allocated.
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Number of linked elements.
    pub fn element_count(&self) -> usize {
        self.count
    }

    /// Returns the entry at `index` and the entry linked before it.
    fn locate(&self, index: usize) -> (Option<VectorElementId>, Option<VectorElementId>) {
        let mut prev = None;
        let mut current = self.first;
        while let Some(id) = current {
            if self.entries[id.0].index >= index {
                break;
            }
            prev = Some(id);
            current = self.entries[id.0].below;
        }
        let found = current.filter(|id| self.entries[id.0].index == index);
        (prev, found)
    }

    fn link(&mut self, id: VectorElementId) {
        let index = self.entries[id.0].index;
        let (prev, _) = self.locate(index);
        let next = match prev {
            Some(p) => self.entries[p.0].below,
            None => self.first,
        };
        self.entries[id.0].below = next;
        match prev {
            Some(p) => self.entries[p.0].below = Some(id),
            None => self.first = Some(id),
        }
    }

    fn unlink(&mut self, id: VectorElementId) {
        let index = self.entries[id.0].index;
        let (prev, _) = self.locate(index);
        let next = self.entries[id.0].below;
        match prev {
            Some(p) => self.entries[p.0].below = next,
            None => self.first = next,
        }
        self.entries[id.0].below = None;
    }

    /// Find the element at `index`, creating it if needed.
    ///
    /// Index 0 returns the trash can element.
    pub fn get_element(&mut self, index: usize) -> VectorElementId {
        if index == 0 {
            return TRASH_CAN;
        }
        if let Some(id) = self.find_element(index) {
            return id;
        }
        let entry = Entry {
            index,
            value: T::default(),
            below: None,
        };
        let id = match self.free.pop() {
            Some(id) => {
                self.entries[id.0] = entry;
                id
            }
            None => {
                self.entries.push(entry);
                VectorElementId(self.entries.len() - 1)
            }
        };
        self.link(id);
        self.length = self.length.max(index);
        self.count += 1;
        id
    }

    /// Find the element at `index` without creating it.
    pub fn find_element(&self, index: usize) -> Option<VectorElementId> {
        if index == 0 || index > self.length {
            return None;
        }
        self.locate(index).1
    }

    /// Remove the element at `index`.
    pub fn remove_element(&mut self, index: usize) -> bool {
        let Some(id) = self.find_element(index) else {
            return false;
        };
        self.unlink(id);
        self.entries[id.0].value = T::default();
        self.free.push(id);
        self.count -= 1;
        true
    }

    /// Exchange the elements at two indices.
    pub fn swap_elements(&mut self, a: usize, b: usize) {
        if a == b {
            return;
        }
        let first = self.find_element(a);
        let second = self.find_element(b);
        for id in [first, second].into_iter().flatten() {
            self.unlink(id);
        }
        if let Some(id) = first {
            self.entries[id.0].index = b;
            self.link(id);
        }
        if let Some(id) = second {
            self.entries[id.0].index = a;
            self.link(id);
        }
        self.length = self.length.max(a).max(b);
    }

    /// Set every value to zero, keeping the structure.
    pub fn reset(&mut self) {
        for entry in &mut self.entries {
            entry.value = T::default();
        }
    }

    /// Remove all elements.
    pub fn clear(&mut self) {
        self.entries.truncate(1);
        self.entries[0].value = T::default();
        self.free.clear();
        self.first = None;
        self.length = 0;
        self.count = 0;
    }
}

impl<T> SparseVector<T> {
    /// Index of an element.
    pub fn index_of(&self, id: VectorElementId) -> usize {
        self.entries[id.0].index
    }

    /// First element.
    pub fn first_in_vector(&self) -> Option<VectorElementId> {
        self.first
    }

    /// Next element in index order.
    pub fn below(&self, id: VectorElementId) -> Option<VectorElementId> {
        self.entries[id.0].below
    }

    /// Iterate over `(index, value)` pairs in increasing index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> + '_ {
        let mut current = self.first;
        std::iter::from_fn(move || {
            let id = current?;
            let entry = &self.entries[id.0];
            current = entry.below;
            Some((entry.index, &entry.value))
        })
    }
}

impl<T> Index<VectorElementId> for SparseVector<T> {
    type Output = T;

    fn index(&self, id: VectorElementId) -> &T {
        &self.entries[id.0].value
    }
}

impl<T> IndexMut<VectorElementId> for SparseVector<T> {
    fn index_mut(&mut self, id: VectorElementId) -> &mut T {
        &mut self.entries[id.0].value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sorted_insertion() {
        let mut v = SparseVector::<f64>::new();
        for &i in &[4, 1, 3] {
            let id = v.get_element(i);
            v[id] = i as f64;
        }
        let indices: Vec<usize> = v.iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 3, 4]);
        assert_eq!(v.len(), 4);
        assert_eq!(v.element_count(), 3);
        assert!(v.find_element(2).is_none());
    }

    #[test]
    fn test_swap_elements() {
        let mut v = SparseVector::<f64>::new();
        let a = v.get_element(1);
        v[a] = 10.0;
        let b = v.get_element(3);
        v[b] = 30.0;

        v.swap_elements(1, 3);
        assert_eq!(v.index_of(a), 3);
        assert_eq!(v.index_of(b), 1);

        // Swapping with an empty slot moves the element
        v.swap_elements(3, 2);
        let pairs: Vec<(usize, f64)> = v.iter().map(|(i, &x)| (i, x)).collect();
        assert_eq!(pairs, vec![(1, 30.0), (2, 10.0)]);
    }

    #[test]
    fn test_remove_and_trash() {
        let mut v = SparseVector::<f64>::new();
        let t = v.get_element(0);
        v[t] = 5.0;
        assert_eq!(v.element_count(), 0);
        v.get_element(2);
        assert!(v.remove_element(2));
        assert!(!v.remove_element(2));
        assert_eq!(v.first_in_vector(), None);
        v.reset();
        assert_eq!(v[t], 0.0);
    }
}
