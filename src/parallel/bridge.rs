//! Sharing solver elements between workers that load concurrently.
//!
//! While binding, every worker asks for the elements it is going to stamp.
//! The [`BridgeBinder`] remembers which worker asked for an element first.
//! That worker owns the element; every later worker gets a bridge for it.
//!
//! While loading, each worker writes into its own [`LocalStamps`]. Writes
//! to owned elements are recorded as they come, writes to bridged elements
//! are summed into a private slot. Once all workers are done the buffers
//! are merged into the solver one after the other by [`LocalStamps::apply`].
//! No worker ever touches the solver itself.

use std::collections::HashMap;

use crate::solver::{ElementProvider, Scalar, Stamps};
use crate::sparse::{ElementId, MatrixLocation, VectorElementId};

/// How a worker may write to an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The worker was the first to ask for the element.
    Direct,
    /// Another worker owns the element.
    Bridged,
}

/// Records which worker owns which element.
#[derive(Debug, Clone, Default)]
pub struct BridgeBinder {
    matrix_owners: HashMap<ElementId, usize>,
    rhs_owners: HashMap<VectorElementId, usize>,
}

impl BridgeBinder {
    /// Create an empty binder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a matrix element for `worker`.
    pub fn claim_matrix(&mut self, id: ElementId, worker: usize) -> Claim {
        Self::claim(&mut self.matrix_owners, id, worker)
    }

    /// Claim a right-hand side element for `worker`.
    pub fn claim_rhs(&mut self, id: VectorElementId, worker: usize) -> Claim {
        Self::claim(&mut self.rhs_owners, id, worker)
    }

    fn claim<K: std::hash::Hash + Eq>(owners: &mut HashMap<K, usize>, key: K, worker: usize) -> Claim {
        let owner = *owners.entry(key).or_insert(worker);
        if owner == worker {
            Claim::Direct
        } else {
            Claim::Bridged
        }
    }

    /// Forget every claim.
    pub fn clear(&mut self) {
        self.matrix_owners.clear();
        self.rhs_owners.clear();
    }
}

/// A worker's private view of the solver while loading.
#[derive(Debug, Clone)]
pub struct LocalStamps<T> {
    matrix_slots: HashMap<ElementId, usize>,
    matrix_bridges: Vec<(ElementId, T)>,
    rhs_slots: HashMap<VectorElementId, usize>,
    rhs_bridges: Vec<(VectorElementId, T)>,
    matrix_direct: Vec<(ElementId, T)>,
    rhs_direct: Vec<(VectorElementId, T)>,
}

impl<T: Scalar> Default for LocalStamps<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Scalar> LocalStamps<T> {
    /// Create a buffer without bridges.
    pub fn new() -> Self {
        Self {
            matrix_slots: HashMap::new(),
            matrix_bridges: Vec::new(),
            rhs_slots: HashMap::new(),
            rhs_bridges: Vec::new(),
            matrix_direct: Vec::new(),
            rhs_direct: Vec::new(),
        }
    }

    /// Route writes to a matrix element through a private slot.
    pub fn bridge_matrix(&mut self, id: ElementId) {
        let next = self.matrix_bridges.len();
        if *self.matrix_slots.entry(id).or_insert(next) == next {
            self.matrix_bridges.push((id, T::zero()));
        }
    }

    /// Route writes to a right-hand side element through a private slot.
    pub fn bridge_rhs(&mut self, id: VectorElementId) {
        let next = self.rhs_bridges.len();
        if *self.rhs_slots.entry(id).or_insert(next) == next {
            self.rhs_bridges.push((id, T::zero()));
        }
    }

    /// Number of bridged elements.
    pub fn bridge_count(&self) -> usize {
        self.matrix_bridges.len() + self.rhs_bridges.len()
    }

    /// Write everything recorded since the last reset into `target`.
    pub fn apply(&self, target: &mut dyn Stamps<T>) {
        for &(id, value) in &self.matrix_direct {
            target.add_matrix(id, value);
        }
        for &(id, value) in &self.rhs_direct {
            target.add_rhs(id, value);
        }
        for &(id, value) in &self.matrix_bridges {
            target.add_matrix(id, value);
        }
        for &(id, value) in &self.rhs_bridges {
            target.add_rhs(id, value);
        }
    }

    /// Drop recorded writes and zero the bridges, keeping the bridge table.
    pub fn reset(&mut self) {
        self.matrix_direct.clear();
        self.rhs_direct.clear();
        for (_, value) in &mut self.matrix_bridges {
            *value = T::zero();
        }
        for (_, value) in &mut self.rhs_bridges {
            *value = T::zero();
        }
    }

    /// Drop everything, bridges included.
    pub fn clear(&mut self) {
        self.matrix_slots.clear();
        self.matrix_bridges.clear();
        self.rhs_slots.clear();
        self.rhs_bridges.clear();
        self.matrix_direct.clear();
        self.rhs_direct.clear();
    }
}

impl<T: Scalar> Stamps<T> for LocalStamps<T> {
    fn add_matrix(&mut self, id: ElementId, value: T) {
        match self.matrix_slots.get(&id) {
            Some(&slot) => self.matrix_bridges[slot].1 += value,
            None => self.matrix_direct.push((id, value)),
        }
    }

    fn add_rhs(&mut self, id: VectorElementId, value: T) {
        match self.rhs_slots.get(&id) {
            Some(&slot) => self.rhs_bridges[slot].1 += value,
            None => self.rhs_direct.push((id, value)),
        }
    }
}

/// Element provider used while one worker binds.
///
/// Elements come from the real solver; the claim decides whether the
/// worker's buffer bridges them.
pub struct ClaimingProvider<'a, T> {
    parent: &'a mut dyn ElementProvider,
    binder: &'a mut BridgeBinder,
    local: &'a mut LocalStamps<T>,
    worker: usize,
}

impl<'a, T: Scalar> ClaimingProvider<'a, T> {
    /// Bind on behalf of `worker`.
    pub fn new(
        parent: &'a mut dyn ElementProvider,
        binder: &'a mut BridgeBinder,
        local: &'a mut LocalStamps<T>,
        worker: usize,
    ) -> Self {
        Self {
            parent,
            binder,
            local,
            worker,
        }
    }
}

impl<T: Scalar> ElementProvider for ClaimingProvider<'_, T> {
    fn matrix_element(&mut self, location: MatrixLocation) -> ElementId {
        let id = self.parent.matrix_element(location);
        if self.binder.claim_matrix(id, self.worker) == Claim::Bridged {
            self.local.bridge_matrix(id);
        }
        id
    }

    fn rhs_element(&mut self, row: usize) -> VectorElementId {
        let id = self.parent.rhs_element(row);
        if self.binder.claim_rhs(id, self.worker) == Claim::Bridged {
            self.local.bridge_rhs(id);
        }
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::RealSolver;

    #[test]
    fn test_first_claimer_owns() {
        let mut solver = RealSolver::new();
        let id = solver.get_element(MatrixLocation::new(1, 1));
        let mut binder = BridgeBinder::new();
        assert_eq!(binder.claim_matrix(id, 0), Claim::Direct);
        assert_eq!(binder.claim_matrix(id, 1), Claim::Bridged);
        assert_eq!(binder.claim_matrix(id, 0), Claim::Direct);
        binder.clear();
        assert_eq!(binder.claim_matrix(id, 1), Claim::Direct);
    }

    #[test]
    fn test_merge_sums_contributions() {
        let mut solver = RealSolver::new();
        let mut binder = BridgeBinder::new();
        let mut locals = vec![LocalStamps::<f64>::new(), LocalStamps::<f64>::new()];

        // Both workers stamp the shared diagonal (1, 1)
        let mut handles = Vec::new();
        for (worker, local) in locals.iter_mut().enumerate() {
            let mut provider = ClaimingProvider::new(&mut solver, &mut binder, local, worker);
            let shared = provider.matrix_element(MatrixLocation::new(1, 1));
            let own = provider.matrix_element(MatrixLocation::new(worker + 2, worker + 2));
            let rhs = provider.rhs_element(1);
            handles.push((shared, own, rhs));
        }
        assert_eq!(locals[0].bridge_count(), 0);
        assert_eq!(locals[1].bridge_count(), 2);

        for round in 0..2 {
            solver.reset();
            for (local, &(shared, own, rhs)) in locals.iter_mut().zip(&handles) {
                local.reset();
                local.add_matrix(shared, 1.5);
                local.add_matrix(shared, 0.5);
                local.add_matrix(own, 3.0);
                local.add_rhs(rhs, 1.0);
            }
            for local in &locals {
                local.apply(&mut solver);
            }
            let (shared, own, rhs) = handles[1];
            assert_eq!(solver[shared], 4.0, "round {}", round);
            assert_eq!(solver[own], 3.0);
            assert_eq!(solver[rhs], 2.0);
        }
    }
}
