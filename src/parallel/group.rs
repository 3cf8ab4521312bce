//! A behavior that loads its children through a work distributor.

use tracing::debug;

use crate::error::Result;
use crate::simulation::{Behavior, BindContext, LoadState};
use crate::solver::Stamps;

use super::bridge::{BridgeBinder, ClaimingProvider, LocalStamps};
use super::distributor::{default_distributor, Job, WorkDistributor};
use super::flag::SharedFlag;

/// Groups behaviors that may be loaded concurrently.
///
/// Each child is one job. Children never see the solver while loading:
/// they write into a private [`LocalStamps`] and the group merges all of
/// them once every job is done.
pub struct ParallelGroup {
    name: String,
    children: Vec<Box<dyn Behavior>>,
    binder: BridgeBinder,
    locals: Vec<LocalStamps<f64>>,
    distributor: Box<dyn WorkDistributor>,
}

impl ParallelGroup {
    /// Create an empty group using the default distributor.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_distributor(name, default_distributor())
    }

    /// Create an empty group using a specific distributor.
    pub fn with_distributor(name: impl Into<String>, distributor: Box<dyn WorkDistributor>) -> Self {
        Self {
            name: name.into(),
            children: Vec::new(),
            binder: BridgeBinder::new(),
            locals: Vec::new(),
            distributor,
        }
    }

    /// Add a child behavior.
    pub fn add(&mut self, child: impl Behavior + 'static) {
        self.children.push(Box::new(child));
    }

    /// Add a boxed child behavior.
    pub fn add_boxed(&mut self, child: Box<dyn Behavior>) {
        self.children.push(child);
    }

    /// Number of children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Check if the group has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of elements shared between children.
    pub fn bridge_count(&self) -> usize {
        self.locals.iter().map(LocalStamps::bridge_count).sum()
    }
}

impl Behavior for ParallelGroup {
    fn name(&self) -> &str {
        &self.name
    }

    fn bind(&mut self, context: &mut BindContext<'_>) -> Result<()> {
        self.binder.clear();
        self.locals = self.children.iter().map(|_| LocalStamps::new()).collect();

        let (variables, provider) = context.parts();
        for (worker, (child, local)) in self
            .children
            .iter_mut()
            .zip(self.locals.iter_mut())
            .enumerate()
        {
            let mut claiming = ClaimingProvider::new(&mut *provider, &mut self.binder, local, worker);
            let mut child_context = BindContext::new(&mut *variables, &mut claiming);
            child.bind(&mut child_context)?;
        }
        debug!(
            group = %self.name,
            children = self.children.len(),
            bridges = self.bridge_count(),
            threads = self.distributor.concurrency(),
            "parallel group bound"
        );
        Ok(())
    }

    fn load(&mut self, state: &LoadState<'_>, stamps: &mut dyn Stamps<f64>) {
        let jobs: Vec<Job<'_>> = self
            .children
            .iter_mut()
            .zip(self.locals.iter_mut())
            .map(|(child, local)| {
                Box::new(move || {
                    local.reset();
                    child.load(state, local);
                }) as Job<'_>
            })
            .collect();
        self.distributor.execute(jobs);

        for local in &self.locals {
            local.apply(stamps);
        }
    }

    fn is_convergent(&self, state: &LoadState<'_>) -> bool {
        let convergent = SharedFlag::new(true);
        let jobs: Vec<Job<'_>> = self
            .children
            .iter()
            .map(|child| {
                let convergent = &convergent;
                Box::new(move || {
                    if !child.is_convergent(state) {
                        convergent.set(false);
                    }
                }) as Job<'_>
            })
            .collect();
        self.distributor.execute(jobs);
        convergent.get()
    }
}
