//! Concurrent loading of behaviors.
//!
//! The solver itself is single-threaded. What runs in parallel is the load
//! phase: a [`ParallelGroup`] hands each child behavior to a
//! [`WorkDistributor`] as one job.
//!
//! ```text
//!   bind:   child 0 ─┐                      ┌─ Direct  (first claimer)
//!           child 1 ─┼─► BridgeBinder ──────┤
//!           child 2 ─┘                      └─ Bridged (everyone else)
//!
//!   load:   job 0 ─► LocalStamps 0 ─┐
//!           job 1 ─► LocalStamps 1 ─┼─► apply, one after the other ─► solver
//!           job 2 ─► LocalStamps 2 ─┘
//! ```
//!
//! Convergence checks of the children run the same way and are collected
//! in a [`SharedFlag`].

mod bridge;
mod distributor;
mod flag;
mod group;

pub use bridge::{BridgeBinder, Claim, ClaimingProvider, LocalStamps};
#[cfg(feature = "parallel")]
pub use distributor::RayonDistributor;
pub use distributor::{default_distributor, Job, SerialDistributor, WorkDistributor};
pub use flag::SharedFlag;
pub use group::ParallelGroup;
