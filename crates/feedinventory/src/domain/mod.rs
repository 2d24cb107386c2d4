//! Reconciliation and capacity logic, independent of the Kubernetes client

pub mod controller;
pub mod events;
pub mod predictor;
pub mod quantity;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod selector;
pub mod traits;

#[cfg(test)]
pub(crate) mod mock;
