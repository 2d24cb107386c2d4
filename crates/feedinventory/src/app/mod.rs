//! Application entry points
//!
//! Each subcommand wires its adapters and domain services together and hands
//! the resulting background tasks to [`tasks::Tasks`], which owns shutdown.

pub mod controller;
pub mod predictor;
pub mod tasks;

pub use tasks::Tasks;
