//! Linear dispatch and investment optimisation for energy-system graphs.
//!
//! An [`EnergySystem`] is a typed graph of buses and components (sources,
//! sinks, converters, CHPs, storages, transport links). Over a discrete time
//! horizon the crate derives flow variables for every directed edge, builds
//! per-kind constraint families and balance constraints, attaches a linear
//! cost objective, solves the resulting LP and writes the solved flow series
//! (and, in investment mode, added capacities) back onto the entities.

pub mod config;
pub mod domain;
pub mod error;
pub mod graph;
pub mod model;
pub mod solver;
pub mod telemetry;

pub use config::Config;
pub use domain::{EnergySystem, Entity, EntityKind, Scenario};
pub use error::ModelError;
pub use model::{assemble, optimize, ModelOptions, OptimizationModel};
pub use solver::{LpSolution, SolverConfig};
