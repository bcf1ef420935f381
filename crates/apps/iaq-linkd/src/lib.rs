//! Daemon support for `iaq-linkd`: configuration, the simulated sensor
//! source, and the node/collector simulation loop.

pub mod config;
pub mod simulated;
pub mod simulation;
