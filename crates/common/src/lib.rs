//! Shared types and utilities for the fleet-console control plane.

pub mod config;
pub mod domain;
pub mod error;
pub mod ids;
pub mod pagination;
pub mod tracing_setup;

pub use config::*;
pub use domain::*;
pub use error::{FleetError, Result};
pub use ids::*;
pub use pagination::*;
pub use tracing_setup::{init_tracing, init_tracing_with_level};
