//! Domain layer for the schedule autopilot
//!
//! This module contains the run data model, errors, and the ports the
//! optimization loop consumes.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
