//! Adapters for storage and advisory backends.

pub mod advisory;
pub mod filesystem;
pub mod sqlite;
