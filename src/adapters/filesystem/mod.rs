//! JSON-file persistence for optimization runs.

pub mod state_store;

pub use state_store::FileStateStore;
