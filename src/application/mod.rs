//! Application layer: the optimization control loop.

pub mod autonomous_loop;

pub use autonomous_loop::{
    AbortHandle, AutonomousLoop, LoopConfig, LoopDependencies, LoopResult, NewRun,
};
