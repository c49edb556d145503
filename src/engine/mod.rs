// src/engine/mod.rs

//! Job execution engine.
//!
//! The pure transition rules (cascading cancellation, retry reset, state
//! aggregation, component status) live in [`core`]; the async runner that
//! applies them while driving the agent is in [`runtime`].

pub mod core;
pub mod runtime;

pub use core::{cascade_cancel, component_update, derive_state, retry_reset, ComponentUpdate};
pub use runtime::{EngineOptions, JobRunner};
