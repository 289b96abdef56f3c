//! Core domain model for the handover workspace
//!
//! Defines the pieces every other crate builds on:
//! - Resource registry (which resources exist, what they support)
//! - Migration planning (phased, ordered authority-transfer steps)
//! - The step status state machine
//! - Capability and submission interfaces consumed by the orchestrator

pub mod api;
pub mod error;
pub mod plan;
pub mod registry;
pub mod state_machine;
pub mod types;

pub use api::*;
pub use error::*;
pub use plan::*;
pub use registry::*;
pub use types::*;
