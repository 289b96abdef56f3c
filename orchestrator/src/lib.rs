//! Authorization migration orchestrator
//!
//! Sequences, executes, and resumes the transfer of administrative
//! authority from a transient deployer identity to a permanent governance
//! identity, never letting a resource pass through a state with zero
//! authorized administrators.

pub mod config;
pub mod error;
pub mod executor;
pub mod guard;
pub mod handle;
pub mod journal;
pub mod resume;
pub mod sequencer;

pub use config::*;
pub use error::*;
pub use executor::*;
pub use guard::*;
pub use handle::*;
pub use journal::*;
pub use resume::*;
pub use sequencer::*;
