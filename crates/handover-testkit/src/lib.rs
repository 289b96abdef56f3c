//! Testing utilities for the handover workspace
//!
//! A simulated ledger implementing the capability and submission
//! interfaces, with scriptable fault injection: transient submission
//! failures, business rejections, confirmation timeouts, and out-of-band
//! administrative changes.

#![allow(missing_docs)]

pub mod faults;
pub mod sim;

pub use faults::*;
pub use sim::*;

use handover_core::{Capability, Principal, Registry, ResourceSpec};

/// Standard two-resource fixture: one ward-model resource, one owned
/// resource (the smallest registry that exercises all three phases).
pub fn two_resource_registry() -> Registry {
    Registry::from_specs(vec![
        ResourceSpec::new("vat", [Capability::Grantable, Capability::Revocable]),
        ResourceSpec::new("proxy", [Capability::Ownable]),
    ])
    .expect("fixture registry is valid")
}

/// Ward-only registry of `n` resources
pub fn ward_registry(n: usize) -> Registry {
    let specs = (0..n)
        .map(|i| ResourceSpec::new(format!("ward{i}"), [Capability::Grantable, Capability::Revocable]))
        .collect();
    Registry::from_specs(specs).expect("fixture registry is valid")
}

pub fn deployer() -> Principal {
    Principal::from("0xDEPLOYER")
}

pub fn governance() -> Principal {
    Principal::from("0xGOVERNANCE")
}
