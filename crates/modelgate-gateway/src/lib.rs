//! modelgate gateway library entry.
//!
//! This crate wires the policy engine, the quota engine and the model router
//! into an admission control plane, plus the tool bus, config loading,
//! metrics and the HTTP surface. It is intended to be consumed by the binary
//! (`main.rs`) and by integration tests.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod app_state;
pub mod config;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod quota;
pub mod router;
pub mod routing;
pub mod tools;
pub mod transport;
