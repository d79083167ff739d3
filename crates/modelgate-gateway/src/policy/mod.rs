//! Policy layer (rule patterns, evaluation, audit).
//!
//! Compiles the configured rule set into ranked lookup structures that the
//! router consults once per routing candidate.

pub mod engine;
pub mod pattern;

pub use engine::PolicyEngine;
