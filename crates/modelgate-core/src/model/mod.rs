//! Data model shared by the admission engines.
//!
//! - `policy`: rules, evaluation context and result.
//! - `quota`: bucket configuration, reservation request and record.
//! - `endpoint`: backend endpoints and the routing request/result pair.
//!
//! Every type is plain data. Results are produced fresh per call and never
//! alias engine state.

pub mod endpoint;
pub mod policy;
pub mod quota;

use serde::{Deserialize, Serialize};

pub use endpoint::{ModelEndpoint, RoutingRequest, RoutingResult};
pub use policy::{Effect, Policy, PolicyContext, PolicyResult};
pub use quota::{BucketConfig, QuotaRequest, QuotaReservation, QuotaStats};

/// Thin status summary consumed by liveness/readiness probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
}

impl HealthStatus {
    pub fn new(healthy: bool, message: impl Into<String>) -> Self {
        Self {
            healthy,
            message: message.into(),
        }
    }
}
