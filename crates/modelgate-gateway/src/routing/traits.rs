use async_trait::async_trait;

use modelgate_core::model::{PolicyContext, PolicyResult, QuotaRequest, QuotaReservation};

use crate::policy::PolicyEngine;
use crate::quota::QuotaEngine;

/// Policy side of admission. Never fails for a well-formed context.
#[async_trait]
pub trait PolicyEvaluator: Send + Sync {
    async fn evaluate(&self, ctx: &PolicyContext) -> PolicyResult;
}

/// Quota side of admission.
#[async_trait]
pub trait QuotaReserver: Send + Sync {
    /// Always returns a record; check `available`.
    async fn reserve(&self, req: &QuotaRequest) -> QuotaReservation;
    async fn release(&self, reservation_id: &str) -> bool;
    async fn check(&self, principal: &str, resource: &str) -> f64;
}

#[async_trait]
impl PolicyEvaluator for PolicyEngine {
    async fn evaluate(&self, ctx: &PolicyContext) -> PolicyResult {
        PolicyEngine::evaluate(self, ctx)
    }
}

#[async_trait]
impl QuotaReserver for QuotaEngine {
    async fn reserve(&self, req: &QuotaRequest) -> QuotaReservation {
        QuotaEngine::reserve(self, req)
    }

    async fn release(&self, reservation_id: &str) -> bool {
        QuotaEngine::release(self, reservation_id)
    }

    async fn check(&self, principal: &str, resource: &str) -> f64 {
        QuotaEngine::check(self, principal, resource)
    }
}
