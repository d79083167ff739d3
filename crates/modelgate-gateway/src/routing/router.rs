//! Endpoint selection.
//!
//! [`ModelRouter`] filters the endpoint snapshot down to eligible candidates,
//! orders them by cost or priority, then admits them one at a time through
//! the policy evaluator and the quota reserver. The first candidate that
//! clears both wins. Denials and exhausted quota are outcomes, not errors.

use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use modelgate_core::model::{
    HealthStatus, ModelEndpoint, PolicyContext, QuotaRequest, RoutingRequest, RoutingResult,
};

use crate::config::schema::RouterSection;

use super::traits::{PolicyEvaluator, QuotaReserver};

pub const REASON_NO_ELIGIBLE: &str = "no eligible endpoints available for the requested capabilities";
pub const REASON_ALL_FAILED: &str = "all eligible endpoints failed policy or quota checks";

/// Action name used for every routing policy check.
pub const USE_ACTION: &str = "use";

pub struct ModelRouter {
    default_prefer_cost: bool,
    fallback_endpoint_id: Option<String>,
    endpoints: RwLock<Vec<ModelEndpoint>>,
    policy: Option<Arc<dyn PolicyEvaluator>>,
    quota: Option<Arc<dyn QuotaReserver>>,
}

impl std::fmt::Debug for ModelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRouter")
            .field("default_prefer_cost", &self.default_prefer_cost)
            .field("fallback_endpoint_id", &self.fallback_endpoint_id)
            .field("endpoint_count", &self.get_endpoints().len())
            .field("policy", &self.policy.is_some())
            .field("quota", &self.quota.is_some())
            .finish()
    }
}

impl ModelRouter {
    /// Router without policy or quota checks; attach them with `with_policy` / `with_quota`.
    pub fn new(section: &RouterSection) -> Self {
        Self {
            default_prefer_cost: section.default_prefer_cost,
            fallback_endpoint_id: section.fallback_endpoint_id.clone(),
            endpoints: RwLock::new(section.endpoints.clone()),
            policy: None,
            quota: None,
        }
    }

    pub fn with_policy(mut self, policy: Arc<dyn PolicyEvaluator>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_quota(mut self, quota: Arc<dyn QuotaReserver>) -> Self {
        self.quota = Some(quota);
        self
    }

    /// Pick an endpoint for `req`, holding quota on it when a reserver is attached.
    pub async fn select_route(&self, req: &RoutingRequest) -> RoutingResult {
        let snapshot = self.get_endpoints();

        let mut candidates: Vec<ModelEndpoint> = snapshot
            .iter()
            .filter(|ep| is_eligible(ep, req))
            .cloned()
            .collect();

        if let Some(preferred) = req.preferred_model.as_deref() {
            let needle = preferred.to_lowercase();
            let narrowed: Vec<ModelEndpoint> = candidates
                .iter()
                .filter(|ep| ep.model.to_lowercase().contains(&needle))
                .cloned()
                .collect();
            if !narrowed.is_empty() {
                candidates = narrowed;
            }
        }

        if candidates.is_empty() {
            let fallback = self.fallback_endpoint_id.as_deref().and_then(|id| {
                snapshot
                    .iter()
                    .find(|ep| ep.id == id && ep.active && ep.healthy)
            });
            match fallback {
                Some(ep) => {
                    tracing::debug!(endpoint = %ep.id, "no eligible endpoints, using fallback");
                    candidates.push(ep.clone());
                }
                None => {
                    tracing::debug!(principal = %req.principal, "no eligible endpoints");
                    return RoutingResult::failure(REASON_NO_ELIGIBLE, Vec::new());
                }
            }
        }

        let prefer_cost = req.prefer_cost.unwrap_or(self.default_prefer_cost);
        if prefer_cost {
            candidates.sort_by(|a, b| a.cost_per_1k_tokens.total_cmp(&b.cost_per_1k_tokens));
        } else {
            candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
        }

        for (idx, ep) in candidates.iter().enumerate() {
            let resource = ep.resource();

            let policy_result = match &self.policy {
                Some(policy) => {
                    let ctx = policy_context(req, ep, &resource);
                    let result = policy.evaluate(&ctx).await;
                    if !result.allowed {
                        tracing::debug!(endpoint = %ep.id, stage = "policy", reason = %result.reason, "candidate skipped");
                        continue;
                    }
                    Some(result)
                }
                None => None,
            };

            let quota_reservation = match &self.quota {
                Some(quota) => {
                    let reservation = quota
                        .reserve(&QuotaRequest::new(
                            req.principal.clone(),
                            resource.clone(),
                            req.estimated_tokens as f64,
                        ))
                        .await;
                    if !reservation.available {
                        tracing::debug!(endpoint = %ep.id, stage = "quota", remaining = reservation.tokens_remaining, "candidate skipped");
                        continue;
                    }
                    Some(reservation)
                }
                None => None,
            };

            let label = if ep.name.is_empty() { &ep.id } else { &ep.name };
            let reason = format!("selected endpoint: {label} ({})", ep.model);
            tracing::info!(principal = %req.principal, endpoint = %ep.id, rank = idx, "route selected");

            let alternatives = candidates
                .iter()
                .filter(|other| other.id != ep.id)
                .cloned()
                .collect();

            return RoutingResult {
                endpoint: Some(ep.clone()),
                success: true,
                reason,
                policy_result,
                quota_reservation,
                alternatives,
            };
        }

        tracing::info!(principal = %req.principal, candidates = candidates.len(), "all candidates refused");
        RoutingResult::failure(REASON_ALL_FAILED, candidates)
    }

    /// Snapshot copy of the endpoint list.
    pub fn get_endpoints(&self) -> Vec<ModelEndpoint> {
        self.endpoints
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Insert `endpoint`, replacing any endpoint with the same id in place.
    pub fn add_endpoint(&self, endpoint: ModelEndpoint) {
        let mut eps = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        match eps.iter_mut().find(|ep| ep.id == endpoint.id) {
            Some(slot) => *slot = endpoint,
            None => eps.push(endpoint),
        }
    }

    pub fn remove_endpoint(&self, id: &str) -> bool {
        let mut eps = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        let before = eps.len();
        eps.retain(|ep| ep.id != id);
        eps.len() < before
    }

    /// Returns whether the endpoint exists.
    pub fn update_health(&self, id: &str, healthy: bool) -> bool {
        self.modify(id, |ep| ep.healthy = healthy)
    }

    /// Returns whether the endpoint exists.
    pub fn set_active(&self, id: &str, active: bool) -> bool {
        self.modify(id, |ep| ep.active = active)
    }

    fn modify(&self, id: &str, f: impl FnOnce(&mut ModelEndpoint)) -> bool {
        let mut eps = self.endpoints.write().unwrap_or_else(PoisonError::into_inner);
        match eps.iter_mut().find(|ep| ep.id == id) {
            Some(ep) => {
                f(ep);
                true
            }
            None => false,
        }
    }

    pub fn health_check(&self) -> HealthStatus {
        let eps = self.get_endpoints();
        let active = eps.iter().filter(|ep| ep.active).count();
        let healthy = eps.iter().filter(|ep| ep.active && ep.healthy).count();
        HealthStatus::new(
            healthy > 0,
            format!("ModelRouter: {healthy}/{active} endpoints healthy"),
        )
    }
}

fn is_eligible(ep: &ModelEndpoint, req: &RoutingRequest) -> bool {
    ep.active
        && ep.healthy
        && ep.max_tokens_per_request >= req.estimated_tokens
        && ep.supports(&req.required_capabilities)
}

fn policy_context(req: &RoutingRequest, ep: &ModelEndpoint, resource: &str) -> PolicyContext {
    let mut ctx = PolicyContext::new(req.principal.clone(), USE_ACTION, resource);
    ctx.attributes = req.metadata.clone();
    ctx.attributes
        .insert("provider".into(), Value::from(ep.provider.clone()));
    ctx.attributes
        .insert("model".into(), Value::from(ep.model.clone()));
    ctx.attributes
        .insert("estimated_tokens".into(), Value::from(req.estimated_tokens));
    ctx
}
