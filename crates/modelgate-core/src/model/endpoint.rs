//! Backend endpoints and routing request/result.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::policy::PolicyResult;
use super::quota::QuotaReservation;

/// A selectable backend target (model/provider pair).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelEndpoint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub provider: String,
    pub model: String,
    #[serde(default)]
    pub url: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_true")]
    pub healthy: bool,
    /// Higher is preferred when routing for performance.
    #[serde(default)]
    pub priority: i32,
    pub max_tokens_per_request: u64,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl ModelEndpoint {
    /// Resource name under which policies and quota address this endpoint.
    pub fn resource(&self) -> String {
        format!("model:{}", self.id)
    }

    pub fn supports(&self, required: &[String]) -> bool {
        required.iter().all(|cap| self.capabilities.contains(cap))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingRequest {
    pub principal: String,
    #[serde(default)]
    pub required_capabilities: Vec<String>,
    pub estimated_tokens: u64,
    /// Overrides the router default when set.
    #[serde(default)]
    pub prefer_cost: Option<bool>,
    /// Case-insensitive substring of the model name.
    #[serde(default)]
    pub preferred_model: Option<String>,
    /// Forwarded into the policy context attributes.
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingResult {
    pub endpoint: Option<ModelEndpoint>,
    pub success: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_result: Option<PolicyResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quota_reservation: Option<QuotaReservation>,
    /// Candidates still under consideration; informational, never retried.
    pub alternatives: Vec<ModelEndpoint>,
}

impl RoutingResult {
    pub fn failure(reason: impl Into<String>, alternatives: Vec<ModelEndpoint>) -> Self {
        Self {
            endpoint: None,
            success: false,
            reason: reason.into(),
            policy_result: None,
            quota_reservation: None,
            alternatives,
        }
    }
}
