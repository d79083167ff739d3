use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use serde::Deserialize;

use modelgate_core::error::{GateError, Result};
use modelgate_core::model::{BucketConfig, Effect, ModelEndpoint, Policy};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub policy: PolicySection,

    #[serde(default)]
    pub quota: QuotaSection,

    #[serde(default)]
    pub router: RouterSection,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(GateError::UnsupportedVersion);
        }

        self.gateway.validate()?;
        self.policy.validate()?;
        self.quota.validate()?;
        self.router.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Period of the quota replenish timer.
    #[serde(default = "default_replenish_interval_ms")]
    pub replenish_interval_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            replenish_interval_ms: default_replenish_interval_ms(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        self.listen_addr()?;
        if !(100..=3_600_000).contains(&self.replenish_interval_ms) {
            return Err(GateError::Config(
                "gateway.replenish_interval_ms must be between 100 and 3600000".into(),
            ));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen.parse().map_err(|_| {
            GateError::Config(format!(
                "gateway.listen must be a valid SocketAddr: {}",
                self.listen
            ))
        })
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_replenish_interval_ms() -> u64 {
    10_000
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySection {
    #[serde(default)]
    pub default_effect: Effect,

    #[serde(default = "default_true")]
    pub audit_enabled: bool,

    #[serde(default)]
    pub policies: Vec<Policy>,
}

impl Default for PolicySection {
    fn default() -> Self {
        Self {
            default_effect: Effect::Deny,
            audit_enabled: true,
            policies: Vec::new(),
        }
    }
}

impl PolicySection {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for p in &self.policies {
            if p.id.trim().is_empty() {
                return Err(GateError::Config("policy.policies[].id must not be empty".into()));
            }
            if !seen.insert(p.id.as_str()) {
                return Err(GateError::Config(format!("duplicate policy id: {}", p.id)));
            }
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QuotaSection {
    #[serde(default)]
    pub default_bucket: BucketConfig,

    #[serde(default)]
    pub principal_overrides: HashMap<String, BucketConfig>,

    #[serde(default)]
    pub resource_overrides: HashMap<String, BucketConfig>,

    #[serde(default = "default_reservation_expiry_ms")]
    pub reservation_expiry_ms: u64,
}

impl Default for QuotaSection {
    fn default() -> Self {
        Self {
            default_bucket: BucketConfig::default(),
            principal_overrides: HashMap::new(),
            resource_overrides: HashMap::new(),
            reservation_expiry_ms: default_reservation_expiry_ms(),
        }
    }
}

impl QuotaSection {
    pub fn validate(&self) -> Result<()> {
        validate_bucket("quota.default_bucket", &self.default_bucket)?;
        for (k, b) in &self.principal_overrides {
            validate_bucket(&format!("quota.principal_overrides.{k}"), b)?;
        }
        for (k, b) in &self.resource_overrides {
            validate_bucket(&format!("quota.resource_overrides.{k}"), b)?;
        }
        if self.reservation_expiry_ms == 0 {
            return Err(GateError::Config(
                "quota.reservation_expiry_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn validate_bucket(path: &str, b: &BucketConfig) -> Result<()> {
    if !(b.max_tokens.is_finite() && b.max_tokens > 0.0) {
        return Err(GateError::Config(format!("{path}.max_tokens must be greater than 0")));
    }
    if !(b.refill_rate.is_finite() && b.refill_rate >= 0.0) {
        return Err(GateError::Config(format!("{path}.refill_rate must not be negative")));
    }
    if b.refill_interval_ms == 0 {
        return Err(GateError::Config(format!(
            "{path}.refill_interval_ms must be greater than 0"
        )));
    }
    if let Some(initial) = b.initial_tokens {
        if !(0.0..=b.max_tokens).contains(&initial) {
            return Err(GateError::Config(format!(
                "{path}.initial_tokens must be between 0 and max_tokens"
            )));
        }
    }
    Ok(())
}

fn default_reservation_expiry_ms() -> u64 {
    300_000
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouterSection {
    #[serde(default)]
    pub default_prefer_cost: bool,

    #[serde(default)]
    pub fallback_endpoint_id: Option<String>,

    #[serde(default)]
    pub endpoints: Vec<ModelEndpoint>,
}

impl RouterSection {
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for ep in &self.endpoints {
            if ep.id.trim().is_empty() {
                return Err(GateError::Config("router.endpoints[].id must not be empty".into()));
            }
            if !seen.insert(ep.id.as_str()) {
                return Err(GateError::Config(format!("duplicate endpoint id: {}", ep.id)));
            }
        }
        if let Some(fallback) = &self.fallback_endpoint_id {
            if !seen.contains(fallback.as_str()) {
                return Err(GateError::Config(format!(
                    "router.fallback_endpoint_id refers to unknown endpoint: {fallback}"
                )));
            }
        }
        Ok(())
    }
}
