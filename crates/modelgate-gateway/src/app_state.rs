//! Shared application state for the modelgate gateway.
//!
//! Composition root: builds the policy engine, quota engine, router and tool
//! bus from config and hands out `Arc` handles. No component is a global.

use std::collections::HashSet;
use std::sync::Arc;

use modelgate_core::error::Result;
use modelgate_core::model::HealthStatus;
use modelgate_core::{Clock, SystemClock};

use crate::config::GatewayConfig;
use crate::obs::metrics::GatewayMetrics;
use crate::policy::PolicyEngine;
use crate::quota::QuotaEngine;
use crate::routing::ModelRouter;
use crate::tools::ToolBus;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: GatewayConfig,
    policy: Arc<PolicyEngine>,
    quota: Arc<QuotaEngine>,
    router: Arc<ModelRouter>,
    tools: Arc<ToolBus>,
    metrics: Arc<GatewayMetrics>,
}

impl AppState {
    /// Build application state on the wall clock.
    pub fn new(cfg: GatewayConfig) -> Result<Self> {
        Self::with_clock(cfg, Arc::new(SystemClock))
    }

    /// Build application state with an explicit time source.
    pub fn with_clock(cfg: GatewayConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        cfg.validate()?;

        let policy = Arc::new(PolicyEngine::from_section(&cfg.policy));
        let quota = Arc::new(QuotaEngine::new(&cfg.quota, clock));
        let router = Arc::new(
            ModelRouter::new(&cfg.router)
                .with_policy(policy.clone())
                .with_quota(quota.clone()),
        );

        // policy <-> endpoint sanity check
        {
            let known: HashSet<String> = cfg.router.endpoints.iter().map(|ep| ep.resource()).collect();
            for p in &cfg.policy.policies {
                for r in &p.resources {
                    if r.starts_with("model:") && !known.contains(r) {
                        tracing::warn!(policy = %p.id, resource = %r, "policy refers to unknown endpoint");
                    }
                }
            }
        }

        tracing::info!(
            policies = cfg.policy.policies.len(),
            endpoints = cfg.router.endpoints.len(),
            default_effect = cfg.policy.default_effect.as_str(),
            "admission engines ready"
        );

        Ok(Self {
            inner: Arc::new(AppStateInner {
                cfg,
                policy,
                quota,
                router,
                tools: Arc::new(ToolBus::default()),
                metrics: Arc::new(GatewayMetrics::default()),
            }),
        })
    }

    pub fn cfg(&self) -> &GatewayConfig {
        &self.inner.cfg
    }

    pub fn policy(&self) -> Arc<PolicyEngine> {
        Arc::clone(&self.inner.policy)
    }

    pub fn quota(&self) -> Arc<QuotaEngine> {
        Arc::clone(&self.inner.quota)
    }

    pub fn router(&self) -> Arc<ModelRouter> {
        Arc::clone(&self.inner.router)
    }

    pub fn tools(&self) -> Arc<ToolBus> {
        Arc::clone(&self.inner.tools)
    }

    pub fn metrics(&self) -> Arc<GatewayMetrics> {
        Arc::clone(&self.inner.metrics)
    }

    pub fn is_draining(&self) -> bool {
        self.inner.metrics.is_draining()
    }

    pub fn set_draining(&self) {
        self.inner.metrics.set_draining();
    }

    /// Per-component health, in a stable order.
    pub fn component_health(&self) -> Vec<(&'static str, HealthStatus)> {
        vec![
            ("policy", self.inner.policy.health_check()),
            ("quota", self.inner.quota.health_check()),
            ("router", self.inner.router.health_check()),
            ("tools", self.inner.tools.health_check()),
        ]
    }

    /// Gauge lines appended to `/metrics`.
    pub fn metrics_extra(&self) -> Vec<(&'static str, u64)> {
        let stats = self.inner.quota.stats();
        let endpoints = self.inner.router.get_endpoints();
        let healthy = endpoints.iter().filter(|ep| ep.active && ep.healthy).count();
        vec![
            ("modelgate_quota_buckets", stats.buckets as u64),
            ("modelgate_quota_reservations_active", stats.reservations as u64),
            ("modelgate_policies_loaded", self.inner.policy.get_policies().len() as u64),
            ("modelgate_endpoints_healthy", healthy as u64),
        ]
    }
}
