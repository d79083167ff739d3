use std::sync::{Arc, PoisonError, RwLock};

use modelgate_core::model::{Effect, HealthStatus, Policy, PolicyContext, PolicyResult};

use crate::config::schema::PolicySection;

use super::pattern::{rank_policies, CompiledPolicy};

const AUDIT_TARGET: &str = "modelgate::audit";

/// Immutable policy snapshot. Replaced wholesale on every mutation so
/// evaluators never observe a partially applied change.
#[derive(Debug, Default)]
struct PolicySet {
    /// Insertion order, as returned by `get_policies`.
    policies: Vec<Policy>,
    ranked: Vec<CompiledPolicy>,
}

impl PolicySet {
    fn build(policies: Vec<Policy>) -> Self {
        let ranked = rank_policies(&policies);
        Self { policies, ranked }
    }
}

/// Attribute-based allow/deny evaluation over an ordered rule set.
/// Construct once at startup, then share via Arc.
pub struct PolicyEngine {
    default_effect: Effect,
    audit_enabled: bool,
    set: RwLock<Arc<PolicySet>>,
}

impl Default for PolicyEngine {
    fn default() -> Self {
        Self::new(Effect::Deny, true)
    }
}

impl PolicyEngine {
    pub fn new(default_effect: Effect, audit_enabled: bool) -> Self {
        if default_effect.is_allow() {
            tracing::warn!("policy engine configured with default effect ALLOW; unmatched requests will be admitted");
        }
        Self {
            default_effect,
            audit_enabled,
            set: RwLock::new(Arc::new(PolicySet::default())),
        }
    }

    /// Build an engine and load the configured policies.
    pub fn from_section(section: &PolicySection) -> Self {
        let engine = Self::new(section.default_effect, section.audit_enabled);
        engine.load_policies(section.policies.clone());
        engine
    }

    pub fn default_effect(&self) -> Effect {
        self.default_effect
    }

    fn snapshot(&self) -> Arc<PolicySet> {
        let guard = self.set.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    fn swap(&self, next: PolicySet) {
        let mut guard = self.set.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(next);
    }

    /// Decide whether `ctx.principal` may perform `ctx.action` on `ctx.resource`.
    /// First matching rule in priority order wins; otherwise the default effect applies.
    pub fn evaluate(&self, ctx: &PolicyContext) -> PolicyResult {
        let set = self.snapshot();

        let result = match set.ranked.iter().find(|p| {
            p.matches(&ctx.principal, &ctx.action, &ctx.resource, &ctx.attributes)
        }) {
            Some(p) => PolicyResult {
                allowed: p.effect.is_allow(),
                reason: format!("matched policy: {}", p.name),
                matched_policy_id: Some(p.id.clone()),
                default_applied: false,
            },
            None => PolicyResult {
                allowed: self.default_effect.is_allow(),
                reason: format!("default policy: {} all", self.default_effect.as_str()),
                matched_policy_id: None,
                default_applied: true,
            },
        };

        if self.audit_enabled {
            tracing::info!(
                target: AUDIT_TARGET,
                principal = %ctx.principal,
                action = %ctx.action,
                resource = %ctx.resource,
                allowed = result.allowed,
                matched_policy = result.matched_policy_id.as_deref().unwrap_or("-"),
                "policy evaluated"
            );
        }

        result
    }

    /// Replace the full policy set atomically.
    pub fn load_policies(&self, policies: Vec<Policy>) {
        let count = policies.len();
        self.swap(PolicySet::build(policies));
        if self.audit_enabled {
            tracing::info!(target: AUDIT_TARGET, count, "policies loaded");
        }
    }

    pub fn add_policy(&self, policy: Policy) {
        let mut guard = self.set.write().unwrap_or_else(PoisonError::into_inner);
        let mut policies = guard.policies.clone();
        if self.audit_enabled {
            tracing::info!(target: AUDIT_TARGET, id = %policy.id, name = %policy.name, "policy added");
        }
        policies.push(policy);
        *guard = Arc::new(PolicySet::build(policies));
    }

    /// Remove every policy with `id`. Returns whether one existed.
    pub fn remove_policy(&self, id: &str) -> bool {
        let mut guard = self.set.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.policies.len();
        let policies: Vec<Policy> = guard
            .policies
            .iter()
            .filter(|p| p.id != id)
            .cloned()
            .collect();
        let removed = policies.len() < before;
        if removed {
            *guard = Arc::new(PolicySet::build(policies));
        }
        if self.audit_enabled {
            tracing::info!(target: AUDIT_TARGET, id, removed, "policy remove");
        }
        removed
    }

    /// Copy of the active policies in insertion order.
    pub fn get_policies(&self) -> Vec<Policy> {
        self.snapshot().policies.clone()
    }

    pub fn health_check(&self) -> HealthStatus {
        let count = self.snapshot().policies.len();
        HealthStatus::new(
            true,
            format!(
                "PolicyEngine operational. {count} policies loaded. Default: {}",
                self.default_effect.as_str()
            ),
        )
    }
}
