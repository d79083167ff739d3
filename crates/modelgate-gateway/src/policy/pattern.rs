//! Pattern compilation and matching utilities.
//!
//! A pattern is either the wildcard `*` or an exact string. Rule pattern
//! lists are compiled once when the policy set changes, so evaluation only
//! compares strings.

use std::collections::BTreeMap;

use serde_json::Value;

use modelgate_core::model::{Effect, Policy};

/// Compiled pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Pattern {
    Any,
    Exact(String),
}

impl Pattern {
    pub fn compile(raw: &str) -> Self {
        if raw == "*" {
            Pattern::Any
        } else {
            Pattern::Exact(raw.to_string())
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(s) => s == value,
        }
    }
}

/// Compiled pattern set. An empty set matches nothing.
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    any: bool,
    exact: Vec<String>,
}

impl PatternSet {
    pub fn compile(raw: &[String]) -> Self {
        let mut out = PatternSet {
            any: false,
            exact: Vec::with_capacity(raw.len()),
        };
        for s in raw {
            match Pattern::compile(s) {
                Pattern::Any => out.any = true,
                Pattern::Exact(e) => out.exact.push(e),
            }
        }
        out
    }

    pub fn matches(&self, value: &str) -> bool {
        self.any || self.exact.iter().any(|e| e == value)
    }
}

/// Policy with its pattern sets compiled for matching.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    pub id: String,
    pub name: String,
    pub effect: Effect,
    pub priority: i32,
    principals: PatternSet,
    actions: PatternSet,
    resources: PatternSet,
    conditions: BTreeMap<String, Value>,
}

impl CompiledPolicy {
    pub fn compile(p: &Policy) -> Self {
        Self {
            id: p.id.clone(),
            name: p.name.clone(),
            effect: p.effect,
            priority: p.priority,
            principals: PatternSet::compile(&p.principals),
            actions: PatternSet::compile(&p.actions),
            resources: PatternSet::compile(&p.resources),
            conditions: p.conditions.clone(),
        }
    }

    /// Principal, action and resource must all match; every condition must be
    /// present in `attributes` with an equal value.
    pub fn matches(
        &self,
        principal: &str,
        action: &str,
        resource: &str,
        attributes: &BTreeMap<String, Value>,
    ) -> bool {
        if !self.principals.matches(principal)
            || !self.actions.matches(action)
            || !self.resources.matches(resource)
        {
            return false;
        }
        self.conditions
            .iter()
            .all(|(k, want)| attributes.get(k) == Some(want))
    }
}

/// Compile and rank policies: priority descending, ties keep insertion order.
pub fn rank_policies(policies: &[Policy]) -> Vec<CompiledPolicy> {
    let mut ranked: Vec<CompiledPolicy> = policies.iter().map(CompiledPolicy::compile).collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.priority.cmp(&a.priority));
    ranked
}
