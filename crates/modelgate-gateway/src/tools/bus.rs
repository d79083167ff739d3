use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use modelgate_core::error::Result;
use modelgate_core::model::HealthStatus;

pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCapability {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolPlugin {
    pub id: String,
    pub name: String,
    /// `major.minor.patch`
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub capabilities: Vec<ToolCapability>,
    #[serde(default)]
    pub entry_point: String,
    pub active: bool,
}

/// Executes a plugin's capabilities.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn invoke(&self, capability_id: &str, input: Value) -> Result<Value>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NegotiationRequest {
    pub required_capabilities: Vec<String>,
    #[serde(default)]
    pub preferred_capabilities: Vec<String>,
    /// plugin id -> minimum version
    #[serde(default)]
    pub min_versions: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NegotiationResult {
    pub success: bool,
    pub matched_plugins: Vec<ToolPlugin>,
    pub missing_capabilities: Vec<String>,
    pub available_preferred: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionRequest {
    pub capability_id: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    pub success: bool,
    #[serde(default)]
    pub output: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    /// Empty when no plugin handled the request.
    pub plugin_id: String,
    pub duration_ms: u64,
}

#[derive(Clone)]
struct PluginEntry {
    plugin: ToolPlugin,
    handler: Arc<dyn ToolHandler>,
}

/// Plugin registry with a capability index:
/// - `plugin_id -> plugin + handler`
/// - `capability_id -> {plugin_id...}`
///
/// Not part of the admission path.
pub struct ToolBus {
    plugins: DashMap<String, PluginEntry>,
    capability_index: DashMap<String, DashSet<String>>,
    /// Serializes register/unregister; lookups stay lock-free.
    mutations: Mutex<()>,
    default_timeout: Duration,
}

impl Default for ToolBus {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

impl ToolBus {
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            plugins: DashMap::new(),
            capability_index: DashMap::new(),
            mutations: Mutex::new(()),
            default_timeout,
        }
    }

    fn registry_guard(&self) -> MutexGuard<'_, ()> {
        self.mutations.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or replace) a plugin and index its capabilities.
    pub fn register_plugin(&self, plugin: ToolPlugin, handler: Arc<dyn ToolHandler>) {
        let _guard = self.registry_guard();
        let id = plugin.id.clone();
        let current: BTreeSet<String> = plugin.capabilities.iter().map(|c| c.id.clone()).collect();
        for cap in &current {
            self.capability_index
                .entry(cap.clone())
                .or_insert_with(DashSet::new)
                .insert(id.clone());
        }
        tracing::info!(plugin = %id, version = %plugin.version, "tool plugin registered");

        if let Some(prev) = self.plugins.insert(id.clone(), PluginEntry { plugin, handler }) {
            // drop only the capabilities the replacement no longer provides
            let stale = prev
                .plugin
                .capabilities
                .iter()
                .map(|c| c.id.as_str())
                .filter(|cap| !current.contains(*cap));
            self.unindex(&id, stale);
        }
    }

    pub fn unregister_plugin(&self, id: &str) -> bool {
        let _guard = self.registry_guard();
        let Some((_, entry)) = self.plugins.remove(id) else {
            return false;
        };
        self.unindex(id, entry.plugin.capabilities.iter().map(|c| c.id.as_str()));
        tracing::info!(plugin = %id, "tool plugin unregistered");
        true
    }

    fn unindex<'a>(&self, id: &str, caps: impl Iterator<Item = &'a str>) {
        for cap in caps {
            if let Some(set) = self.capability_index.get(cap) {
                set.remove(id);
            }
            self.capability_index.remove_if(cap, |_, set| set.is_empty());
        }
    }

    /// All plugins, sorted by id.
    pub fn get_plugins(&self) -> Vec<ToolPlugin> {
        let mut out: Vec<ToolPlugin> = self.plugins.iter().map(|e| e.plugin.clone()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }

    pub fn get_plugin(&self, id: &str) -> Option<ToolPlugin> {
        self.plugins.get(id).map(|e| e.plugin.clone())
    }

    fn provider_ids(&self, capability_id: &str) -> BTreeSet<String> {
        self.capability_index
            .get(capability_id)
            .map(|set| set.iter().map(|s| s.key().clone()).collect())
            .unwrap_or_default()
    }

    fn active_entries(&self, ids: &BTreeSet<String>) -> Vec<PluginEntry> {
        ids.iter()
            .filter_map(|id| self.plugins.get(id).map(|e| e.value().clone()))
            .filter(|e| e.plugin.active)
            .collect()
    }

    /// Active plugins providing `capability_id`, sorted by id.
    pub fn find_by_capability(&self, capability_id: &str) -> Vec<ToolPlugin> {
        self.active_entries(&self.provider_ids(capability_id))
            .into_iter()
            .map(|e| e.plugin)
            .collect()
    }

    pub fn negotiate(&self, req: &NegotiationRequest) -> NegotiationResult {
        let mut missing = Vec::new();
        let mut matched_ids = BTreeSet::new();

        for cap in &req.required_capabilities {
            let ids = self.provider_ids(cap);
            if ids.is_empty() {
                missing.push(cap.clone());
            } else {
                matched_ids.extend(ids);
            }
        }

        let available_preferred = req
            .preferred_capabilities
            .iter()
            .filter(|cap| self.capability_index.contains_key(cap.as_str()))
            .cloned()
            .collect();

        let matched_plugins = self
            .active_entries(&matched_ids)
            .into_iter()
            .map(|e| e.plugin)
            .filter(|p| match req.min_versions.get(&p.id) {
                Some(min) => compare_versions(&p.version, min) != Ordering::Less,
                None => true,
            })
            .collect();

        NegotiationResult {
            success: missing.is_empty(),
            matched_plugins,
            missing_capabilities: missing,
            available_preferred,
        }
    }

    /// Run the capability on the first active provider, bounded by a timeout.
    pub async fn execute(&self, req: ToolExecutionRequest) -> ToolExecutionResult {
        let started = Instant::now();
        let timeout = req
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout);

        let Some(entry) = self
            .active_entries(&self.provider_ids(&req.capability_id))
            .into_iter()
            .next()
        else {
            return ToolExecutionResult {
                success: false,
                output: None,
                error: Some(format!("no plugin found for capability: {}", req.capability_id)),
                plugin_id: String::new(),
                duration_ms: elapsed_ms(started),
            };
        };

        let plugin_id = entry.plugin.id.clone();
        let outcome =
            tokio::time::timeout(timeout, entry.handler.invoke(&req.capability_id, req.input)).await;

        let (success, output, error) = match outcome {
            Ok(Ok(v)) => (true, Some(v), None),
            Ok(Err(e)) => (false, None, Some(e.to_string())),
            Err(_) => (false, None, Some(format!("timed out after {} ms", timeout.as_millis()))),
        };
        if let Some(err) = &error {
            tracing::warn!(plugin = %plugin_id, capability = %req.capability_id, error = %err, "tool execution failed");
        }

        ToolExecutionResult {
            success,
            output,
            error,
            plugin_id,
            duration_ms: elapsed_ms(started),
        }
    }

    pub fn health_check(&self) -> HealthStatus {
        let active = self.plugins.iter().filter(|e| e.plugin.active).count();
        HealthStatus::new(
            true,
            format!(
                "ToolBus: {active} active plugins, {} capabilities registered",
                self.capability_index.len()
            ),
        )
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

/// Numeric `major.minor.patch` comparison; missing or non-numeric parts count as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> [u64; 3] {
        let mut out = [0u64; 3];
        for (slot, part) in out.iter_mut().zip(v.split('.')) {
            *slot = part.trim().parse().unwrap_or(0);
        }
        out
    };
    parse(a).cmp(&parse(b))
}
