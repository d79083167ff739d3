#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use modelgate_core::error::{GateError, Result};
use modelgate_gateway::tools::bus::compare_versions;
use modelgate_gateway::tools::{
    NegotiationRequest, ToolBus, ToolCapability, ToolExecutionRequest, ToolHandler, ToolPlugin,
};

struct Echo;

#[async_trait]
impl ToolHandler for Echo {
    async fn invoke(&self, capability_id: &str, input: Value) -> Result<Value> {
        Ok(json!({ "capability": capability_id, "input": input }))
    }
}

struct Broken;

#[async_trait]
impl ToolHandler for Broken {
    async fn invoke(&self, _capability_id: &str, _input: Value) -> Result<Value> {
        Err(GateError::Internal("tool exploded".into()))
    }
}

struct Slow;

#[async_trait]
impl ToolHandler for Slow {
    async fn invoke(&self, _capability_id: &str, _input: Value) -> Result<Value> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Value::Null)
    }
}

fn plugin(id: &str, version: &str, caps: &[&str]) -> ToolPlugin {
    ToolPlugin {
        id: id.into(),
        name: format!("{id} plugin"),
        version: version.into(),
        description: String::new(),
        capabilities: caps
            .iter()
            .map(|c| ToolCapability {
                id: c.to_string(),
                name: c.to_string(),
                description: String::new(),
            })
            .collect(),
        entry_point: String::new(),
        active: true,
    }
}

fn plugin_ids(plugins: &[ToolPlugin]) -> Vec<&str> {
    plugins.iter().map(|p| p.id.as_str()).collect()
}

#[test]
fn register_indexes_capabilities() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("search", "1.0.0", &["web.search", "web.fetch"]), Arc::new(Echo));
    bus.register_plugin(plugin("crawler", "2.1.0", &["web.fetch"]), Arc::new(Echo));

    assert_eq!(plugin_ids(&bus.get_plugins()), vec!["crawler", "search"]);
    assert_eq!(plugin_ids(&bus.find_by_capability("web.fetch")), vec!["crawler", "search"]);
    assert_eq!(plugin_ids(&bus.find_by_capability("web.search")), vec!["search"]);
    assert!(bus.find_by_capability("fs.read").is_empty());
    assert_eq!(bus.get_plugin("crawler").unwrap().version, "2.1.0");
}

#[test]
fn reregister_replaces_capabilities() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("p", "1.0.0", &["old"]), Arc::new(Echo));
    bus.register_plugin(plugin("p", "1.1.0", &["new"]), Arc::new(Echo));

    assert!(bus.find_by_capability("old").is_empty());
    assert_eq!(plugin_ids(&bus.find_by_capability("new")), vec!["p"]);
    assert_eq!(bus.get_plugins().len(), 1);
}

#[test]
fn unregister_drops_index_entries() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("p", "1.0.0", &["cap"]), Arc::new(Echo));

    assert!(bus.unregister_plugin("p"));
    assert!(!bus.unregister_plugin("p"));
    assert!(bus.find_by_capability("cap").is_empty());
    assert_eq!(bus.health_check().message, "ToolBus: 0 active plugins, 0 capabilities registered");
}

#[test]
fn concurrent_unregister_never_hides_a_new_provider() {
    use std::thread;

    for round in 0..500 {
        let bus = Arc::new(ToolBus::default());
        bus.register_plugin(plugin("a", "1.0.0", &["cap"]), Arc::new(Echo));

        let leaving = {
            let bus = bus.clone();
            thread::spawn(move || bus.unregister_plugin("a"))
        };
        let joining = {
            let bus = bus.clone();
            thread::spawn(move || bus.register_plugin(plugin("b", "1.0.0", &["cap"]), Arc::new(Echo)))
        };
        assert!(leaving.join().unwrap());
        joining.join().unwrap();

        assert_eq!(plugin_ids(&bus.find_by_capability("cap")), vec!["b"], "round {round}");
    }
}

#[test]
fn concurrent_reregistration_keeps_index_consistent() {
    use std::thread;

    let bus = Arc::new(ToolBus::default());
    let writers: Vec<_> = (0..4)
        .map(|t| {
            let bus = bus.clone();
            thread::spawn(move || {
                for i in 0..200 {
                    let cap = if (i + t) % 2 == 0 { "even" } else { "odd" };
                    bus.register_plugin(plugin("p", "1.0.0", &[cap]), Arc::new(Echo));
                }
            })
        })
        .collect();
    for w in writers {
        w.join().unwrap();
    }

    let caps: Vec<String> = bus.get_plugin("p").unwrap().capabilities.into_iter().map(|c| c.id).collect();
    let other = if caps[0] == "even" { "odd" } else { "even" };
    assert_eq!(plugin_ids(&bus.find_by_capability(&caps[0])), vec!["p"]);
    assert!(bus.find_by_capability(other).is_empty());
    assert_eq!(bus.health_check().message, "ToolBus: 1 active plugins, 1 capabilities registered");
}

#[test]
fn replacing_a_plugin_keeps_shared_capabilities_indexed() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("p", "1.0.0", &["keep", "drop"]), Arc::new(Echo));
    bus.register_plugin(plugin("p", "1.1.0", &["keep"]), Arc::new(Echo));

    assert_eq!(plugin_ids(&bus.find_by_capability("keep")), vec!["p"]);
    assert!(bus.find_by_capability("drop").is_empty());
}

#[test]
fn inactive_plugins_are_not_offered() {
    let bus = ToolBus::default();
    let mut off = plugin("off", "1.0.0", &["cap"]);
    off.active = false;
    bus.register_plugin(off, Arc::new(Echo));

    assert!(bus.find_by_capability("cap").is_empty());
    assert_eq!(bus.get_plugins().len(), 1);
}

#[test]
fn negotiate_reports_missing_and_preferred() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("a", "1.0.0", &["x", "y"]), Arc::new(Echo));
    bus.register_plugin(plugin("b", "1.0.0", &["z"]), Arc::new(Echo));

    let res = bus.negotiate(&NegotiationRequest {
        required_capabilities: vec!["x".into(), "missing".into()],
        preferred_capabilities: vec!["z".into(), "nope".into()],
        ..NegotiationRequest::default()
    });
    assert!(!res.success);
    assert_eq!(res.missing_capabilities, vec!["missing"]);
    assert_eq!(res.available_preferred, vec!["z"]);
    assert_eq!(plugin_ids(&res.matched_plugins), vec!["a"]);

    let ok = bus.negotiate(&NegotiationRequest {
        required_capabilities: vec!["x".into(), "z".into()],
        ..NegotiationRequest::default()
    });
    assert!(ok.success);
    assert_eq!(plugin_ids(&ok.matched_plugins), vec!["a", "b"]);
}

#[test]
fn negotiate_filters_by_minimum_version() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("old", "1.9.3", &["cap"]), Arc::new(Echo));
    bus.register_plugin(plugin("new", "1.10.0", &["cap"]), Arc::new(Echo));

    let mut req = NegotiationRequest {
        required_capabilities: vec!["cap".into()],
        ..NegotiationRequest::default()
    };
    req.min_versions.insert("old".into(), "1.10.0".into());
    req.min_versions.insert("new".into(), "1.10.0".into());

    let res = bus.negotiate(&req);
    assert!(res.success);
    assert_eq!(plugin_ids(&res.matched_plugins), vec!["new"]);
}

#[test]
fn version_comparison_is_numeric() {
    assert_eq!(compare_versions("1.10.0", "1.9.9"), Ordering::Greater);
    assert_eq!(compare_versions("2.0", "2.0.0"), Ordering::Equal);
    assert_eq!(compare_versions("1.0.x", "1.0.0"), Ordering::Equal);
    assert_eq!(compare_versions("0.9.1", "0.10.0"), Ordering::Less);
}

#[tokio::test]
async fn execute_runs_first_active_provider() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("echo", "1.0.0", &["say"]), Arc::new(Echo));

    let res = bus
        .execute(ToolExecutionRequest {
            capability_id: "say".into(),
            input: json!({ "text": "hi" }),
            timeout_ms: None,
        })
        .await;
    assert!(res.success);
    assert_eq!(res.plugin_id, "echo");
    assert!(res.error.is_none());
    assert_eq!(res.output.unwrap()["input"]["text"], "hi");
}

#[tokio::test]
async fn execute_without_provider_fails() {
    let bus = ToolBus::default();
    let res = bus
        .execute(ToolExecutionRequest {
            capability_id: "ghost".into(),
            input: Value::Null,
            timeout_ms: None,
        })
        .await;
    assert!(!res.success);
    assert!(res.plugin_id.is_empty());
    assert_eq!(res.error.as_deref(), Some("no plugin found for capability: ghost"));
}

#[tokio::test]
async fn execute_surfaces_handler_errors() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("broken", "1.0.0", &["cap"]), Arc::new(Broken));

    let res = bus
        .execute(ToolExecutionRequest {
            capability_id: "cap".into(),
            input: Value::Null,
            timeout_ms: None,
        })
        .await;
    assert!(!res.success);
    assert_eq!(res.plugin_id, "broken");
    assert!(res.error.unwrap().contains("tool exploded"));
}

#[tokio::test]
async fn execute_times_out() {
    let bus = ToolBus::default();
    bus.register_plugin(plugin("slow", "1.0.0", &["cap"]), Arc::new(Slow));

    let res = bus
        .execute(ToolExecutionRequest {
            capability_id: "cap".into(),
            input: Value::Null,
            timeout_ms: Some(20),
        })
        .await;
    assert!(!res.success);
    assert_eq!(res.error.as_deref(), Some("timed out after 20 ms"));
    assert!(res.duration_ms < 5_000);
}
