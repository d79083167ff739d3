#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use std::collections::BTreeMap;

use serde_json::json;

use modelgate_core::model::{Effect, Policy, PolicyContext};
use modelgate_gateway::policy::PolicyEngine;

fn policy(id: &str, effect: Effect, principals: &[&str], actions: &[&str], resources: &[&str], priority: i32) -> Policy {
    Policy {
        id: id.into(),
        name: format!("{id}-name"),
        description: String::new(),
        effect,
        principals: principals.iter().map(|s| s.to_string()).collect(),
        actions: actions.iter().map(|s| s.to_string()).collect(),
        resources: resources.iter().map(|s| s.to_string()).collect(),
        conditions: BTreeMap::new(),
        priority,
    }
}

fn use_x(principal: &str) -> PolicyContext {
    PolicyContext::new(principal, "use", "model:x")
}

#[test]
fn empty_set_denies_everything() {
    let engine = PolicyEngine::default();
    for (p, a, r) in [("alice", "use", "model:x"), ("", "", ""), ("*", "*", "*")] {
        let res = engine.evaluate(&PolicyContext::new(p, a, r));
        assert!(!res.allowed);
        assert!(res.default_applied);
        assert!(res.matched_policy_id.is_none());
        assert_eq!(res.reason, "default policy: deny all");
    }
}

#[test]
fn higher_priority_wins_regardless_of_insertion_order() {
    let allow = policy("allow", Effect::Allow, &["*"], &["use"], &["model:x"], 1);
    let deny = policy("deny", Effect::Deny, &["*"], &["use"], &["model:x"], 5);

    let a = PolicyEngine::default();
    a.load_policies(vec![allow.clone(), deny.clone()]);
    let b = PolicyEngine::default();
    b.load_policies(vec![deny, allow]);

    for engine in [&a, &b] {
        let res = engine.evaluate(&use_x("alice"));
        assert!(!res.allowed);
        assert_eq!(res.matched_policy_id.as_deref(), Some("deny"));
        assert!(!res.default_applied);
    }
}

#[test]
fn equal_priority_keeps_insertion_order() {
    let engine = PolicyEngine::default();
    engine.add_policy(policy("first", Effect::Allow, &["*"], &["*"], &["*"], 3));
    engine.add_policy(policy("second", Effect::Deny, &["*"], &["*"], &["*"], 3));

    let res = engine.evaluate(&use_x("bob"));
    assert!(res.allowed);
    assert_eq!(res.matched_policy_id.as_deref(), Some("first"));
    assert_eq!(res.reason, "matched policy: first-name");
}

#[test]
fn all_three_dimensions_must_match() {
    let engine = PolicyEngine::default();
    engine.add_policy(policy("p", Effect::Allow, &["alice"], &["use"], &["model:x"], 0));

    assert!(engine.evaluate(&use_x("alice")).allowed);
    assert!(!engine.evaluate(&use_x("bob")).allowed);
    assert!(!engine.evaluate(&PolicyContext::new("alice", "admin", "model:x")).allowed);
    assert!(!engine.evaluate(&PolicyContext::new("alice", "use", "model:y")).allowed);
}

#[test]
fn wildcard_is_only_a_literal_star() {
    let engine = PolicyEngine::default();
    engine.add_policy(policy("p", Effect::Allow, &["user:*"], &["*"], &["*"], 0));

    // `user:*` is an exact pattern, not a prefix glob
    assert!(!engine.evaluate(&use_x("user:alice")).allowed);
    assert!(engine.evaluate(&use_x("user:*")).allowed);
}

#[test]
fn conditions_narrow_matches() {
    let mut eu_only = policy("eu", Effect::Allow, &["*"], &["use"], &["*"], 0);
    eu_only.conditions.insert("region".into(), json!("eu"));
    let engine = PolicyEngine::default();
    engine.add_policy(eu_only);

    assert!(engine.evaluate(&use_x("a").with_attribute("region", "eu")).allowed);
    assert!(!engine.evaluate(&use_x("a").with_attribute("region", "us")).allowed);
    assert!(!engine.evaluate(&use_x("a")).allowed);
}

#[test]
fn default_allow_is_honoured_when_configured() {
    let engine = PolicyEngine::new(Effect::Allow, false);
    let res = engine.evaluate(&use_x("anyone"));
    assert!(res.allowed);
    assert!(res.default_applied);
    assert_eq!(res.reason, "default policy: allow all");
}

#[test]
fn load_replaces_the_whole_set() {
    let engine = PolicyEngine::default();
    engine.add_policy(policy("old", Effect::Allow, &["*"], &["*"], &["*"], 0));
    engine.load_policies(vec![policy("new", Effect::Deny, &["*"], &["*"], &["*"], 0)]);

    let ids: Vec<String> = engine.get_policies().into_iter().map(|p| p.id).collect();
    assert_eq!(ids, vec!["new"]);
    assert_eq!(engine.evaluate(&use_x("a")).matched_policy_id.as_deref(), Some("new"));
}

#[test]
fn remove_reports_existence() {
    let engine = PolicyEngine::default();
    engine.add_policy(policy("p", Effect::Allow, &["*"], &["*"], &["*"], 0));

    assert!(engine.remove_policy("p"));
    assert!(!engine.remove_policy("p"));
    assert!(!engine.remove_policy("never"));
    assert!(!engine.evaluate(&use_x("a")).allowed);
}

#[test]
fn get_policies_is_a_snapshot_in_insertion_order() {
    let engine = PolicyEngine::default();
    engine.add_policy(policy("low", Effect::Allow, &["*"], &["*"], &["*"], 1));
    engine.add_policy(policy("high", Effect::Deny, &["*"], &["*"], &["*"], 9));

    let mut snap = engine.get_policies();
    assert_eq!(snap[0].id, "low");
    assert_eq!(snap[1].id, "high");

    snap.clear();
    assert_eq!(engine.get_policies().len(), 2);
}

#[test]
fn health_reports_policy_count_and_default() {
    let engine = PolicyEngine::default();
    engine.add_policy(policy("p", Effect::Allow, &["*"], &["*"], &["*"], 0));
    let h = engine.health_check();
    assert!(h.healthy);
    assert!(h.message.contains("1 policies loaded"));
    assert!(h.message.contains("deny"));
}

#[test]
fn concurrent_evaluation_sees_whole_sets() {
    use std::sync::Arc;
    use std::thread;

    let engine = Arc::new(PolicyEngine::new(Effect::Deny, false));
    let set_a = vec![
        policy("a1", Effect::Allow, &["*"], &["*"], &["*"], 2),
        policy("a2", Effect::Deny, &["*"], &["*"], &["*"], 1),
    ];
    let set_b = vec![
        policy("b1", Effect::Deny, &["*"], &["*"], &["*"], 2),
        policy("b2", Effect::Allow, &["*"], &["*"], &["*"], 1),
    ];

    let writer = {
        let engine = engine.clone();
        thread::spawn(move || {
            for i in 0..500 {
                engine.load_policies(if i % 2 == 0 { set_a.clone() } else { set_b.clone() });
            }
        })
    };

    for _ in 0..500 {
        let res = engine.evaluate(&use_x("a"));
        match res.matched_policy_id.as_deref() {
            None => assert!(!res.allowed),
            Some("a1") => assert!(res.allowed),
            Some("b1") => assert!(!res.allowed),
            Some(other) => panic!("saw a partially applied set: {other}"),
        }
    }
    writer.join().unwrap();
}

#[derive(Clone, Default)]
struct Captured(std::sync::Arc<std::sync::Mutex<Vec<u8>>>);

impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Captured {
    fn lines_with(&self, needle: &str) -> Vec<String> {
        let text = String::from_utf8(self.0.lock().unwrap().clone()).unwrap();
        text.lines().filter(|l| l.contains(needle)).map(str::to_string).collect()
    }
}

fn with_captured_logs(f: impl FnOnce()) -> Captured {
    let out = Captured::default();
    let writer = out.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    tracing::subscriber::with_default(subscriber, f);
    out
}

#[test]
fn audit_records_every_evaluation() {
    let logs = with_captured_logs(|| {
        let engine = PolicyEngine::new(Effect::Deny, true);
        engine.add_policy(policy("p", Effect::Allow, &["alice"], &["use"], &["model:x"], 0));
        engine.evaluate(&use_x("alice"));
        engine.evaluate(&use_x("mallory"));
    });

    let events = logs.lines_with("policy evaluated");
    assert_eq!(events.len(), 2);
    for line in &events {
        assert!(line.contains("modelgate::audit"), "{line}");
        assert!(line.contains("action=use"), "{line}");
        assert!(line.contains("resource=model:x"), "{line}");
    }
    assert!(events[0].contains("principal=alice"));
    assert!(events[0].contains("allowed=true"));
    assert!(events[0].contains("matched_policy=\"p\""));
    assert!(events[1].contains("principal=mallory"));
    assert!(events[1].contains("allowed=false"));
}

#[test]
fn audit_disabled_emits_nothing() {
    let logs = with_captured_logs(|| {
        let engine = PolicyEngine::new(Effect::Deny, false);
        engine.add_policy(policy("p", Effect::Allow, &["*"], &["*"], &["*"], 0));
        engine.evaluate(&use_x("alice"));
        engine.remove_policy("p");
    });

    assert!(logs.lines_with("modelgate::audit").is_empty());
}
