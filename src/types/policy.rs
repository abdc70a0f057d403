//! Output policy document: per-route [`Policy`] objects grouped by protocol
//! class and port, the shared config pool, and the backend-group table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ext::auth::AuthPolicy;
use crate::ext::header_modify::{RewriteRequestPolicy, RewriteResponsePolicy};
use crate::ext::otel::OtelPolicy;
use crate::ext::redirect::RedirectPolicy;
use crate::ext::timeout::TimeoutPolicy;

use super::{BackendService, ExtKind, Source};

/// Per-route extension config slots as the data plane consumes them.
/// After merge/dedup, slots of pooled domains are cleared in favor of a
/// reference in [`PolicyExtCfg::refs`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyExt {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otel: Option<OtelPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_request: Option<RewriteRequestPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_response: Option<RewriteResponsePolicy>,
}

impl PolicyExt {
    pub fn is_active(&self, kind: ExtKind) -> bool {
        match kind {
            ExtKind::Auth => self.auth.is_some(),
            ExtKind::Redirect => self.redirect.is_some(),
            ExtKind::Timeout => self.timeout.is_some(),
            ExtKind::Otel => self.otel.is_some(),
            ExtKind::RewriteRequest => self.rewrite_request.is_some(),
            ExtKind::RewriteResponse => self.rewrite_response.is_some(),
            ExtKind::Waf => false,
        }
    }

    /// Serialize one slot, for content hashing and pool materialization.
    pub fn slot_value(&self, kind: ExtKind) -> Option<serde_json::Value> {
        let value = match kind {
            ExtKind::Auth => serde_json::to_value(self.auth.as_ref()?),
            ExtKind::Redirect => serde_json::to_value(self.redirect.as_ref()?),
            ExtKind::Timeout => serde_json::to_value(self.timeout.as_ref()?),
            ExtKind::Otel => serde_json::to_value(self.otel.as_ref()?),
            ExtKind::RewriteRequest => serde_json::to_value(self.rewrite_request.as_ref()?),
            ExtKind::RewriteResponse => serde_json::to_value(self.rewrite_response.as_ref()?),
            ExtKind::Waf => return None,
        };
        // These types serialize infallibly; a failure here would be a bug.
        value.ok()
    }

    /// Move one slot out into a fresh record holding only that domain.
    pub fn extract(&mut self, kind: ExtKind) -> PolicyExt {
        let mut single = PolicyExt::default();
        match kind {
            ExtKind::Auth => single.auth = self.auth.take(),
            ExtKind::Redirect => single.redirect = self.redirect.take(),
            ExtKind::Timeout => single.timeout = self.timeout.take(),
            ExtKind::Otel => single.otel = self.otel.take(),
            ExtKind::RewriteRequest => single.rewrite_request = self.rewrite_request.take(),
            ExtKind::RewriteResponse => single.rewrite_response = self.rewrite_response.take(),
            ExtKind::Waf => {}
        }
        single
    }

    pub fn active_kinds(&self) -> Vec<ExtKind> {
        [
            ExtKind::Auth,
            ExtKind::Redirect,
            ExtKind::Timeout,
            ExtKind::Otel,
            ExtKind::RewriteRequest,
            ExtKind::RewriteResponse,
        ]
        .into_iter()
        .filter(|k| self.is_active(*k))
        .collect()
    }
}

/// Inline slots plus shared-pool references for one route.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyExtCfg {
    #[serde(flatten)]
    pub ext: PolicyExt,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub refs: BTreeMap<ExtKind, String>,
}

/// One materialized extension config in the shared pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefBox {
    #[serde(rename = "type")]
    pub kind: ExtKind,
    #[serde(flatten)]
    pub ext: PolicyExt,
}

/// Dedup-key → materialized config; built fresh each pass, replaced
/// wholesale.
pub type SharedConfig = BTreeMap<String, RefBox>;

fn is_zero(n: &i32) -> bool {
    *n == 0
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// One route as the data plane consumes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Policy {
    pub rule: String,
    pub internal_dsl: serde_json::Value,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub upstream: String,
    pub config: PolicyExtCfg,
    /// Sorted set of domains active on this route; the data plane runs
    /// exactly these processing phases.
    pub plugins: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    /// Per-domain data errors; the data plane refuses this route only.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub err: BTreeMap<ExtKind, String>,

    // Legacy flat fields, written by the ambient extension.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub url: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rewrite_base: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rewrite_target: String,
    #[serde(skip_serializing_if = "is_false")]
    pub enable_cors: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cors_allow_headers: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cors_allow_origin: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub vhost: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub redirect_url: String,
    #[serde(skip_serializing_if = "is_zero")]
    pub redirect_code: i32,

    // Ordering keys, resolved before serialization.
    #[serde(skip)]
    pub priority: i32,
    #[serde(skip)]
    pub complexity: i64,
    /// Origin-derived dedup keys per domain, carried from the internal
    /// rule's inheritance sources. Domains absent here fall back to a
    /// content hash.
    #[serde(skip)]
    pub dedup_keys: BTreeMap<ExtKind, String>,
}

impl Policy {
    /// Recompute the sorted `plugins` list from the active slots and the
    /// surviving shared-pool references.
    pub fn refresh_plugins(&mut self) {
        let mut names: Vec<String> =
            self.config.ext.active_kinds().iter().map(|k| k.to_string()).collect();
        names.extend(self.config.refs.keys().map(|k| k.to_string()));
        names.sort();
        names.dedup();
        self.plugins = names;
    }

    pub fn record_err(&mut self, kind: ExtKind, message: impl Into<String>) {
        self.err.insert(kind, message.into());
    }
}

/// Order policies for first-match evaluation: user priority ascending, then
/// structural specificity descending, then longer match expressions first,
/// then rule name for stability.
pub fn sort_policies(policies: &mut [Policy]) {
    policies.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(b.complexity.cmp(&a.complexity))
            .then_with(|| {
                let alen = a.internal_dsl.to_string().len();
                let blen = b.internal_dsl.to_string().len();
                blen.cmp(&alen)
            })
            .then_with(|| a.rule.cmp(&b.rule))
    });
}

/// One upstream group referenced by policies through `upstream`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendGroup {
    pub name: String,
    /// "http", "tcp" or "udp"
    pub mode: String,
    pub services: Vec<BackendService>,
}

/// The complete policy document of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NgxPolicy {
    pub http: BTreeMap<u16, Vec<Policy>>,
    pub stream_tcp: BTreeMap<u16, Vec<Policy>>,
    pub stream_udp: BTreeMap<u16, Vec<Policy>>,
    pub shared_config: SharedConfig,
    pub backend_group: Vec<BackendGroup>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::timeout::TimeoutPolicy;

    fn policy(rule: &str, priority: i32, complexity: i64) -> Policy {
        Policy {
            rule: rule.to_string(),
            priority,
            complexity,
            internal_dsl: serde_json::json!(["STARTS_WITH", "URL", "/"]),
            ..Default::default()
        }
    }

    #[test]
    fn test_sort_priority_then_specificity() {
        let mut ps = vec![policy("b", 5, 100), policy("a", 5, 100), policy("c", 1, 20), policy("d", 5, 200)];
        sort_policies(&mut ps);
        let order: Vec<&str> = ps.iter().map(|p| p.rule.as_str()).collect();
        assert_eq!(order, vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn test_refresh_plugins_covers_refs_and_inline() {
        let mut p = Policy::default();
        p.config.ext.timeout = Some(TimeoutPolicy::default());
        p.config.refs.insert(ExtKind::Auth, "ft-1/auth".to_string());
        p.refresh_plugins();
        assert_eq!(p.plugins, vec!["auth".to_string(), "timeout".to_string()]);
    }

    #[test]
    fn test_extract_moves_single_slot() {
        let mut ext = PolicyExt { timeout: Some(TimeoutPolicy::default()), ..Default::default() };
        let single = ext.extract(ExtKind::Timeout);
        assert!(ext.timeout.is_none());
        assert!(single.timeout.is_some());
        assert_eq!(single.active_kinds(), vec![ExtKind::Timeout]);
    }

    #[test]
    fn test_policy_serializes_skipping_empty() {
        let p = policy("r1", 0, 0);
        let v = serde_json::to_value(&p).unwrap();
        assert!(v.get("upstream").is_none());
        assert!(v.get("redirect_url").is_none());
        assert!(v.get("err").is_none());
        assert_eq!(v["rule"], "r1");
    }
}
