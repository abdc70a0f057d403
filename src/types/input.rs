//! Input records: the ALB instance, its frontends and rules, and the
//! ingress-style origin resources whose annotations synthesize rule config.

use serde::{Deserialize, Serialize};

use crate::annotations::Annotations;
use crate::ext::auth::AuthCr;
use crate::ext::header_modify::{RewriteRequestCr, RewriteResponseCr};
use crate::ext::keepalive::KeepAliveCr;
use crate::ext::otel::OtelCr;
use crate::ext::redirect::RedirectCr;
use crate::ext::timeout::TimeoutCr;
use crate::ext::waf::WafCr;

use super::{Dslx, FtProtocol, Source};

/// Per-domain configuration block, attachable at rule, frontend or ALB
/// level. Absent slots fall through the inheritance chain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtCr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthCr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<RedirectCr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutCr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keepalive: Option<KeepAliveCr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waf: Option<WafCr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otel: Option<OtelCr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_request: Option<RewriteRequestCr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rewrite_response: Option<RewriteResponseCr>,
}

/// One weighted backend target of a rule or frontend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendService {
    pub name: String,
    pub namespace: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: i32,
}

fn default_weight() -> i32 {
    100
}

/// One match-and-forward unit under a frontend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rule {
    pub name: String,
    pub priority: i32,
    pub dslx: Dslx,
    pub services: Vec<BackendService>,
    pub config: ExtCr,
    /// Originating ingress-style resource, when synthesized from one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    pub backend_protocol: String,

    // Legacy flat fields, kept for compatibility with older authored rules.
    // The ambient extension copies them into the policy; redirect merges
    // redirect_url/redirect_code over the structured config.
    pub redirect_url: String,
    pub redirect_code: i32,
    pub url: String,
    pub rewrite_base: String,
    pub rewrite_target: String,
    pub enable_cors: bool,
    pub cors_allow_headers: String,
    pub cors_allow_origin: String,
    pub vhost: String,
}

/// A bound port+protocol on the load balancer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frontend {
    pub name: String,
    pub port: u16,
    pub protocol: FtProtocol,
    /// `ns/name` of the default TLS certificate secret, empty when none
    pub certificate_name: String,
    pub backend_protocol: String,
    /// Default backend, used when no rule matches
    pub services: Vec<BackendService>,
    pub config: ExtCr,
    pub rules: Vec<Rule>,
}

impl Frontend {
    pub fn has_default_backend(&self) -> bool {
        !self.services.is_empty()
    }

    /// Backend-group name for the frontend's own default backend.
    pub fn default_group_name(&self) -> String {
        format!("{}-{}", self.name, self.port)
    }
}

/// The load-balancer instance record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Alb {
    pub name: String,
    pub config: AlbConfig,
    pub frontends: Vec<Frontend>,
}

/// Instance-level configuration, inherited by every frontend and rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlbConfig {
    pub ext: ExtCr,
    /// Synthesize an ssl-redirect on the designated HTTP port
    pub ingress_ssl_redirect: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_http_port: Option<u16>,
}

/// Borrowed view of one rule with its owning frontend and ALB, the unit the
/// inheritance chain walks.
#[derive(Debug, Clone, Copy)]
pub struct RuleCtx<'a> {
    pub rule: &'a Rule,
    pub ft: &'a Frontend,
    pub alb: &'a Alb,
}

impl<'a> RuleCtx<'a> {
    pub fn new(rule: &'a Rule, ft: &'a Frontend, alb: &'a Alb) -> Self {
        Self { rule, ft, alb }
    }
}

/// Ingress-style origin resource: host/path routing plus the annotation map
/// that drives synthesized rule configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Ingress {
    pub namespace: String,
    pub name: String,
    pub annotations: Annotations,
    pub rules: Vec<IngressHttpRule>,
    pub tls: Vec<IngressTls>,
}

impl Ingress {
    /// Whether any TLS block covers the given host (exact or wildcard).
    pub fn tls_covers(&self, host: &str) -> bool {
        self.tls.iter().any(|t| {
            t.hosts.iter().any(|h| {
                h == host
                    || h.strip_prefix("*.")
                        .map(|suffix| {
                            host.split_once('.').map(|(_, rest)| rest == suffix).unwrap_or(false)
                        })
                        .unwrap_or(false)
            })
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressHttpRule {
    pub host: String,
    pub paths: Vec<IngressPath>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngressPath {
    pub path: String,
    #[serde(default)]
    pub path_type: PathType,
    pub service: BackendService,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PathType {
    Prefix,
    Exact,
    #[default]
    ImplementationSpecific,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngressTls {
    pub hosts: Vec<String>,
    pub secret_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_deserializes_with_defaults() {
        let rule: Rule = serde_json::from_str(r#"{"name": "r1", "priority": 5}"#).unwrap();
        assert_eq!(rule.name, "r1");
        assert_eq!(rule.priority, 5);
        assert!(rule.dslx.is_empty());
        assert!(rule.config.auth.is_none());
        assert_eq!(rule.redirect_code, 0);
    }

    #[test]
    fn test_tls_host_coverage() {
        let ing = Ingress {
            tls: vec![IngressTls {
                hosts: vec!["a.example.com".into(), "*.wild.io".into()],
                secret_name: "ns/cert".into(),
            }],
            ..Default::default()
        };
        assert!(ing.tls_covers("a.example.com"));
        assert!(ing.tls_covers("x.wild.io"));
        assert!(!ing.tls_covers("wild.io"));
        assert!(!ing.tls_covers("b.example.com"));
    }
}
