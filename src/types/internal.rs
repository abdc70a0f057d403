//! Mid-pipeline route representation: one [`InternalRule`] per route, owned
//! by a single pass, carrying resolved per-domain config plus the record
//! each domain's value came from.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ext::auth::AuthCr;
use crate::ext::header_modify::{RewriteRequestPolicy, RewriteResponsePolicy};
use crate::ext::otel::OtelCr;
use crate::ext::redirect::RedirectCr;
use crate::ext::timeout::TimeoutCr;
use crate::ext::waf::WafCr;

use super::{BackendService, Dslx, RuleCtx, Source};

/// One configuration domain handled by the extension pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtKind {
    Auth,
    Redirect,
    Timeout,
    Waf,
    Otel,
    RewriteRequest,
    RewriteResponse,
}

impl ExtKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtKind::Auth => "auth",
            ExtKind::Redirect => "redirect",
            ExtKind::Timeout => "timeout",
            ExtKind::Waf => "waf",
            ExtKind::Otel => "otel",
            ExtKind::RewriteRequest => "rewrite_request",
            ExtKind::RewriteResponse => "rewrite_response",
        }
    }

    /// Whether identical configs of this domain may collapse into one
    /// shared-pool entry. Redirect configs are rarely identical across
    /// routes, so sharing them buys nothing.
    pub fn mergeable(&self) -> bool {
        !matches!(self, ExtKind::Redirect)
    }
}

impl fmt::Display for ExtKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which level of the inheritance chain supplied a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CfgLevel {
    Rule,
    Frontend,
    Alb,
}

/// The record a domain's effective config came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSource {
    pub level: CfgLevel,
    pub name: String,
}

impl ConfigSource {
    pub fn new(level: CfgLevel, name: impl Into<String>) -> Self {
        Self { level, name: name.into() }
    }

    /// Shared-pool key for a config with a known inheritance origin.
    pub fn dedup_key(&self, kind: ExtKind) -> String {
        format!("{}/{}", self.name, kind)
    }
}

/// Resolved per-domain config of one route, one slot per domain, plus the
/// origin record per populated slot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtBag {
    pub auth: Option<AuthCr>,
    pub redirect: Option<RedirectCr>,
    pub timeout: Option<TimeoutCr>,
    pub waf: Option<WafCr>,
    pub otel: Option<OtelCr>,
    pub rewrite_request: Option<RewriteRequestPolicy>,
    pub rewrite_response: Option<RewriteResponsePolicy>,
    pub source: BTreeMap<ExtKind, ConfigSource>,
}

impl ExtBag {
    pub fn source_of(&self, kind: ExtKind) -> Option<&ConfigSource> {
        self.source.get(&kind)
    }
}

/// Legacy flat rule fields carried through for the ambient extension.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegacyFields {
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

/// Canonical mid-pipeline representation of one route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InternalRule {
    pub rule_id: String,
    pub priority: i32,
    pub dslx: Dslx,
    pub services: Vec<BackendService>,
    pub backend_protocol: String,
    pub source: Option<Source>,
    pub config: ExtBag,
    pub legacy: LegacyFields,
}

impl InternalRule {
    /// Copy the non-extension fields from a rule; extension hooks populate
    /// `config` afterwards.
    pub fn from_ctx(ctx: &RuleCtx<'_>) -> Self {
        let rule = ctx.rule;
        Self {
            rule_id: rule.name.clone(),
            priority: rule.priority,
            dslx: rule.dslx.clone(),
            services: rule.services.clone(),
            backend_protocol: rule.backend_protocol.clone(),
            source: rule.source.clone(),
            config: ExtBag::default(),
            legacy: LegacyFields {
                redirect_url: rule.redirect_url.clone(),
                redirect_code: rule.redirect_code,
                url: rule.url.clone(),
                rewrite_base: rule.rewrite_base.clone(),
                rewrite_target: rule.rewrite_target.clone(),
                enable_cors: rule.enable_cors,
                cors_allow_headers: rule.cors_allow_headers.clone(),
                cors_allow_origin: rule.cors_allow_origin.clone(),
                vhost: rule.vhost.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedup_key_format() {
        let src = ConfigSource::new(CfgLevel::Frontend, "ft-http-80");
        assert_eq!(src.dedup_key(ExtKind::Auth), "ft-http-80/auth");
        assert_eq!(src.dedup_key(ExtKind::RewriteRequest), "ft-http-80/rewrite_request");
    }

    #[test]
    fn test_mergeable_flags() {
        assert!(ExtKind::Auth.mergeable());
        assert!(ExtKind::Timeout.mergeable());
        assert!(ExtKind::Otel.mergeable());
        assert!(!ExtKind::Redirect.mergeable());
    }
}
