//! Redirect configuration, including ssl-redirect synthesis from ingress
//! annotations and the ALB-level ssl-redirect switch.
//!
//! Flagged non-mergeable in dedup: redirect configs are rarely identical
//! across routes, so pooling them buys nothing.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotations;
use crate::config::CompilerConfig;
use crate::types::{Alb, Dslx, ExtKind, Frontend, FtProtocol, Policy, PolicyExtCfg};

use super::{inherit, ExtensionHooks, IngressSynthCtx};

const SSL_REDIRECT_CODE: i32 = 308;
const PERMANENT_REDIRECT_CODE: i32 = 301;
const TEMPORAL_REDIRECT_CODE: i32 = 302;

/// Priority of synthetic default redirect rules; below any user rule.
const MATCH_FIRST_PRIORITY: i32 = -1;

/// CR-level redirect config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectCr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_prefix: Option<String>,
}

impl RedirectCr {
    pub fn is_empty(&self) -> bool {
        self.url.is_none()
            && self.scheme.is_none()
            && self.host.is_none()
            && self.port.is_none()
            && self.prefix_match.is_none()
            && self.replace_prefix.is_none()
    }

    fn ssl() -> Self {
        Self {
            scheme: Some("https".to_string()),
            code: Some(SSL_REDIRECT_CODE),
            ..Default::default()
        }
    }
}

/// The resolved form the data plane applies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedirectPolicy {
    pub code: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix_match: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replace_prefix: Option<String>,
}

/// Synthesize a redirect config from ingress annotations for one path.
/// `ssl-redirect` only applies when a TLS block covers the host;
/// `force-ssl-redirect` applies regardless.
fn from_annotations(ctx: &IngressSynthCtx<'_>) -> Option<RedirectCr> {
    let ann = &ctx.ingress.annotations;
    let get = |suffix: &str| annotations::get(ann, ctx.prefixes, suffix);

    let mut cr: Option<RedirectCr> = None;

    let ssl = get("ssl-redirect") == Some("true") && ctx.ingress.tls_covers(ctx.host);
    let force_ssl = get("force-ssl-redirect") == Some("true");
    if ssl || force_ssl {
        cr = Some(RedirectCr::ssl());
    }

    if let Some(url) = get("permanent-redirect").filter(|u| !u.is_empty()) {
        let code = get("permanent-redirect-code")
            .and_then(|c| c.parse().ok())
            .unwrap_or(PERMANENT_REDIRECT_CODE);
        let target = cr.get_or_insert_with(Default::default);
        target.url = Some(url.to_string());
        target.code = Some(code);
    } else if let Some(url) = get("temporal-redirect").filter(|u| !u.is_empty()) {
        let target = cr.get_or_insert_with(Default::default);
        target.url = Some(url.to_string());
        target.code = Some(TEMPORAL_REDIRECT_CODE);
    }

    cr
}

/// An ssl-redirect on an HTTPS listener whose only effect would be a
/// same-scheme no-op is suppressed.
fn is_noop(cr: &RedirectCr, protocol: FtProtocol) -> bool {
    protocol == FtProtocol::Https
        && cr.scheme.as_deref() == Some("https")
        && cr.url.is_none()
        && cr.host.is_none()
        && cr.prefix_match.is_none()
        && cr.replace_prefix.is_none()
        && cr.port.is_none()
}

fn to_policy(cr: &RedirectCr) -> RedirectPolicy {
    RedirectPolicy {
        code: cr.code.unwrap_or(PERMANENT_REDIRECT_CODE),
        url: cr.url.clone(),
        scheme: cr.scheme.clone(),
        host: cr.host.clone(),
        port: cr.port,
        prefix_match: cr.prefix_match.clone(),
        replace_prefix: cr.replace_prefix.clone(),
    }
}

fn default_redirect_policy(name: String, cr: &RedirectCr) -> Policy {
    let dsl = Dslx::match_all();
    let mut policy = Policy {
        rule: name,
        priority: MATCH_FIRST_PRIORITY,
        complexity: dsl.complexity(),
        internal_dsl: dsl.to_internal(),
        config: PolicyExtCfg::default(),
        ..Default::default()
    };
    policy.config.ext.redirect = Some(to_policy(cr));
    policy.refresh_plugins();
    policy
}

/// Redirect config the listener itself carries: its own CR config, the
/// ALB's, or one synthesized by the instance-level ssl-redirect switch.
fn listener_redirect(ft: &Frontend, alb: &Alb) -> Option<RedirectCr> {
    if let Some(cr) = ft.config.redirect.clone().or_else(|| alb.config.ext.redirect.clone()) {
        if !cr.is_empty() {
            return Some(cr);
        }
    }
    let http_port = alb.config.ingress_http_port.unwrap_or(80);
    if alb.config.ingress_ssl_redirect && ft.protocol == FtProtocol::Http && ft.port == http_port {
        return Some(RedirectCr::ssl());
    }
    None
}

pub fn register(_cfg: &CompilerConfig) -> ExtensionHooks {
    let mut hooks = ExtensionHooks::named("redirect");

    hooks.resolve_annotation = Some(Box::new(|rule, ctx| {
        if let Some(cr) = from_annotations(ctx) {
            rule.config.redirect = Some(cr);
        }
    }));

    hooks.to_internal_rule = Some(Box::new(|internal, ctx| {
        let inherited = inherit::resolve(ctx, |c| c.redirect.as_ref());
        let mut cr = inherited.as_ref().map(|(v, _)| (*v).clone());

        // Legacy flat rule fields override the structured config when set.
        let rule = ctx.rule;
        if !rule.redirect_url.is_empty() {
            let target = cr.get_or_insert_with(Default::default);
            target.url = Some(rule.redirect_url.clone());
            if rule.redirect_code != 0 {
                target.code = Some(rule.redirect_code);
            }
        }

        if let Some(cr) = cr.filter(|c| !c.is_empty()) {
            internal.config.redirect = Some(cr);
            if let Some((_, source)) = inherited {
                internal.config.source.insert(ExtKind::Redirect, source);
            }
        }
    }));

    hooks.to_policy = Some(Box::new(|policy, internal, ctx| {
        let Some(cr) = &internal.config.redirect else {
            return;
        };
        if is_noop(cr, ctx.ft.protocol) {
            debug!(rule = %internal.rule_id, "suppressing no-op ssl redirect on https listener");
            return;
        }
        policy.config.ext.redirect = Some(to_policy(cr));
    }));

    hooks.default_policy = Some(Box::new(|policies, ft, alb| {
        let Some(cr) = listener_redirect(ft, alb) else {
            return;
        };
        if is_noop(&cr, ft.protocol) {
            return;
        }
        if ft.has_default_backend() {
            // The default backend keeps serving; the redirect only applies
            // where a rule carries it.
            return;
        }
        policies.push(default_redirect_policy(format!("{}-default-redirect", ft.name), &cr));
    }));

    hooks
}
