//! Authentication: basic auth (htpasswd secrets) and forward auth
//! (external auth endpoint), both driven by the same annotation namespace.
//!
//! When an operator configures both on one route, basic wins and forward
//! is discarded; that ambiguity is logged as a warning, never an error.

pub mod basic;
pub mod forward;

pub use basic::{BasicAuthCr, BasicAuthPolicy, HashedCredential};
pub use forward::{ForwardAuthCr, ForwardAuthPolicy};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::annotations;
use crate::config::CompilerConfig;
use crate::errors::RouteError;
use crate::types::{ExtKind, ObjectKey};

use super::{inherit, ExtensionHooks};

/// CR-level auth config: at most one variant is effective per route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthCr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicAuthCr>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardAuthCr>,
}

impl AuthCr {
    pub fn is_empty(&self) -> bool {
        self.basic.is_none() && self.forward.is_none()
    }

    /// Drop the losing variant when both are configured: basic wins.
    fn disambiguate(&mut self, context: &str) {
        if self.basic.is_some() && self.forward.is_some() {
            warn!(context, "both basic and forward auth configured, using basic");
            self.forward = None;
        }
    }
}

/// Resolved auth as the data plane consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic: Option<BasicAuthPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub forward: Option<ForwardAuthPolicy>,
}

pub fn register(_cfg: &CompilerConfig) -> ExtensionHooks {
    let mut hooks = ExtensionHooks::named("auth");

    hooks.resolve_annotation = Some(Box::new(|rule, ctx| {
        let ann = &ctx.ingress.annotations;
        let (basic, _) = annotations::resolve::<BasicAuthCr>(ann, ctx.prefixes);
        let (forward, _) = annotations::resolve::<ForwardAuthCr>(ann, ctx.prefixes);

        let mut cr = AuthCr {
            basic: Some(basic).filter(BasicAuthCr::is_active),
            forward: Some(forward).filter(ForwardAuthCr::is_active),
        };
        if cr.is_empty() {
            return;
        }
        cr.disambiguate(&ctx.ingress.name);
        rule.config.auth = Some(cr);
    }));

    hooks.to_internal_rule = Some(Box::new(|internal, ctx| {
        if let Some((cr, source)) = inherit::resolve(ctx, |c| c.auth.as_ref()) {
            if cr.is_empty() {
                return;
            }
            let mut cr = cr.clone();
            cr.disambiguate(&internal.rule_id);
            internal.config.auth = Some(cr);
            internal.config.source.insert(ExtKind::Auth, source);
        }
    }));

    hooks.collect_refs = Some(Box::new(|refs, internal| {
        let Some(cr) = &internal.config.auth else {
            return;
        };
        if let Some(basic) = &cr.basic {
            if let Ok(key) = basic.secret.parse::<ObjectKey>() {
                refs.secrets.insert(key);
            }
        }
        if let Some(fwd) = &cr.forward {
            if !fwd.auth_headers_cm_ref.is_empty() {
                if let Ok(key) = fwd.auth_headers_cm_ref.parse::<ObjectKey>() {
                    refs.config_maps.insert(key);
                }
            }
        }
    }));

    hooks.to_policy = Some(Box::new(|policy, internal, ctx| {
        let Some(cr) = &internal.config.auth else {
            return;
        };
        let mut resolved = AuthPolicy::default();

        if let Some(basic_cr) = &cr.basic {
            match resolve_basic(basic_cr, ctx.refs) {
                Ok(parsed) => resolved.basic = Some(parsed),
                Err(e) => {
                    policy.record_err(ExtKind::Auth, e.to_string());
                    return;
                }
            }
        } else if let Some(forward_cr) = &cr.forward {
            resolved.forward = Some(forward::to_policy(forward_cr, ctx.refs));
        }

        if resolved.basic.is_some() || resolved.forward.is_some() {
            policy.config.ext.auth = Some(resolved);
        }
    }));

    hooks
}

fn resolve_basic(
    cr: &BasicAuthCr,
    refs: &crate::types::RefMap,
) -> Result<BasicAuthPolicy, RouteError> {
    let key: ObjectKey = cr.secret.parse()?;
    let secret = refs.secrets.get(&key).ok_or(RouteError::SecretNotFound)?;
    basic::parse_secret(cr, &key, secret)
}
