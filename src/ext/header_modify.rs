//! Request/response header rewriting, configured as a single JSON
//! annotation value. Validated at ingress-sync time; variable-valued
//! entries are tokenized at internal-rule time so render paths never see
//! raw annotation text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::CompilerConfig;
use crate::types::ExtKind;
use crate::varstring::VarString;

use super::{inherit, ExtensionHooks};

/// Request-side header rewrite, CR form. The `*_var` maps hold raw
/// interpolation strings, tokenized on conversion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteRequestCr {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_var: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_add: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_add_var: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers_remove: Vec<String>,
}

impl RewriteRequestCr {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
            && self.headers_var.is_empty()
            && self.headers_add.is_empty()
            && self.headers_add_var.is_empty()
            && self.headers_remove.is_empty()
    }
}

/// Response-side header rewrite, CR form. No variable form on responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteResponseCr {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_add: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers_remove: Vec<String>,
}

impl RewriteResponseCr {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty() && self.headers_add.is_empty() && self.headers_remove.is_empty()
    }
}

/// Request-side rewrite as the data plane consumes it; variable entries
/// carry tokenized segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteRequestPolicy {
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_var: BTreeMap<String, VarString>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_add: BTreeMap<String, Vec<String>>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers_add_var: BTreeMap<String, Vec<VarString>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers_remove: Vec<String>,
}

pub type RewriteResponsePolicy = RewriteResponseCr;

pub fn to_request_policy(cr: &RewriteRequestCr) -> RewriteRequestPolicy {
    RewriteRequestPolicy {
        headers: cr.headers.clone(),
        headers_var: cr
            .headers_var
            .iter()
            .map(|(k, v)| (k.clone(), VarString::parse(v)))
            .collect(),
        headers_add: cr.headers_add.clone(),
        headers_add_var: cr
            .headers_add_var
            .iter()
            .map(|(k, vs)| (k.clone(), vs.iter().map(|v| VarString::parse(v)).collect()))
            .collect(),
        headers_remove: cr.headers_remove.clone(),
    }
}

pub fn register(cfg: &CompilerConfig) -> ExtensionHooks {
    let names = cfg.names();
    let mut hooks = ExtensionHooks::named("header_modify");

    hooks.resolve_annotation = Some(Box::new(move |rule, ctx| {
        let ann = &ctx.ingress.annotations;
        if let Some(raw) = ann.get(&names.ingress_rewrite_request()) {
            match serde_json::from_str::<RewriteRequestCr>(raw) {
                Ok(cr) if !cr.is_empty() => rule.config.rewrite_request = Some(cr),
                Ok(_) => {}
                Err(e) => {
                    warn!(ingress = %ctx.ingress.name, error = %e, "invalid rewrite-request annotation");
                }
            }
        }
        if let Some(raw) = ann.get(&names.ingress_rewrite_response()) {
            match serde_json::from_str::<RewriteResponseCr>(raw) {
                Ok(cr) if !cr.is_empty() => rule.config.rewrite_response = Some(cr),
                Ok(_) => {}
                Err(e) => {
                    warn!(ingress = %ctx.ingress.name, error = %e, "invalid rewrite-response annotation");
                }
            }
        }
    }));

    hooks.to_internal_rule = Some(Box::new(|internal, ctx| {
        if let Some((cr, source)) = inherit::resolve(ctx, |c| c.rewrite_request.as_ref()) {
            if !cr.is_empty() {
                internal.config.rewrite_request = Some(to_request_policy(cr));
                internal.config.source.insert(ExtKind::RewriteRequest, source);
            }
        }
        if let Some((cr, source)) = inherit::resolve(ctx, |c| c.rewrite_response.as_ref()) {
            if !cr.is_empty() {
                internal.config.rewrite_response = Some(cr.clone());
                internal.config.source.insert(ExtKind::RewriteResponse, source);
            }
        }
    }));

    hooks.to_policy = Some(Box::new(|policy, internal, _ctx| {
        if let Some(req) = &internal.config.rewrite_request {
            policy.config.ext.rewrite_request = Some(req.clone());
        }
        if let Some(resp) = &internal.config.rewrite_response {
            policy.config.ext.rewrite_response = Some(resp.clone());
        }
    }));

    hooks
}
