//! Forward auth: delegate the auth decision to an external endpoint.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::annotations::{FieldSpec, ResolveAnnotations};
use crate::types::{ObjectKey, RefMap};
use crate::varstring::VarString;

/// CR-level forward-auth config, string-typed as annotations deliver it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardAuthCr {
    pub url: String,
    pub method: String,
    /// `ns/name` of a configmap whose entries become auth-request headers
    pub auth_headers_cm_ref: String,
    /// Comma-separated headers copied from the auth response upstream
    pub upstream_headers: String,
    pub signin: String,
    pub signin_redirect_param: String,
    pub redirect: String,
    pub always_set_cookie: String,
}

impl ForwardAuthCr {
    pub fn is_active(&self) -> bool {
        !self.url.is_empty()
    }
}

impl ResolveAnnotations for ForwardAuthCr {
    fn fields() -> &'static [FieldSpec<Self>] {
        &[
            FieldSpec { suffix: "auth-url", default: "", set: |t, v| t.url = v },
            FieldSpec { suffix: "auth-method", default: "GET", set: |t, v| t.method = v },
            FieldSpec {
                suffix: "auth-proxy-set-headers",
                default: "",
                set: |t, v| t.auth_headers_cm_ref = v,
            },
            FieldSpec {
                suffix: "auth-response-headers",
                default: "",
                set: |t, v| t.upstream_headers = v,
            },
            FieldSpec { suffix: "auth-signin", default: "", set: |t, v| t.signin = v },
            FieldSpec {
                suffix: "auth-signin-redirect-param",
                default: "rd",
                set: |t, v| t.signin_redirect_param = v,
            },
            FieldSpec { suffix: "auth-request-redirect", default: "", set: |t, v| t.redirect = v },
            FieldSpec {
                suffix: "auth-always-set-cookie",
                default: "false",
                set: |t, v| t.always_set_cookie = v,
            },
        ]
    }
}

/// Resolved forward-auth as the data plane consumes it. User-supplied
/// values are tokenized so literals stay literal at render time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardAuthPolicy {
    pub url: VarString,
    pub method: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub auth_headers: BTreeMap<String, VarString>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub upstream_headers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signin: Option<VarString>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect: Option<VarString>,
    pub always_set_cookie: bool,
    /// Set when the auth-headers configmap reference did not resolve; the
    /// route keeps working without the extra headers.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub invalid_auth_req_cm_ref: bool,
}

/// Append the return-destination parameter to a signin URL that lacks one.
fn signin_with_redirect_param(signin: &str, param: &str) -> String {
    if signin.contains(&format!("{}=", param)) {
        return signin.to_string();
    }
    let sep = if signin.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}=$pass_access_scheme://$http_host$escaped_request_uri",
        signin, sep, param
    )
}

/// Convert the CR form, resolving the optional auth-headers configmap.
pub fn to_policy(cr: &ForwardAuthCr, refs: &RefMap) -> ForwardAuthPolicy {
    let mut policy = ForwardAuthPolicy {
        url: VarString::parse(&cr.url),
        method: if cr.method.is_empty() { "GET".to_string() } else { cr.method.clone() },
        upstream_headers: cr
            .upstream_headers
            .split(',')
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string)
            .collect(),
        always_set_cookie: cr.always_set_cookie == "true",
        ..Default::default()
    };

    if !cr.signin.is_empty() {
        let param =
            if cr.signin_redirect_param.is_empty() { "rd" } else { &cr.signin_redirect_param };
        policy.signin = Some(VarString::parse(&signin_with_redirect_param(&cr.signin, param)));
    }
    if !cr.redirect.is_empty() {
        policy.redirect = Some(VarString::parse(&cr.redirect));
    }

    if !cr.auth_headers_cm_ref.is_empty() {
        match cr.auth_headers_cm_ref.parse::<ObjectKey>() {
            Ok(key) => match refs.config_maps.get(&key) {
                Some(cm) => {
                    policy.auth_headers = cm
                        .data
                        .iter()
                        .map(|(k, v)| (k.clone(), VarString::parse(v)))
                        .collect();
                }
                None => policy.invalid_auth_req_cm_ref = true,
            },
            Err(_) => policy.invalid_auth_req_cm_ref = true,
        }
    }

    policy
}
