//! Upstream timeout configuration. One of the few domains resolvable on
//! both L7 and stream (TCP) listeners.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotations::{self, FieldSpec, ResolveAnnotations};
use crate::config::CompilerConfig;
use crate::errors::RouteError;
use crate::types::{Alb, ExtKind, Frontend, FtProtocol, Policy};

use super::{inherit, ExtensionHooks};

/// CR-level timeout config. Values are duration strings: whole seconds
/// (`30`, `30s`) or explicit milliseconds (`500ms`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutCr {
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proxy_connect_timeout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proxy_send_timeout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub proxy_read_timeout: String,
}

impl TimeoutCr {
    pub fn is_empty(&self) -> bool {
        self.proxy_connect_timeout.is_empty()
            && self.proxy_send_timeout.is_empty()
            && self.proxy_read_timeout.is_empty()
    }
}

impl ResolveAnnotations for TimeoutCr {
    fn fields() -> &'static [FieldSpec<Self>] {
        &[
            FieldSpec {
                suffix: "proxy-connect-timeout",
                default: "",
                set: |t, v| t.proxy_connect_timeout = v,
            },
            FieldSpec {
                suffix: "proxy-send-timeout",
                default: "",
                set: |t, v| t.proxy_send_timeout = v,
            },
            FieldSpec {
                suffix: "proxy-read-timeout",
                default: "",
                set: |t, v| t.proxy_read_timeout = v,
            },
        ]
    }
}

/// Resolved timeout values in milliseconds, as the data plane applies them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutPolicy {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_connect_timeout_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_send_timeout_ms: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_read_timeout_ms: Option<u32>,
}

/// Parse a duration string into milliseconds. Bare numbers and an `s`
/// suffix mean seconds; `ms` means milliseconds. Anything above
/// `u32::MAX` ms is rejected.
pub fn parse_duration_ms(value: &str) -> Result<u32, RouteError> {
    let value = value.trim();
    let (digits, unit_ms) = if let Some(rest) = value.strip_suffix("ms") {
        (rest, 1u64)
    } else if let Some(rest) = value.strip_suffix('s') {
        (rest, 1000u64)
    } else {
        (value, 1000u64)
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RouteError::InvalidDuration {
            value: value.to_string(),
            reason: "expected digits with optional s/ms suffix".to_string(),
        });
    }
    let n: u64 = digits.parse().map_err(|_| RouteError::InvalidDuration {
        value: value.to_string(),
        reason: "number out of range".to_string(),
    })?;
    let ms = n.checked_mul(unit_ms).ok_or(RouteError::DurationOverflow {
        got: u64::MAX,
        max: u32::MAX as u64,
    })?;
    if ms > u32::MAX as u64 {
        return Err(RouteError::DurationOverflow { got: ms, max: u32::MAX as u64 });
    }
    Ok(ms as u32)
}

fn to_policy(cr: &TimeoutCr) -> Result<TimeoutPolicy, RouteError> {
    let mut policy = TimeoutPolicy::default();
    if !cr.proxy_connect_timeout.is_empty() {
        policy.proxy_connect_timeout_ms = Some(parse_duration_ms(&cr.proxy_connect_timeout)?);
    }
    if !cr.proxy_send_timeout.is_empty() {
        policy.proxy_send_timeout_ms = Some(parse_duration_ms(&cr.proxy_send_timeout)?);
    }
    if !cr.proxy_read_timeout.is_empty() {
        policy.proxy_read_timeout_ms = Some(parse_duration_ms(&cr.proxy_read_timeout)?);
    }
    Ok(policy)
}

/// Frontend-or-ALB timeout for listener default policies.
fn listener_timeout(ft: &Frontend, alb: &Alb) -> Option<TimeoutCr> {
    ft.config.timeout.clone().or_else(|| alb.config.ext.timeout.clone()).filter(|t| !t.is_empty())
}

fn attach_default(policies: &mut [Policy], ft: &Frontend, alb: &Alb) {
    let Some(cr) = listener_timeout(ft, alb) else {
        return;
    };
    match to_policy(&cr) {
        Ok(resolved) => {
            for policy in policies.iter_mut() {
                if policy.config.ext.timeout.is_none() {
                    policy.config.ext.timeout = Some(resolved.clone());
                }
            }
        }
        Err(e) => {
            for policy in policies.iter_mut() {
                policy.record_err(ExtKind::Timeout, e.to_string());
            }
        }
    }
}

pub fn register(_cfg: &CompilerConfig) -> ExtensionHooks {
    let mut hooks = ExtensionHooks::named("timeout");

    hooks.resolve_annotation = Some(Box::new(|rule, ctx| {
        let (cr, matched) = annotations::resolve::<TimeoutCr>(&ctx.ingress.annotations, ctx.prefixes);
        if matched && !cr.is_empty() {
            rule.config.timeout = Some(cr);
        }
    }));

    hooks.to_internal_rule = Some(Box::new(|internal, ctx| {
        // TCP-only on stream listeners; UDP has no connection to time out.
        if ctx.ft.protocol == FtProtocol::Udp {
            return;
        }
        if let Some((cr, source)) = inherit::resolve(ctx, |c| c.timeout.as_ref()) {
            if !cr.is_empty() {
                internal.config.timeout = Some(cr.clone());
                internal.config.source.insert(ExtKind::Timeout, source);
            }
        }
    }));

    hooks.to_policy = Some(Box::new(|policy, internal, _ctx| {
        let Some(cr) = &internal.config.timeout else {
            return;
        };
        match to_policy(cr) {
            Ok(resolved) => policy.config.ext.timeout = Some(resolved),
            Err(e) => {
                debug!(rule = %internal.rule_id, error = %e, "invalid timeout config");
                policy.record_err(ExtKind::Timeout, e.to_string());
            }
        }
    }));

    hooks.default_policy = Some(Box::new(|policies, ft, alb| attach_default(policies, ft, alb)));
    hooks.default_policy_stream = Some(Box::new(|policies, ft, alb| {
        if ft.protocol == FtProtocol::Tcp {
            attach_default(policies, ft, alb);
        }
    }));

    hooks
}
