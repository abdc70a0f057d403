//! Distributed-tracing (OpenTelemetry) configuration. Pool identity is by
//! content hash, and the pooled form gets one post-dedup pass that
//! validates and normalizes the collector address.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::annotations;
use crate::config::CompilerConfig;
use crate::types::SharedConfig;

use super::{inherit, ExtensionHooks};

/// CR-level tracing config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelCr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    /// Collector endpoint, e.g. "http://otel-collector:4318"
    #[serde(skip_serializing_if = "String::is_empty")]
    pub address: String,
    /// Sampler name, e.g. "always_on", "parent_base"
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sampler: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_incoming_span: Option<bool>,
}

impl OtelCr {
    fn enabled(&self) -> bool {
        self.enable.unwrap_or(true) && !self.address.is_empty()
    }
}

/// The resolved form the data plane consumes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OtelPolicy {
    pub address: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub sampler: String,
    pub trust_incoming_span: bool,
}

/// Validate the collector address and bracket bare IPv6 hosts. Addresses
/// that do not parse as URLs are left alone, with a warning; the data
/// plane reports them per-request.
pub fn normalize_address(address: &str) -> String {
    let candidate = if address.contains("://") {
        address.to_string()
    } else if address.matches(':').count() > 1 && !address.starts_with('[') {
        // Bare IPv6 literal: bracket before URL parsing. With no brackets
        // in the input there is no way to tell a trailing port apart from
        // the last hextet, so the whole literal is the host.
        format!("http://[{}]", address)
    } else {
        format!("http://{}", address)
    };
    match url::Url::parse(&candidate) {
        Ok(parsed) if parsed.host_str().is_some() => {
            let mut out = format!(
                "{}://{}",
                parsed.scheme(),
                parsed.host_str().unwrap_or_default()
            );
            if let Some(port) = parsed.port() {
                out.push(':');
                out.push_str(&port.to_string());
            }
            if parsed.path() != "/" {
                out.push_str(parsed.path());
            }
            out
        }
        _ => {
            warn!(address, "collector address does not parse as a URL, leaving as-is");
            address.to_string()
        }
    }
}

pub fn register(cfg: &CompilerConfig) -> ExtensionHooks {
    let names = cfg.names();
    let mut hooks = ExtensionHooks::named("otel");

    hooks.resolve_annotation = Some(Box::new(move |rule, ctx| {
        let ann = &ctx.ingress.annotations;
        let mut cr: Option<OtelCr> = None;

        if let Some(raw) = ann.get(&names.ingress_otel()) {
            match serde_json::from_str::<OtelCr>(raw) {
                Ok(parsed) => cr = Some(parsed),
                Err(e) => {
                    warn!(ingress = %ctx.ingress.name, error = %e, "invalid otel annotation");
                }
            }
        }
        if let Some(v) = annotations::get(ann, ctx.prefixes, "enable-opentelemetry") {
            cr.get_or_insert_with(Default::default).enable = Some(v == "true");
        }
        if let Some(v) = annotations::get(ann, ctx.prefixes, "opentelemetry-trust-incoming-spans")
        {
            cr.get_or_insert_with(Default::default).trust_incoming_span = Some(v == "true");
        }

        if let Some(cr) = cr {
            rule.config.otel = Some(cr);
        }
    }));

    hooks.to_internal_rule = Some(Box::new(|internal, ctx| {
        // No source recording: pool identity for tracing config is the
        // content hash, so listeners sharing one collector collapse.
        if let Some((cr, _)) = inherit::resolve(ctx, |c| c.otel.as_ref()) {
            internal.config.otel = Some(cr.clone());
        }
    }));

    hooks.to_policy = Some(Box::new(|policy, internal, _ctx| {
        let Some(cr) = &internal.config.otel else {
            return;
        };
        if !cr.enabled() {
            return;
        }
        policy.config.ext.otel = Some(OtelPolicy {
            address: cr.address.clone(),
            sampler: cr.sampler.clone(),
            trust_incoming_span: cr.trust_incoming_span.unwrap_or(false),
        });
    }));

    hooks.post_dedup = Some(Box::new(|shared: &mut SharedConfig| {
        for entry in shared.values_mut() {
            if let Some(otel) = entry.ext.otel.as_mut() {
                otel.address = normalize_address(&otel.address);
            }
        }
    }));

    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExtKind, RefBox};

    #[test]
    fn test_normalize_plain_host() {
        assert_eq!(normalize_address("otel-collector:4318"), "http://otel-collector:4318");
        assert_eq!(
            normalize_address("http://otel-collector:4318/v1/traces"),
            "http://otel-collector:4318/v1/traces"
        );
    }

    #[test]
    fn test_normalize_brackets_ipv6() {
        assert_eq!(normalize_address("fd00::12:4318"), "http://[fd00::12:4318]");
        assert_eq!(normalize_address("http://[fd00::12]:4318"), "http://[fd00::12]:4318");
    }

    #[test]
    fn test_normalize_leaves_garbage() {
        assert_eq!(normalize_address("://"), "://");
    }

    #[test]
    fn test_disabled_or_addressless_config_is_inert() {
        assert!(!OtelCr { enable: Some(false), address: "x:1".into(), ..Default::default() }
            .enabled());
        assert!(!OtelCr::default().enabled());
        assert!(OtelCr { address: "x:1".into(), ..Default::default() }.enabled());
    }

    #[test]
    fn test_post_dedup_normalizes_pool_entries() {
        let mut shared = SharedConfig::new();
        let mut ext = crate::types::PolicyExt::default();
        ext.otel = Some(OtelPolicy {
            address: "collector:4318".into(),
            sampler: "always_on".into(),
            trust_incoming_span: false,
        });
        shared.insert("abc123".into(), RefBox { kind: ExtKind::Otel, ext });

        let hooks = register(&CompilerConfig::default());
        (hooks.post_dedup.unwrap())(&mut shared);
        assert_eq!(
            shared["abc123"].ext.otel.as_ref().unwrap().address,
            "http://collector:4318"
        );
    }
}
