//! # Compiler Configuration
//!
//! Settings for one compiler instance: the cluster domain that scopes our
//! annotation namespaces, nginx tuning parameters, and the tweak directory
//! holding operator-supplied config snippets.
//!
//! The annotation namespace list is built here and threaded explicitly
//! through every call site; there is no process-wide mutable prefix list.

use serde::{Deserialize, Serialize};

use crate::Result;

/// The community ingress annotation namespace we stay compatible with.
pub const LEGACY_ANNOTATION_NAMESPACE: &str = "nginx.ingress.kubernetes.io";

/// Compiler instance configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Cluster domain scoping product annotation namespaces, e.g. "cpaas.io"
    pub domain: String,
    /// Directory with operator tweak files (bind_nic.json, *_extra snippets).
    /// Empty string disables tweak loading.
    pub tweak_dir: String,
    /// Nginx tuning parameters rendered into the config text
    pub nginx: NginxSettings,
}

/// Nginx tuning knobs carried verbatim into the render model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NginxSettings {
    pub enable_http2: bool,
    pub enable_ipv6: bool,
    pub enable_prometheus: bool,
    pub metrics_port: u16,
    /// "auto" or an explicit worker count
    pub cpu_num: String,
    pub backlog: u32,
    pub enable_gzip: bool,
    pub gzip_level: u32,
    pub gzip_min_length: u32,
    pub gzip_types: String,
}

impl Default for NginxSettings {
    fn default() -> Self {
        Self {
            enable_http2: true,
            enable_ipv6: true,
            enable_prometheus: true,
            metrics_port: 1936,
            cpu_num: "auto".to_string(),
            backlog: 2048,
            enable_gzip: true,
            gzip_level: 5,
            gzip_min_length: 256,
            gzip_types: "application/json text/css text/javascript".to_string(),
        }
    }
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            domain: "cpaas.io".to_string(),
            tweak_dir: String::new(),
            nginx: NginxSettings::default(),
        }
    }
}

impl CompilerConfig {
    /// Create configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Ok(domain) = std::env::var("ALBATROSS_DOMAIN") {
            cfg.domain = domain;
        }
        if let Ok(dir) = std::env::var("ALBATROSS_TWEAK_DIR") {
            cfg.tweak_dir = dir;
        }
        if let Ok(port) = std::env::var("ALBATROSS_METRICS_PORT") {
            cfg.nginx.metrics_port = port
                .parse()
                .map_err(|e| crate::Error::config(format!("invalid metrics port: {}", e)))?;
        }
        if let Ok(v) = std::env::var("ALBATROSS_ENABLE_IPV6") {
            cfg.nginx.enable_ipv6 = v.eq_ignore_ascii_case("true");
        }
        Ok(cfg)
    }

    /// Load configuration from a YAML file. Missing fields take their
    /// defaults via serde.
    pub fn from_yaml_file(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(crate::Error::Io)?;
        Ok(serde_yaml::from_str(&text)?)
    }

    /// Ordered annotation namespace prefixes for one ingress path.
    ///
    /// The first prefix that defines a suffix wins, per field: a per-path
    /// indexed override beats the product namespace, which beats the
    /// community namespace.
    pub fn annotation_sources(&self, rule_index: usize, path_index: usize) -> Vec<String> {
        vec![
            format!("index.{}-{}.alb.ingress.{}", rule_index, path_index, self.domain),
            format!("alb.ingress.{}", self.domain),
            LEGACY_ANNOTATION_NAMESPACE.to_string(),
        ]
    }

    /// Well-known single-key annotation names scoped by our domain.
    pub fn names(&self) -> Names {
        Names { domain: self.domain.clone() }
    }
}

/// Fully qualified annotation keys for domains that use a single JSON or
/// free-form value instead of the prefixed suffix scheme.
#[derive(Debug, Clone)]
pub struct Names {
    domain: String,
}

impl Names {
    pub fn ingress_otel(&self) -> String {
        format!("alb.ingress.{}/otel", self.domain)
    }

    pub fn ingress_rewrite_request(&self) -> String {
        format!("alb.ingress.{}/rewrite-request", self.domain)
    }

    pub fn ingress_rewrite_response(&self) -> String {
        format!("alb.ingress.{}/rewrite-response", self.domain)
    }

    pub fn rule_rewrite_request(&self) -> String {
        format!("alb.rule.{}/rewrite-request", self.domain)
    }

    pub fn rule_rewrite_response(&self) -> String {
        format!("alb.rule.{}/rewrite-response", self.domain)
    }

    pub fn ingress_tls(&self) -> String {
        format!("alb.networking.{}/tls", self.domain)
    }

    pub fn waf_cm_ref(&self) -> String {
        format!("alb.ingress.{}/waf-cm-ref", self.domain)
    }

    pub fn waf_use_recommend(&self) -> String {
        format!("alb.ingress.{}/waf-use-recommend", self.domain)
    }
}
