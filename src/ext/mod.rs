//! # Extension Pipeline
//!
//! Each configuration domain (auth, redirect, timeout, ...) is a capability
//! set: a record of optional callbacks, one per lifecycle hook. An absent
//! entry means the extension has no behavior at that hook and is skipped
//! without error; most extensions implement only a few of the hooks.
//!
//! Extensions run in declaration order. The ambient (legacy) extension is
//! registered last so newer extensions set primary fields first and the
//! legacy path never overrides them. That ordering is load-bearing.

pub mod ambient;
pub mod auth;
pub mod header_modify;
pub mod inherit;
pub mod keepalive;
pub mod otel;
pub mod redirect;
pub mod timeout;
pub mod waf;

use crate::config::CompilerConfig;
use crate::render::FtConfig;
use crate::types::{
    Alb, Frontend, Ingress, InternalRule, Policy, RefMap, RefSet, Rule, RuleCtx, SharedConfig,
};

/// Per-path context threaded through ingress-annotation resolution.
pub struct IngressSynthCtx<'a> {
    pub ingress: &'a Ingress,
    pub rule_index: usize,
    pub path_index: usize,
    /// Ordered annotation namespace prefixes for this path
    pub prefixes: &'a [String],
    pub host: &'a str,
}

/// Context for per-route policy synthesis.
pub struct PolicyCtx<'a> {
    pub ft: &'a Frontend,
    pub alb: &'a Alb,
    pub refs: &'a RefMap,
}

/// Context for render-time listener updates.
pub struct FtRenderCtx<'a> {
    pub ft: &'a Frontend,
    pub alb: &'a Alb,
    pub rules: &'a [InternalRule],
    pub refs: &'a RefMap,
}

pub type IngressHook = Box<dyn Fn(&mut Rule, &IngressSynthCtx<'_>)>;
pub type RuleHook = Box<dyn Fn(&mut InternalRule, &RuleCtx<'_>)>;
pub type RefsHook = Box<dyn Fn(&mut RefSet, &InternalRule)>;
pub type PolicyHook = Box<dyn Fn(&mut Policy, &InternalRule, &PolicyCtx<'_>)>;
pub type DefaultPolicyHook = Box<dyn Fn(&mut Vec<Policy>, &Frontend, &Alb)>;
pub type PostDedupHook = Box<dyn Fn(&mut SharedConfig)>;
pub type FtConfigHook = Box<dyn Fn(&mut FtConfig, &FtRenderCtx<'_>)>;

/// One extension's hook record. `None` slots are skipped by the driver.
#[derive(Default)]
pub struct ExtensionHooks {
    pub name: &'static str,
    /// Stage 1: augment a synthesized rule from ingress annotations
    pub resolve_annotation: Option<IngressHook>,
    /// Stage 2: populate the internal rule with inheritance applied
    pub to_internal_rule: Option<RuleHook>,
    /// Stage 3: gather external objects the resolved config points at
    pub collect_refs: Option<RefsHook>,
    /// Stage 4: per-route policy synthesis
    pub to_policy: Option<PolicyHook>,
    /// Stage 5: amend or add per-listener default policies (L7)
    pub default_policy: Option<DefaultPolicyHook>,
    /// Stage 5: same for stream (L4) listeners
    pub default_policy_stream: Option<DefaultPolicyHook>,
    /// Stage 7: transform pooled configs after dedup
    pub post_dedup: Option<PostDedupHook>,
    /// Render: contribute listener fields and custom locations
    pub update_ft_config: Option<FtConfigHook>,
}

impl ExtensionHooks {
    pub fn named(name: &'static str) -> Self {
        Self { name, ..Default::default() }
    }
}

/// Ordered set of registered extensions for one compiler instance.
pub struct ExtensionRegistry {
    extensions: Vec<ExtensionHooks>,
}

impl ExtensionRegistry {
    /// Build the full registry in its fixed declaration order.
    pub fn new(cfg: &CompilerConfig) -> Self {
        Self {
            extensions: vec![
                auth::register(cfg),
                redirect::register(cfg),
                timeout::register(cfg),
                keepalive::register(cfg),
                waf::register(cfg),
                header_modify::register(cfg),
                otel::register(cfg),
                // ambient last: it must never override primary fields
                ambient::register(cfg),
            ],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExtensionHooks> {
        self.extensions.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_order_ends_with_ambient() {
        let registry = ExtensionRegistry::new(&CompilerConfig::default());
        let names: Vec<&str> = registry.iter().map(|e| e.name).collect();
        assert_eq!(names.first(), Some(&"auth"));
        assert_eq!(names.last(), Some(&"ambient"));
        assert!(names.contains(&"redirect"));
        assert!(names.contains(&"otel"));
    }

    #[test]
    fn test_absent_hooks_default_to_none() {
        let hooks = ExtensionHooks::named("probe");
        assert!(hooks.resolve_annotation.is_none());
        assert!(hooks.post_dedup.is_none());
    }
}
