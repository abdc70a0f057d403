//! WAF (modsecurity) configuration. Policies point at a named location
//! block through `to_location`; the blocks themselves are contributed to
//! the listener's render model as custom locations.
//!
//! Location identity follows the config's source: all paths of one
//! originating ingress share one block, an origin-less rule gets its own,
//! and frontend/ALB configs are keyed per listener.

use serde::{Deserialize, Serialize};

use crate::annotations;
use crate::config::CompilerConfig;
use crate::errors::RouteError;
use crate::render::FtCustomLocation;
use crate::types::{
    parse_cm_ref, CfgLevel, ExtKind, InternalRule, RefMap,
};

use super::{inherit, ExtensionHooks, FtRenderCtx};

const CORE_RULES_FILE: &str = "/etc/nginx/owasp-modsecurity-crs/nginx-modsecurity.conf";

/// CR-level WAF config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WafCr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable: Option<bool>,
    /// Use the recommended core rule set
    pub use_core_rules: bool,
    /// `ns/name#section` reference to a configmap-held rule fragment
    #[serde(skip_serializing_if = "String::is_empty")]
    pub cm_ref: String,
    /// Free-form modsecurity directives
    #[serde(skip_serializing_if = "String::is_empty")]
    pub snippet: String,
}

/// The effective rule source after mutual exclusivity: a snippet beats the
/// configmap reference, which beats the core rule set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WafMode<'a> {
    Snippet(&'a str),
    CmRef(&'a str),
    CoreRules,
}

impl WafCr {
    pub fn enabled(&self) -> bool {
        self.enable.unwrap_or(true)
            && (!self.snippet.is_empty() || !self.cm_ref.is_empty() || self.use_core_rules)
    }

    pub fn mode(&self) -> Option<WafMode<'_>> {
        if !self.enabled() {
            return None;
        }
        if !self.snippet.is_empty() {
            return Some(WafMode::Snippet(&self.snippet));
        }
        if !self.cm_ref.is_empty() {
            return Some(WafMode::CmRef(&self.cm_ref));
        }
        Some(WafMode::CoreRules)
    }
}

/// Location-block name for one route's effective WAF config.
fn location_name(internal: &InternalRule, ft_name: &str) -> String {
    match internal.config.source_of(ExtKind::Waf).map(|s| s.level) {
        Some(CfgLevel::Frontend) => format!("waf_ft_{}", ft_name),
        Some(CfgLevel::Alb) => format!("waf_alb_{}", ft_name),
        _ => match &internal.source {
            Some(origin) => format!("waf_ing_{}_{}", origin.namespace, origin.name),
            None => format!("waf_rule_{}", internal.rule_id),
        },
    }
}

/// Resolve the directive text for one config, reading configmap-referenced
/// fragments out of the fetched reference map.
fn rules_text(cr: &WafCr, refs: &RefMap) -> Result<String, RouteError> {
    match cr.mode() {
        None => Ok(String::new()),
        Some(WafMode::Snippet(snippet)) => {
            Ok(format!("modsecurity on;\nmodsecurity_rules '\n{}\n';", snippet))
        }
        Some(WafMode::CmRef(reference)) => {
            let (key, section) = parse_cm_ref(reference)?;
            let cm = refs
                .config_maps
                .get(&key)
                .ok_or_else(|| RouteError::ConfigMapNotFound { key: key.to_string() })?;
            let fragment = cm.data.get(&section).ok_or_else(|| RouteError::SectionNotFound {
                key: key.to_string(),
                section: section.clone(),
            })?;
            Ok(format!("modsecurity on;\nmodsecurity_rules '\n{}\n';", fragment))
        }
        Some(WafMode::CoreRules) => {
            Ok(format!("modsecurity on;\nmodsecurity_rules_file {};", CORE_RULES_FILE))
        }
    }
}

fn collect_locations(ctx: &FtRenderCtx<'_>) -> Vec<FtCustomLocation> {
    let mut locations: Vec<FtCustomLocation> = Vec::new();
    for internal in ctx.rules {
        let Some(cr) = &internal.config.waf else {
            continue;
        };
        if !cr.enabled() {
            continue;
        }
        let name = location_name(internal, &ctx.ft.name);
        if locations.iter().any(|l| l.name == name) {
            continue;
        }
        // Unresolvable fragments were already recorded on the policy; no
        // location means the data plane refuses the route.
        if let Ok(body) = rules_text(cr, ctx.refs) {
            locations.push(FtCustomLocation { name, body });
        }
    }
    locations
}

pub fn register(cfg: &CompilerConfig) -> ExtensionHooks {
    let names = cfg.names();
    let mut hooks = ExtensionHooks::named("waf");

    hooks.resolve_annotation = Some(Box::new(move |rule, ctx| {
        let ann = &ctx.ingress.annotations;
        let mut cr: Option<WafCr> = None;

        if let Some(v) = annotations::get(ann, ctx.prefixes, "enable-modsecurity") {
            cr.get_or_insert_with(Default::default).enable = Some(v == "true");
        }
        if let Some(v) = annotations::get(ann, ctx.prefixes, "modsecurity-snippet") {
            if !v.is_empty() {
                cr.get_or_insert_with(Default::default).snippet = v.to_string();
            }
        }
        if let Some(v) = ann.get(&names.waf_cm_ref()) {
            if !v.is_empty() {
                cr.get_or_insert_with(Default::default).cm_ref = v.clone();
            }
        }
        if let Some(v) = ann.get(&names.waf_use_recommend()) {
            cr.get_or_insert_with(Default::default).use_core_rules = v == "true";
        }

        if let Some(cr) = cr {
            rule.config.waf = Some(cr);
        }
    }));

    hooks.to_internal_rule = Some(Box::new(|internal, ctx| {
        if let Some((cr, source)) = inherit::resolve(ctx, |c| c.waf.as_ref()) {
            if cr.enabled() {
                internal.config.waf = Some(cr.clone());
                internal.config.source.insert(ExtKind::Waf, source);
            }
        }
    }));

    hooks.collect_refs = Some(Box::new(|refs, internal| {
        let Some(cr) = &internal.config.waf else {
            return;
        };
        if let Some(WafMode::CmRef(reference)) = cr.mode() {
            if let Ok((key, _)) = parse_cm_ref(reference) {
                refs.config_maps.insert(key);
            }
        }
    }));

    hooks.to_policy = Some(Box::new(|policy, internal, ctx| {
        let Some(cr) = &internal.config.waf else {
            return;
        };
        if !cr.enabled() {
            return;
        }
        match rules_text(cr, ctx.refs) {
            Ok(_) => policy.to_location = Some(location_name(internal, &ctx.ft.name)),
            Err(e) => policy.record_err(ExtKind::Waf, e.to_string()),
        }
    }));

    hooks.update_ft_config = Some(Box::new(|ft_config, ctx| {
        ft_config.custom_locations.extend(collect_locations(ctx));
    }));

    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConfigMap, ConfigSource, ObjectKey, Source};

    fn snippet_cr(snippet: &str) -> WafCr {
        WafCr { snippet: snippet.to_string(), ..Default::default() }
    }

    #[test]
    fn test_snippet_suppresses_cm_ref_and_core_rules() {
        let cr = WafCr {
            snippet: "SecRuleEngine On".into(),
            cm_ref: "ns/cm#main".into(),
            use_core_rules: true,
            ..Default::default()
        };
        assert_eq!(cr.mode(), Some(WafMode::Snippet("SecRuleEngine On")));

        let cr = WafCr { cm_ref: "ns/cm#main".into(), use_core_rules: true, ..Default::default() };
        assert_eq!(cr.mode(), Some(WafMode::CmRef("ns/cm#main")));

        let cr = WafCr { use_core_rules: true, ..Default::default() };
        assert_eq!(cr.mode(), Some(WafMode::CoreRules));
    }

    #[test]
    fn test_explicit_disable_wins() {
        let cr = WafCr { enable: Some(false), use_core_rules: true, ..Default::default() };
        assert!(cr.mode().is_none());
    }

    #[test]
    fn test_location_name_by_source() {
        let mut internal = InternalRule { rule_id: "rule-1".into(), ..Default::default() };

        // Rule-sourced, no origin.
        internal
            .config
            .source
            .insert(ExtKind::Waf, ConfigSource::new(CfgLevel::Rule, "rule-1"));
        assert_eq!(location_name(&internal, "ft-80"), "waf_rule_rule-1");

        // Rule-sourced with an ingress origin shares per-origin.
        internal.source = Some(Source::ingress("ns1", "web"));
        assert_eq!(location_name(&internal, "ft-80"), "waf_ing_ns1_web");

        // Frontend- and ALB-sourced key per listener.
        internal
            .config
            .source
            .insert(ExtKind::Waf, ConfigSource::new(CfgLevel::Frontend, "ft-80"));
        assert_eq!(location_name(&internal, "ft-80"), "waf_ft_ft-80");
        internal
            .config
            .source
            .insert(ExtKind::Waf, ConfigSource::new(CfgLevel::Alb, "alb-1"));
        assert_eq!(location_name(&internal, "ft-80"), "waf_alb_ft-80");
    }

    #[test]
    fn test_cm_ref_resolution() {
        let mut refs = RefMap::default();
        let mut cm = ConfigMap::default();
        cm.data.insert("strict".into(), "SecRuleEngine On".into());
        refs.config_maps.insert(ObjectKey::new("ns1", "waf-rules"), cm);

        let cr = WafCr { cm_ref: "ns1/waf-rules#strict".into(), ..Default::default() };
        let body = rules_text(&cr, &refs).unwrap();
        assert!(body.contains("SecRuleEngine On"));

        let missing = WafCr { cm_ref: "ns1/waf-rules#lax".into(), ..Default::default() };
        assert!(matches!(
            rules_text(&missing, &refs),
            Err(RouteError::SectionNotFound { .. })
        ));

        let gone = WafCr { cm_ref: "ns2/other#x".into(), ..Default::default() };
        assert!(matches!(rules_text(&gone, &refs), Err(RouteError::ConfigMapNotFound { .. })));
    }
}
