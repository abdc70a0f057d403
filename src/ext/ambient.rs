//! Ambient (legacy) domains: rewrite, CORS and upstream vhost, carried as
//! flat fields on the rule and the policy rather than structured configs.
//!
//! Registered last in the pipeline so it can never override a primary
//! field a newer extension has set. Excluded from the shared pool.

use crate::annotations;
use crate::config::CompilerConfig;

use super::ExtensionHooks;

pub fn register(_cfg: &CompilerConfig) -> ExtensionHooks {
    let mut hooks = ExtensionHooks::named("ambient");

    hooks.resolve_annotation = Some(Box::new(|rule, ctx| {
        let ann = &ctx.ingress.annotations;
        let get = |suffix: &str| annotations::get(ann, ctx.prefixes, suffix);

        if let Some(target) = get("rewrite-target").filter(|v| !v.is_empty()) {
            rule.rewrite_target = target.to_string();
            // The matched path is the rewrite base unless one was given.
            if rule.rewrite_base.is_empty() {
                if let Some(expr) = rule.dslx.0.first() {
                    if let Some(path) = expr.values.first() {
                        rule.rewrite_base = path.clone();
                    }
                }
            }
        }
        if get("enable-cors") == Some("true") {
            rule.enable_cors = true;
        }
        if let Some(v) = get("cors-allow-headers").filter(|v| !v.is_empty()) {
            rule.cors_allow_headers = v.to_string();
        }
        if let Some(v) = get("cors-allow-origin").filter(|v| !v.is_empty()) {
            rule.cors_allow_origin = v.to_string();
        }
        if let Some(v) = get("upstream-vhost").filter(|v| !v.is_empty()) {
            rule.vhost = v.to_string();
        }
    }));

    hooks.to_policy = Some(Box::new(|policy, internal, _ctx| {
        let legacy = &internal.legacy;
        policy.url = legacy.url.clone();
        policy.rewrite_base = legacy.rewrite_base.clone();
        policy.rewrite_target = legacy.rewrite_target.clone();
        policy.enable_cors = legacy.enable_cors;
        policy.cors_allow_headers = legacy.cors_allow_headers.clone();
        policy.cors_allow_origin = legacy.cors_allow_origin.clone();
        policy.vhost = legacy.vhost.clone();
    }));

    hooks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::Annotations;
    use crate::ext::IngressSynthCtx;
    use crate::types::{Dslx, Ingress, InternalRule, MatchExpr, MatchField, MatchOp, Policy, Rule};

    #[test]
    fn test_rewrite_target_defaults_base_to_matched_path() {
        let mut ann = Annotations::new();
        ann.insert("nginx.ingress.kubernetes.io/rewrite-target".into(), "/".into());
        let ing = Ingress { annotations: ann, ..Default::default() };
        let prefixes = vec!["nginx.ingress.kubernetes.io".to_string()];
        let ctx = IngressSynthCtx {
            ingress: &ing,
            rule_index: 0,
            path_index: 0,
            prefixes: &prefixes,
            host: "h",
        };

        let mut rule = Rule {
            dslx: Dslx(vec![MatchExpr::new(
                MatchField::Url,
                MatchOp::StartsWith,
                vec!["/api".to_string()],
            )]),
            ..Default::default()
        };
        (register(&CompilerConfig::default()).resolve_annotation.unwrap())(&mut rule, &ctx);
        assert_eq!(rule.rewrite_target, "/");
        assert_eq!(rule.rewrite_base, "/api");
    }

    #[test]
    fn test_legacy_fields_copied_to_policy() {
        let mut internal = InternalRule::default();
        internal.legacy.vhost = "internal.example.com".into();
        internal.legacy.enable_cors = true;
        internal.legacy.cors_allow_origin = "*".into();

        let mut policy = Policy::default();
        let hooks = register(&CompilerConfig::default());
        (hooks.to_policy.unwrap())(
            &mut policy,
            &internal,
            &crate::ext::PolicyCtx {
                ft: &Default::default(),
                alb: &Default::default(),
                refs: &Default::default(),
            },
        );
        assert_eq!(policy.vhost, "internal.example.com");
        assert!(policy.enable_cors);
        assert_eq!(policy.cors_allow_origin, "*");
    }
}
