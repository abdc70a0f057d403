//! # Pipeline Driver
//!
//! Runs the fixed extension lifecycle over every route, once per pass:
//! ingress annotation resolution, internal-rule population, reference
//! collection, policy synthesis, per-listener default policies, cross-route
//! merge/dedup, and post-dedup normalization. One synchronous pass; the
//! output is replaced wholesale, never mutated in place.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::CompilerConfig;
use crate::errors::Result;
use crate::ext::{ExtensionRegistry, FtRenderCtx, IngressSynthCtx, PolicyCtx};
use crate::render::{self, FtConfig, NetworkInfo, NginxTemplateConfig};
use crate::types::{
    sort_policies, Alb, BackendGroup, Dslx, Frontend, FtProtocol, Ingress, InternalRule,
    MatchExpr, MatchField, MatchOp, NgxPolicy, PathType, Policy, RefMap, RefSet, Rule, RuleCtx,
    Source,
};

/// Priority of a listener's default-backend policy; any user rule wins.
const DEFAULT_BACKEND_PRIORITY: i32 = 999;

/// One compiler instance: configuration plus the extension registry.
pub struct PolicyCompiler {
    cfg: CompilerConfig,
    registry: ExtensionRegistry,
}

impl PolicyCompiler {
    pub fn new(cfg: CompilerConfig) -> Self {
        let registry = ExtensionRegistry::new(&cfg);
        Self { cfg, registry }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.cfg
    }

    /// Stage 1: synthesize one rule per ingress path, with every
    /// extension's annotation resolution applied under the per-path
    /// namespace priority.
    pub fn sync_ingress(&self, ingress: &Ingress) -> Vec<Rule> {
        let mut rules = Vec::new();
        for (rule_index, http_rule) in ingress.rules.iter().enumerate() {
            for (path_index, path) in http_rule.paths.iter().enumerate() {
                let prefixes = self.cfg.annotation_sources(rule_index, path_index);
                let mut rule = Rule {
                    name: format!(
                        "{}-{}-{}-{}",
                        ingress.namespace, ingress.name, rule_index, path_index
                    ),
                    priority: 5,
                    dslx: path_dsl(&http_rule.host, path),
                    services: vec![path.service.clone()],
                    source: Some(Source::ingress(&ingress.namespace, &ingress.name)),
                    ..Default::default()
                };
                let ctx = IngressSynthCtx {
                    ingress,
                    rule_index,
                    path_index,
                    prefixes: &prefixes,
                    host: &http_rule.host,
                };
                for ext in self.registry.iter() {
                    if let Some(hook) = &ext.resolve_annotation {
                        hook(&mut rule, &ctx);
                    }
                }
                rules.push(rule);
            }
        }
        rules
    }

    /// Stage 2: internal-rule population with inheritance applied.
    fn internal_rules(&self, alb: &Alb) -> BTreeMap<String, Vec<InternalRule>> {
        let mut result = BTreeMap::new();
        for ft in &alb.frontends {
            let mut internals = Vec::with_capacity(ft.rules.len());
            for rule in &ft.rules {
                let ctx = RuleCtx::new(rule, ft, alb);
                let mut internal = InternalRule::from_ctx(&ctx);
                for ext in self.registry.iter() {
                    if let Some(hook) = &ext.to_internal_rule {
                        hook(&mut internal, &ctx);
                    }
                }
                internals.push(internal);
            }
            result.insert(ft.name.clone(), internals);
        }
        result
    }

    /// Stage 3: every external object the resolved configs point at,
    /// gathered for one bulk fetch by the caller.
    pub fn collect_refs(&self, alb: &Alb) -> RefSet {
        let mut refs = RefSet::default();
        for internals in self.internal_rules(alb).values() {
            for internal in internals {
                for ext in self.registry.iter() {
                    if let Some(hook) = &ext.collect_refs {
                        hook(&mut refs, internal);
                    }
                }
            }
        }
        refs
    }

    /// Stages 4 through 7: synthesize, dedup and normalize the policy
    /// document for one pass.
    pub fn compile(&self, alb: &Alb, refs: &RefMap) -> Result<NgxPolicy> {
        let started = std::time::Instant::now();
        let internal_by_ft = self.internal_rules(alb);
        let mut ngx = NgxPolicy::default();
        let mut groups: Vec<BackendGroup> = Vec::new();

        for ft in &alb.frontends {
            let internals = internal_by_ft.get(&ft.name).map(Vec::as_slice).unwrap_or(&[]);
            let ctx = PolicyCtx { ft, alb, refs };
            let mut policies = Vec::new();

            // Stage 4: per-route synthesis.
            for internal in internals {
                policies.push(self.route_policy(internal, &ctx));
                if !internal.services.is_empty() {
                    groups.push(BackendGroup {
                        name: internal.rule_id.clone(),
                        mode: group_mode(ft.protocol),
                        services: internal.services.clone(),
                    });
                }
            }

            // Stage 5: listener default policies.
            let mut defaults = Vec::new();
            if ft.has_default_backend() {
                defaults.push(default_backend_policy(ft));
                groups.push(BackendGroup {
                    name: ft.default_group_name(),
                    mode: group_mode(ft.protocol),
                    services: ft.services.clone(),
                });
            }
            for ext in self.registry.iter() {
                let hook = if ft.protocol.is_http_mode() {
                    &ext.default_policy
                } else {
                    &ext.default_policy_stream
                };
                if let Some(hook) = hook {
                    hook(&mut defaults, ft, alb);
                }
            }
            policies.extend(defaults);

            sort_policies(&mut policies);
            let slot = match ft.protocol {
                FtProtocol::Http | FtProtocol::Https => &mut ngx.http,
                FtProtocol::Tcp => &mut ngx.stream_tcp,
                FtProtocol::Udp => &mut ngx.stream_udp,
            };
            slot.entry(ft.port).or_default().extend(policies);
        }

        // Stage 6: cross-route merge/dedup, L7 only.
        for policies in ngx.http.values_mut() {
            for policy in policies.iter_mut() {
                merge_policy_config(policy, &mut ngx.shared_config);
                policy.refresh_plugins();
            }
        }
        for policies in ngx.stream_tcp.values_mut().chain(ngx.stream_udp.values_mut()) {
            for policy in policies.iter_mut() {
                policy.refresh_plugins();
            }
        }

        // Stage 7: post-dedup normalization.
        for ext in self.registry.iter() {
            if let Some(hook) = &ext.post_dedup {
                hook(&mut ngx.shared_config);
            }
        }

        groups.sort_by(|a, b| a.name.cmp(&b.name));
        groups.dedup_by(|a, b| a.name == b.name);
        ngx.backend_group = groups;

        debug!(
            alb = %alb.name,
            elapsed_ms = started.elapsed().as_millis() as u64,
            shared_entries = ngx.shared_config.len(),
            "policy pass complete"
        );
        Ok(ngx)
    }

    fn route_policy(&self, internal: &InternalRule, ctx: &PolicyCtx<'_>) -> Policy {
        let mut policy = Policy {
            rule: internal.rule_id.clone(),
            internal_dsl: internal.dslx.to_internal(),
            upstream: if internal.services.is_empty() {
                String::new()
            } else {
                internal.rule_id.clone()
            },
            priority: internal.priority,
            complexity: internal.dslx.complexity(),
            source: internal.source.clone(),
            ..Default::default()
        };
        for (kind, source) in &internal.config.source {
            policy.dedup_keys.insert(*kind, source.dedup_key(*kind));
        }
        for ext in self.registry.iter() {
            if let Some(hook) = &ext.to_policy {
                hook(&mut policy, internal, ctx);
            }
        }
        policy
    }

    /// Build the render model and produce the configuration text. Tweak
    /// file problems are fatal; no partial output.
    pub fn render_config(&self, alb: &Alb, refs: &RefMap, net: &NetworkInfo) -> Result<String> {
        let tweak = render::load_tweak_files(&self.cfg.tweak_dir)?;
        let internal_by_ft = self.internal_rules(alb);

        let mut template = NginxTemplateConfig {
            name: alb.name.clone(),
            settings: self.cfg.nginx.clone(),
            tweak,
            ..Default::default()
        };
        let (v4, v6) = render::bind_addresses(
            &template.tweak.bind_nic,
            net,
            self.cfg.nginx.enable_ipv6,
        );

        for ft in &alb.frontends {
            let mut ft_config = FtConfig {
                name: ft.name.clone(),
                port: ft.port,
                protocol: ft.protocol,
                ipv4_bind_address: v4.clone(),
                ipv6_bind_address: v6.clone(),
                certificate_name: ft.certificate_name.clone(),
                ..Default::default()
            };
            let rules = internal_by_ft.get(&ft.name).map(Vec::as_slice).unwrap_or(&[]);
            let render_ctx = FtRenderCtx { ft, alb, rules, refs };
            for ext in self.registry.iter() {
                if let Some(hook) = &ext.update_ft_config {
                    hook(&mut ft_config, &render_ctx);
                }
            }
            ft_config.sort_locations();
            template.frontends.insert(ft.port, ft_config);
        }

        render::nginx::render(&template)
    }
}

/// Match condition for one ingress host/path pair.
fn path_dsl(host: &str, path: &crate::types::IngressPath) -> Dslx {
    let mut exprs = Vec::new();
    if !host.is_empty() {
        let op = if host.starts_with("*.") { MatchOp::Regex } else { MatchOp::Eq };
        let value = if host.starts_with("*.") {
            format!(".*{}", host.trim_start_matches('*').replace('.', "\\."))
        } else {
            host.to_string()
        };
        exprs.push(MatchExpr::new(MatchField::Host, op, vec![value]));
    }
    let op = match path.path_type {
        PathType::Exact => MatchOp::Eq,
        PathType::Prefix | PathType::ImplementationSpecific => MatchOp::StartsWith,
    };
    exprs.push(MatchExpr::new(MatchField::Url, op, vec![path.path.clone()]));
    Dslx(exprs)
}

fn group_mode(protocol: FtProtocol) -> String {
    match protocol {
        FtProtocol::Http | FtProtocol::Https => "http".to_string(),
        FtProtocol::Tcp => "tcp".to_string(),
        FtProtocol::Udp => "udp".to_string(),
    }
}

fn default_backend_policy(ft: &Frontend) -> Policy {
    let dsl = Dslx::match_all();
    Policy {
        rule: ft.default_group_name(),
        internal_dsl: dsl.to_internal(),
        upstream: ft.default_group_name(),
        priority: DEFAULT_BACKEND_PRIORITY,
        complexity: dsl.complexity(),
        ..Default::default()
    }
}

/// Stage 6 for one route: move mergeable domain configs into the shared
/// pool, keyed by inheritance origin when known and by content hash
/// otherwise, and leave a reference behind.
fn merge_policy_config(policy: &mut Policy, shared: &mut crate::types::SharedConfig) {
    for kind in policy.config.ext.active_kinds() {
        if !kind.mergeable() {
            continue;
        }
        let key = match policy.dedup_keys.get(&kind) {
            Some(origin_key) => origin_key.clone(),
            None => match policy.config.ext.slot_value(kind) {
                Some(value) => hex::encode(Sha256::digest(value.to_string().as_bytes())),
                None => continue,
            },
        };
        let single = policy.config.ext.extract(kind);
        shared
            .entry(key.clone())
            .or_insert_with(|| crate::types::RefBox { kind, ext: single });
        policy.config.refs.insert(kind, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::timeout::TimeoutCr;
    use crate::types::{BackendService, ExtKind, IngressHttpRule, IngressPath};

    fn service(name: &str) -> BackendService {
        BackendService { name: name.into(), namespace: "default".into(), port: 8080, weight: 100 }
    }

    fn compiler() -> PolicyCompiler {
        PolicyCompiler::new(CompilerConfig::default())
    }

    fn http_ft(name: &str, port: u16, rules: Vec<Rule>) -> Frontend {
        Frontend { name: name.into(), port, protocol: FtProtocol::Http, rules, ..Default::default() }
    }

    #[test]
    fn test_sync_ingress_builds_one_rule_per_path() {
        let ingress = Ingress {
            namespace: "ns1".into(),
            name: "web".into(),
            rules: vec![IngressHttpRule {
                host: "a.example.com".into(),
                paths: vec![
                    IngressPath {
                        path: "/".into(),
                        path_type: PathType::Prefix,
                        service: service("web"),
                    },
                    IngressPath {
                        path: "/api".into(),
                        path_type: PathType::Exact,
                        service: service("api"),
                    },
                ],
            }],
            ..Default::default()
        };
        let rules = compiler().sync_ingress(&ingress);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].name, "ns1-web-0-0");
        assert_eq!(rules[1].name, "ns1-web-0-1");
        assert_eq!(rules[0].source.as_ref().unwrap().name, "web");
        assert_eq!(rules[1].dslx.0[1].op, MatchOp::Eq);
    }

    #[test]
    fn test_inherited_config_shares_one_pool_entry() {
        let r1 = Rule { name: "r1".into(), services: vec![service("a")], ..Default::default() };
        let r2 = Rule { name: "r2".into(), services: vec![service("b")], ..Default::default() };
        let mut ft = http_ft("ft-80", 80, vec![r1, r2]);
        ft.config.timeout =
            Some(TimeoutCr { proxy_read_timeout: "30".into(), ..Default::default() });
        let alb = Alb { name: "alb-1".into(), frontends: vec![ft], ..Default::default() };

        let ngx = compiler().compile(&alb, &RefMap::default()).unwrap();
        assert_eq!(ngx.shared_config.len(), 1);
        let key = ngx.shared_config.keys().next().unwrap();
        assert_eq!(key, "ft-80/timeout");

        let policies = &ngx.http[&80];
        for policy in policies {
            assert!(policy.config.ext.timeout.is_none());
            assert_eq!(policy.config.refs[&ExtKind::Timeout], *key);
            assert_eq!(policy.plugins, vec!["timeout".to_string()]);
        }
    }

    #[test]
    fn test_rule_level_configs_get_separate_entries() {
        let mut r1 = Rule { name: "r1".into(), ..Default::default() };
        r1.config.timeout = Some(TimeoutCr { proxy_read_timeout: "30".into(), ..Default::default() });
        let mut r2 = Rule { name: "r2".into(), ..Default::default() };
        r2.config.timeout = Some(TimeoutCr { proxy_read_timeout: "30".into(), ..Default::default() });
        let ft = http_ft("ft-80", 80, vec![r1, r2]);
        let alb = Alb { name: "alb-1".into(), frontends: vec![ft], ..Default::default() };

        let ngx = compiler().compile(&alb, &RefMap::default()).unwrap();
        // Identical values but different origins: two entries.
        assert_eq!(ngx.shared_config.len(), 2);
        assert!(ngx.shared_config.contains_key("r1/timeout"));
        assert!(ngx.shared_config.contains_key("r2/timeout"));
    }

    #[test]
    fn test_stream_listener_skips_pool_but_keeps_plugins() {
        let mut rule = Rule { name: "tcp-1".into(), services: vec![service("db")], ..Default::default() };
        rule.config.timeout =
            Some(TimeoutCr { proxy_read_timeout: "60".into(), ..Default::default() });
        let ft = Frontend {
            name: "ft-5432".into(),
            port: 5432,
            protocol: FtProtocol::Tcp,
            rules: vec![rule],
            ..Default::default()
        };
        let alb = Alb { name: "alb-1".into(), frontends: vec![ft], ..Default::default() };

        let ngx = compiler().compile(&alb, &RefMap::default()).unwrap();
        assert!(ngx.shared_config.is_empty());
        let policy = &ngx.stream_tcp[&5432][0];
        assert!(policy.config.ext.timeout.is_some());
        assert_eq!(policy.plugins, vec!["timeout".to_string()]);
    }

    #[test]
    fn test_default_backend_policy_sorts_last() {
        let rule = Rule { name: "r1".into(), priority: 5, services: vec![service("a")], ..Default::default() };
        let mut ft = http_ft("ft-80", 80, vec![rule]);
        ft.services = vec![service("fallback")];
        let alb = Alb { name: "alb-1".into(), frontends: vec![ft], ..Default::default() };

        let ngx = compiler().compile(&alb, &RefMap::default()).unwrap();
        let policies = &ngx.http[&80];
        assert_eq!(policies.len(), 2);
        assert_eq!(policies[0].rule, "r1");
        assert_eq!(policies[1].rule, "ft-80-80");
        assert!(ngx.backend_group.iter().any(|g| g.name == "ft-80-80"));
    }

    #[test]
    fn test_collect_refs_gathers_secret_keys() {
        use crate::ext::auth::{AuthCr, BasicAuthCr};
        let mut rule = Rule { name: "r1".into(), ..Default::default() };
        rule.config.auth = Some(AuthCr {
            basic: Some(BasicAuthCr {
                auth_type: "basic".into(),
                secret: "default/creds".into(),
                secret_type: "auth-file".into(),
                ..Default::default()
            }),
            forward: None,
        });
        let ft = http_ft("ft-80", 80, vec![rule]);
        let alb = Alb { name: "alb-1".into(), frontends: vec![ft], ..Default::default() };

        let refs = compiler().collect_refs(&alb);
        assert!(refs.secrets.contains(&crate::types::ObjectKey::new("default", "creds")));
    }
}
