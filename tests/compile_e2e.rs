//! End-to-end compilation: ingress synthesis through policy generation and
//! config rendering.

use albatross::config::CompilerConfig;
use albatross::ext::redirect::RedirectCr;
use albatross::ext::waf::WafCr;
use albatross::pipeline::PolicyCompiler;
use albatross::render::NetworkInfo;
use albatross::types::{
    Alb, BackendService, Frontend, FtProtocol, Ingress, IngressHttpRule, IngressPath, PathType,
    RefMap, Rule,
};

fn service(name: &str) -> BackendService {
    BackendService { name: name.into(), namespace: "default".into(), port: 8080, weight: 100 }
}

fn compiler() -> PolicyCompiler {
    PolicyCompiler::new(CompilerConfig::default())
}

fn alb_with(frontends: Vec<Frontend>) -> Alb {
    Alb { name: "alb-1".into(), frontends, ..Default::default() }
}

/// An ingress-wide `ssl-redirect=true` without TLS coverage is inert, and a
/// per-path `force-ssl-redirect=true` override flags exactly that path.
#[test]
fn force_ssl_redirect_applies_to_one_path_only() {
    let mut ingress = Ingress {
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
                    path: "/login".into(),
                    path_type: PathType::Prefix,
                    service: service("login"),
                },
            ],
        }],
        ..Default::default()
    };
    ingress
        .annotations
        .insert("nginx.ingress.kubernetes.io/ssl-redirect".into(), "true".into());
    ingress.annotations.insert(
        "index.0-1.alb.ingress.cpaas.io/force-ssl-redirect".into(),
        "true".into(),
    );

    let compiler = compiler();
    let rules = compiler.sync_ingress(&ingress);
    assert_eq!(rules.len(), 2);

    let ft = Frontend {
        name: "ft-80".into(),
        port: 80,
        protocol: FtProtocol::Http,
        rules,
        ..Default::default()
    };
    let alb = alb_with(vec![ft]);
    let ngx = compiler.compile(&alb, &RefMap::default()).unwrap();

    let policies = &ngx.http[&80];
    assert_eq!(policies.len(), 2, "no synthetic redirect policy on the listener");

    let login = policies.iter().find(|p| p.rule == "ns1-web-0-1").unwrap();
    let redirect = login.config.ext.redirect.as_ref().expect("forced path redirects");
    assert_eq!(redirect.scheme.as_deref(), Some("https"));
    assert_eq!(redirect.code, 308);
    assert!(login.plugins.contains(&"redirect".to_string()));

    let root = policies.iter().find(|p| p.rule == "ns1-web-0-0").unwrap();
    assert!(root.config.ext.redirect.is_none(), "unforced path without TLS stays plain");
    assert!(root.config.refs.is_empty());
}

/// An inherited ssl-redirect-only config is a no-op on an HTTPS listener
/// and a real redirect on an HTTP listener.
#[test]
fn ssl_redirect_suppressed_on_https_listener() {
    let ssl = RedirectCr {
        scheme: Some("https".into()),
        code: Some(308),
        ..Default::default()
    };

    let make_ft = |name: &str, port: u16, protocol, certificate: &str| {
        let mut ft = Frontend {
            name: name.into(),
            port,
            protocol,
            certificate_name: certificate.into(),
            rules: vec![Rule {
                name: format!("{}-r1", name),
                services: vec![service("web")],
                ..Default::default()
            }],
            ..Default::default()
        };
        ft.config.redirect = Some(ssl.clone());
        ft
    };

    let alb = alb_with(vec![
        make_ft("ft-80", 80, FtProtocol::Http, ""),
        make_ft("ft-443", 443, FtProtocol::Https, "ns1/cert"),
    ]);
    let ngx = compiler().compile(&alb, &RefMap::default()).unwrap();

    let http_policy = ngx.http[&80].iter().find(|p| p.rule == "ft-80-r1").unwrap();
    assert!(http_policy.config.ext.redirect.is_some());

    let https_policy = ngx.http[&443].iter().find(|p| p.rule == "ft-443-r1").unwrap();
    assert!(https_policy.config.ext.redirect.is_none());
    assert!(https_policy.plugins.is_empty());
}

/// Rendering is deterministic even when extensions contribute custom
/// locations in different orders across runs.
#[test]
fn render_is_byte_identical_across_runs() {
    let mut rule_b = Rule { name: "rule-b".into(), services: vec![service("b")], ..Default::default() };
    rule_b.config.waf = Some(WafCr { use_core_rules: true, ..Default::default() });
    let mut rule_a = Rule { name: "rule-a".into(), services: vec![service("a")], ..Default::default() };
    rule_a.config.waf =
        Some(WafCr { snippet: "SecRuleEngine On".into(), ..Default::default() });

    // Contribution order follows rule order; sorted output must not.
    let ft = Frontend {
        name: "ft-80".into(),
        port: 80,
        protocol: FtProtocol::Http,
        rules: vec![rule_b.clone(), rule_a.clone()],
        ..Default::default()
    };
    let mut ft_flipped = ft.clone();
    ft_flipped.rules = vec![rule_a, rule_b];

    let compiler = compiler();
    let net = NetworkInfo::default();
    let refs = RefMap::default();

    let text = compiler.render_config(&alb_with(vec![ft]), &refs, &net).unwrap();
    let text_flipped =
        compiler.render_config(&alb_with(vec![ft_flipped]), &refs, &net).unwrap();
    assert_eq!(text, text_flipped);
    assert!(text.find("@waf_rule_rule-a").unwrap() < text.find("@waf_rule_rule-b").unwrap());

    // Same input again: same bytes.
    let again = compiler
        .render_config(
            &alb_with(vec![Frontend {
                name: "ft-80".into(),
                port: 80,
                protocol: FtProtocol::Http,
                ..Default::default()
            }]),
            &refs,
            &net,
        )
        .unwrap();
    let again2 = compiler
        .render_config(
            &alb_with(vec![Frontend {
                name: "ft-80".into(),
                port: 80,
                protocol: FtProtocol::Http,
                ..Default::default()
            }]),
            &refs,
            &net,
        )
        .unwrap();
    assert_eq!(again, again2);
}

/// The policy document serializes stably: sorted plugins, ordered maps.
#[test]
fn policy_document_is_order_stable() {
    let mut rule = Rule { name: "r1".into(), services: vec![service("web")], ..Default::default() };
    rule.config.timeout = Some(albatross::ext::timeout::TimeoutCr {
        proxy_read_timeout: "30".into(),
        ..Default::default()
    });
    let ft = Frontend {
        name: "ft-80".into(),
        port: 80,
        protocol: FtProtocol::Http,
        rules: vec![rule],
        ..Default::default()
    };
    let alb = alb_with(vec![ft]);

    let compiler = compiler();
    let refs = RefMap::default();
    let doc_a = serde_json::to_string(&compiler.compile(&alb, &refs).unwrap()).unwrap();
    let doc_b = serde_json::to_string(&compiler.compile(&alb, &refs).unwrap()).unwrap();
    assert_eq!(doc_a, doc_b);
    assert!(doc_a.contains("\"shared_config\""));
    assert!(doc_a.contains("r1/timeout"));
}
