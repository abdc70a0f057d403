//! Deterministic nginx configuration text renderer.
//!
//! Pure function of [`NginxTemplateConfig`]: the same input renders to
//! byte-identical text. Custom locations are sorted by name here so the
//! output never flaps on input ordering.

use std::fmt::Write;

use crate::errors::{Error, Result};
use crate::types::FtProtocol;

use super::{FtConfig, NginxTemplateConfig};

/// Render the complete configuration text.
pub fn render(cfg: &NginxTemplateConfig) -> Result<String> {
    let mut out = String::new();

    render_root(&mut out, cfg)?;
    render_http(&mut out, cfg)?;
    render_stream(&mut out, cfg)?;

    Ok(out)
}

fn w(out: &mut String, args: std::fmt::Arguments<'_>) -> Result<()> {
    out.write_fmt(args).map_err(|e| Error::render(format!("formatting failed: {}", e)))
}

macro_rules! line {
    ($out:expr, $($arg:tt)*) => {{
        w($out, format_args!($($arg)*))?;
        $out.push('\n');
    }};
}

fn render_root(out: &mut String, cfg: &NginxTemplateConfig) -> Result<()> {
    line!(out, "# generated for {}; do not edit by hand", cfg.name);
    line!(out, "user nginx;");
    line!(out, "worker_processes {};", cfg.settings.cpu_num);
    line!(out, "worker_rlimit_nofile 100000;");
    line!(out, "");
    line!(out, "events {{");
    line!(out, "    worker_connections 51200;");
    line!(out, "}}");
    if !cfg.tweak.root_extra.is_empty() {
        line!(out, "");
        out.push_str(&cfg.tweak.root_extra);
        if !cfg.tweak.root_extra.ends_with('\n') {
            out.push('\n');
        }
    }
    line!(out, "");
    Ok(())
}

fn render_http(out: &mut String, cfg: &NginxTemplateConfig) -> Result<()> {
    line!(out, "http {{");
    line!(out, "    include /etc/nginx/mime.types;");
    line!(out, "    default_type application/octet-stream;");
    if cfg.settings.enable_gzip {
        line!(out, "    gzip on;");
        line!(out, "    gzip_comp_level {};", cfg.settings.gzip_level);
        line!(out, "    gzip_min_length {};", cfg.settings.gzip_min_length);
        line!(out, "    gzip_types {};", cfg.settings.gzip_types);
    }
    if !cfg.tweak.http_extra.is_empty() {
        for extra_line in cfg.tweak.http_extra.lines() {
            line!(out, "    {}", extra_line);
        }
    }

    if cfg.settings.enable_prometheus {
        line!(out, "");
        line!(out, "    server {{");
        line!(out, "        listen 0.0.0.0:{};", cfg.settings.metrics_port);
        if cfg.settings.enable_ipv6 {
            line!(out, "        listen [::]:{};", cfg.settings.metrics_port);
        }
        line!(out, "        location /metrics {{");
        line!(out, "            stub_status;");
        line!(out, "        }}");
        line!(out, "    }}");
    }

    for ft in cfg.frontends.values().filter(|f| f.protocol.is_http_mode()) {
        render_http_server(out, cfg, ft)?;
    }

    line!(out, "}}");
    line!(out, "");
    Ok(())
}

fn listen_suffix(cfg: &NginxTemplateConfig, ft: &FtConfig) -> String {
    let mut suffix = String::new();
    if ft.protocol == FtProtocol::Https {
        suffix.push_str(" ssl");
    }
    for param in &ft.listen_params {
        suffix.push(' ');
        suffix.push_str(param);
    }
    write!(suffix, " backlog={}", cfg.settings.backlog).ok();
    suffix
}

fn render_http_server(out: &mut String, cfg: &NginxTemplateConfig, ft: &FtConfig) -> Result<()> {
    if ft.protocol == FtProtocol::Https && ft.certificate_name.is_empty() {
        return Err(Error::render(format!(
            "https frontend {} has no default certificate",
            ft.name
        )));
    }

    // Render a defensive copy: location order must not depend on how
    // extensions happened to contribute them.
    let mut ft = ft.clone();
    ft.sort_locations();

    let suffix = listen_suffix(cfg, &ft);
    line!(out, "");
    line!(out, "    server {{");
    for addr in &ft.ipv4_bind_address {
        line!(out, "        listen {}:{}{};", addr, ft.port, suffix);
    }
    for addr in &ft.ipv6_bind_address {
        line!(out, "        listen {}:{}{};", addr, ft.port, suffix);
    }
    if ft.protocol == FtProtocol::Https && cfg.settings.enable_http2 {
        line!(out, "        http2 on;");
    }
    line!(out, "        server_name _;");
    line!(out, "        set $alb_frontend \"{}\";", ft.name);
    if !ft.certificate_name.is_empty() {
        line!(out, "        set $alb_certificate \"{}\";", ft.certificate_name);
    }
    for directive in &ft.server_directives {
        line!(out, "        {}", directive);
    }
    line!(out, "        location / {{");
    line!(out, "            set $alb_upstream \"\";");
    line!(out, "            proxy_pass http://$alb_upstream;");
    line!(out, "        }}");
    for location in &ft.custom_locations {
        line!(out, "        location @{} {{", location.name);
        for body_line in location.body.lines() {
            line!(out, "            {}", body_line);
        }
        line!(out, "        }}");
    }
    line!(out, "    }}");
    Ok(())
}

fn render_stream(out: &mut String, cfg: &NginxTemplateConfig) -> Result<()> {
    let stream_fts: Vec<&FtConfig> =
        cfg.frontends.values().filter(|f| f.protocol.is_stream_mode()).collect();
    if stream_fts.is_empty() && cfg.tweak.stream_extra.is_empty() {
        return Ok(());
    }

    line!(out, "stream {{");
    if !cfg.tweak.stream_extra.is_empty() {
        for extra_line in cfg.tweak.stream_extra.lines() {
            line!(out, "    {}", extra_line);
        }
    }
    for ft in stream_fts {
        let udp = if ft.protocol == FtProtocol::Udp { " udp" } else { "" };
        let mut params = String::new();
        for param in &ft.listen_params {
            params.push(' ');
            params.push_str(param);
        }
        line!(out, "");
        line!(out, "    server {{");
        for addr in &ft.ipv4_bind_address {
            line!(out, "        listen {}:{}{}{};", addr, ft.port, udp, params);
        }
        for addr in &ft.ipv6_bind_address {
            line!(out, "        listen {}:{}{}{};", addr, ft.port, udp, params);
        }
        line!(out, "        set $alb_frontend \"{}\";", ft.name);
        line!(out, "        proxy_pass $alb_upstream;");
        line!(out, "    }}");
    }
    line!(out, "}}");
    Ok(())
}
