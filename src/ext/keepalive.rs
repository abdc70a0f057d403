//! Keep-alive tuning. Rendered by textual injection into the listener's
//! render-time fields: the settings map onto proxy directive syntax with
//! positional semantics, so structured merge buys nothing here.

use serde::{Deserialize, Serialize};

use crate::config::CompilerConfig;
use crate::render::FtConfig;
use crate::types::{Alb, Frontend, FtProtocol};

use super::{ExtensionHooks, FtRenderCtx};

/// TCP socket keep-alive probes, rendered as a `so_keepalive` listen param.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TcpKeepAlive {
    /// Idle time before the first probe, e.g. "30m"
    #[serde(skip_serializing_if = "String::is_empty")]
    pub idle: String,
    /// Interval between probes, e.g. "75s"
    #[serde(skip_serializing_if = "String::is_empty")]
    pub interval: String,
    /// Probe count before the connection is dropped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl TcpKeepAlive {
    fn is_empty(&self) -> bool {
        self.idle.is_empty() && self.interval.is_empty() && self.count.is_none()
    }

    /// `so_keepalive=idle:interval:count`, empty positions left blank.
    fn listen_param(&self) -> String {
        format!(
            "so_keepalive={}:{}:{}",
            self.idle,
            self.interval,
            self.count.map(|c| c.to_string()).unwrap_or_default()
        )
    }
}

/// HTTP-level keep-alive, rendered as server-block directives.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpKeepAlive {
    /// `keepalive_timeout` value, e.g. "75s"
    #[serde(skip_serializing_if = "String::is_empty")]
    pub timeout: String,
    /// Optional second `keepalive_timeout` argument (header timeout)
    #[serde(skip_serializing_if = "String::is_empty")]
    pub header_timeout: String,
    /// `keepalive_requests` value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requests: Option<u32>,
}

impl HttpKeepAlive {
    fn is_empty(&self) -> bool {
        self.timeout.is_empty() && self.header_timeout.is_empty() && self.requests.is_none()
    }
}

/// CR-level keep-alive config, attachable at frontend or ALB level.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepAliveCr {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tcp: Option<TcpKeepAlive>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpKeepAlive>,
}

fn listener_keepalive(ft: &Frontend, alb: &Alb) -> Option<KeepAliveCr> {
    ft.config.keepalive.clone().or_else(|| alb.config.ext.keepalive.clone())
}

fn inject(ft_config: &mut FtConfig, ctx: &FtRenderCtx<'_>) {
    let Some(cr) = listener_keepalive(ctx.ft, ctx.alb) else {
        return;
    };

    if ctx.ft.protocol == FtProtocol::Tcp {
        if let Some(tcp) = cr.tcp.filter(|t| !t.is_empty()) {
            ft_config.listen_params.push(tcp.listen_param());
        }
        return;
    }

    if ctx.ft.protocol.is_http_mode() {
        if let Some(http) = cr.http.filter(|h| !h.is_empty()) {
            if !http.timeout.is_empty() {
                let directive = if http.header_timeout.is_empty() {
                    format!("keepalive_timeout {};", http.timeout)
                } else {
                    format!("keepalive_timeout {} {};", http.timeout, http.header_timeout)
                };
                ft_config.server_directives.push(directive);
            }
            if let Some(requests) = http.requests {
                ft_config.server_directives.push(format!("keepalive_requests {};", requests));
            }
        }
    }
}

pub fn register(_cfg: &CompilerConfig) -> ExtensionHooks {
    let mut hooks = ExtensionHooks::named("keepalive");
    hooks.update_ft_config = Some(Box::new(inject));
    hooks
}
