//! # Render Model
//!
//! The listener-level model the nginx renderer consumes, plus the loaders
//! for operator tweak files: `bind_nic.json` selects bind interfaces and
//! `*_extra.conf` snippets are appended verbatim to the generated config.
//!
//! Tweak files are optional; a file that exists but cannot be read or
//! parsed is fatal to the pass so a broken override never degrades into a
//! silently different config.

pub mod nginx;

use std::collections::BTreeMap;
use std::net::IpAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::NginxSettings;
use crate::errors::{Error, Result};
use crate::types::FtProtocol;

/// One named custom location block contributed by an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtCustomLocation {
    pub name: String,
    /// Directive text placed inside the block
    pub body: String,
}

/// Render-time model of one listener.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtConfig {
    pub name: String,
    pub port: u16,
    pub protocol: FtProtocol,
    pub ipv4_bind_address: Vec<String>,
    pub ipv6_bind_address: Vec<String>,
    /// `ns/name` of the default TLS certificate, empty when none
    pub certificate_name: String,
    /// Extra parameters appended to each `listen` directive
    pub listen_params: Vec<String>,
    /// Directives injected into the server block
    pub server_directives: Vec<String>,
    pub custom_locations: Vec<FtCustomLocation>,
}

impl FtConfig {
    /// Sort custom locations by name. Required before render: output must
    /// not change under input ordering noise, or the proxy reloads for
    /// nothing.
    pub fn sort_locations(&mut self) {
        self.custom_locations.sort_by(|a, b| a.name.cmp(&b.name));
    }
}

/// The complete render input. Same value in, byte-identical text out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NginxTemplateConfig {
    pub name: String,
    pub frontends: BTreeMap<u16, FtConfig>,
    pub settings: NginxSettings,
    pub tweak: TweakFiles,
}

/// Operator tweak payload loaded from the tweak directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TweakFiles {
    pub bind_nic: BindNicConfig,
    pub root_extra: String,
    pub http_extra: String,
    pub stream_extra: String,
}

/// `bind_nic.json`: restrict listeners to the addresses of named
/// interfaces. Empty means bind the wildcard address.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BindNicConfig {
    pub nic: Vec<String>,
}

/// Host interface addresses, supplied by the embedding process.
#[derive(Debug, Clone, Default)]
pub struct NetworkInfo {
    pub interfaces: BTreeMap<String, Vec<IpAddr>>,
}

/// Split bind addresses by family for one listener. Unknown interface
/// names are skipped; no matching address at all falls back to wildcard.
pub fn bind_addresses(
    bind: &BindNicConfig,
    net: &NetworkInfo,
    enable_ipv6: bool,
) -> (Vec<String>, Vec<String>) {
    let wildcard = || {
        (
            vec!["0.0.0.0".to_string()],
            if enable_ipv6 { vec!["[::]".to_string()] } else { Vec::new() },
        )
    };
    if bind.nic.is_empty() {
        return wildcard();
    }

    let mut v4 = Vec::new();
    let mut v6 = Vec::new();
    for nic in &bind.nic {
        let Some(addrs) = net.interfaces.get(nic) else {
            debug!(nic, "bind nic not present on host, skipping");
            continue;
        };
        for addr in addrs {
            match addr {
                IpAddr::V4(a) => v4.push(a.to_string()),
                IpAddr::V6(a) if enable_ipv6 => v6.push(format!("[{}]", a)),
                IpAddr::V6(_) => {}
            }
        }
    }
    v4.sort();
    v4.dedup();
    v6.sort();
    v6.dedup();
    if v4.is_empty() && v6.is_empty() {
        return wildcard();
    }
    (v4, v6)
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::Io(e)),
    }
}

/// Load the tweak directory. An empty `tweak_dir` disables loading; a
/// present-but-broken file is fatal.
pub fn load_tweak_files(tweak_dir: &str) -> Result<TweakFiles> {
    let mut tweak = TweakFiles::default();
    if tweak_dir.is_empty() {
        return Ok(tweak);
    }
    let dir = Path::new(tweak_dir);

    if let Some(raw) = read_optional(&dir.join("bind_nic.json"))? {
        tweak.bind_nic = serde_json::from_str(&raw)?;
    }
    if let Some(text) = read_optional(&dir.join("root_extra.conf"))? {
        tweak.root_extra = text;
    }
    if let Some(text) = read_optional(&dir.join("http_extra.conf"))? {
        tweak.http_extra = text;
    }
    if let Some(text) = read_optional(&dir.join("stream_extra.conf"))? {
        tweak.stream_extra = text;
    }
    Ok(tweak)
}
