//! # Data Model
//!
//! Input records (ALB / Frontend / Rule / ingress-style origins), the
//! mid-pipeline [`InternalRule`] representation, and the output policy
//! document consumed by the data plane.
//!
//! Every serialized map is a `BTreeMap` so the policy document is
//! byte-stable under the same logical input.

mod input;
mod internal;
mod matches;
mod policy;

pub use input::*;
pub use internal::*;
pub use matches::*;
pub use policy::*;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::RouteError;

/// Listener protocol. `Tcp`/`Udp` are stream (L4) mode, the rest L7.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FtProtocol {
    #[default]
    Http,
    Https,
    Tcp,
    Udp,
}

impl FtProtocol {
    pub fn is_http_mode(&self) -> bool {
        matches!(self, FtProtocol::Http | FtProtocol::Https)
    }

    pub fn is_stream_mode(&self) -> bool {
        matches!(self, FtProtocol::Tcp | FtProtocol::Udp)
    }
}

impl fmt::Display for FtProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FtProtocol::Http => "http",
            FtProtocol::Https => "https",
            FtProtocol::Tcp => "tcp",
            FtProtocol::Udp => "udp",
        };
        f.write_str(s)
    }
}

/// namespace/name key for an external object (secret, configmap).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new<S: Into<String>, N: Into<String>>(namespace: S, name: N) -> Self {
        Self { namespace: namespace.into(), name: name.into() }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

impl FromStr for ObjectKey {
    type Err = RouteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((ns, name)) if !ns.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(ObjectKey::new(ns, name))
            }
            _ => Err(RouteError::InvalidObjectKey(s.to_string())),
        }
    }
}

/// A `ns/name#section` reference into one configmap key.
pub fn parse_cm_ref(reference: &str) -> Result<(ObjectKey, String), RouteError> {
    let (key_part, section) = reference
        .split_once('#')
        .ok_or_else(|| RouteError::InvalidObjectKey(reference.to_string()))?;
    if section.is_empty() {
        return Err(RouteError::InvalidObjectKey(reference.to_string()));
    }
    let key = ObjectKey::from_str(key_part)?;
    Ok((key, section.to_string()))
}

/// Opaque secret payload, as fetched by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Secret {
    pub data: BTreeMap<String, Vec<u8>>,
}

/// Configmap payload, as fetched by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigMap {
    pub data: BTreeMap<String, String>,
}

/// Resolved external objects, fetched in bulk between reference collection
/// and policy synthesis.
#[derive(Debug, Clone, Default)]
pub struct RefMap {
    pub secrets: BTreeMap<ObjectKey, Secret>,
    pub config_maps: BTreeMap<ObjectKey, ConfigMap>,
}

/// The set of external objects a pass needs; output of the
/// reference-collection stage, input to the caller's bulk fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefSet {
    pub secrets: BTreeSet<ObjectKey>,
    pub config_maps: BTreeSet<ObjectKey>,
}

/// Originating ingress-style resource of a synthesized rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    #[serde(rename = "type")]
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl Source {
    pub fn ingress<S: Into<String>, N: Into<String>>(namespace: S, name: N) -> Self {
        Self { kind: "ingress".to_string(), namespace: namespace.into(), name: name.into() }
    }
}
