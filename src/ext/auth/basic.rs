//! Basic auth: htpasswd-style credentials held in a secret.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::annotations::{FieldSpec, ResolveAnnotations};
use crate::errors::RouteError;
use crate::types::{ObjectKey, Secret};

/// CR-level basic-auth config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuthCr {
    /// Only "basic" is recognized
    pub auth_type: String,
    /// `ns/name` of the credential secret
    pub secret: String,
    /// "auth-file" (single htpasswd entry under the `auth` key) or
    /// "auth-map" (one key per user, base64-encoded hash values)
    pub secret_type: String,
    pub realm: String,
}

impl BasicAuthCr {
    pub fn is_active(&self) -> bool {
        self.auth_type == "basic" && !self.secret.is_empty()
    }
}

impl ResolveAnnotations for BasicAuthCr {
    fn fields() -> &'static [FieldSpec<Self>] {
        &[
            FieldSpec { suffix: "auth-type", default: "", set: |t, v| t.auth_type = v },
            FieldSpec { suffix: "auth-secret", default: "", set: |t, v| t.secret = v },
            FieldSpec {
                suffix: "auth-secret-type",
                default: "auth-file",
                set: |t, v| t.secret_type = v,
            },
            FieldSpec { suffix: "auth-realm", default: "", set: |t, v| t.realm = v },
        ]
    }
}

/// One parsed `$apr1$salt$hash` credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashedCredential {
    pub algorithm: String,
    pub salt: String,
    pub hash: String,
}

/// Resolved basic-auth as the data plane consumes it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicAuthPolicy {
    pub realm: String,
    /// user name → credential
    pub users: BTreeMap<String, HashedCredential>,
}

/// Parse an apr1 (htpasswd MD5) hash string.
fn parse_apr1(value: &str) -> Result<HashedCredential, RouteError> {
    let rest = value
        .strip_prefix("$apr1$")
        .ok_or_else(|| RouteError::InvalidSecret(format!("unsupported hash format {:?}", value)))?;
    let (salt, hash) = rest
        .split_once('$')
        .ok_or_else(|| RouteError::InvalidSecret("missing salt/hash separator".to_string()))?;
    if salt.is_empty() || hash.is_empty() {
        return Err(RouteError::InvalidSecret("empty salt or hash".to_string()));
    }
    Ok(HashedCredential {
        algorithm: "apr1".to_string(),
        salt: salt.to_string(),
        hash: hash.to_string(),
    })
}

/// Parse one `name:$apr1$...` htpasswd line.
fn parse_entry(line: &str) -> Result<(String, HashedCredential), RouteError> {
    let (name, value) = line
        .split_once(':')
        .ok_or_else(|| RouteError::InvalidSecret(format!("malformed entry {:?}", line)))?;
    if name.is_empty() {
        return Err(RouteError::InvalidSecret("empty user name".to_string()));
    }
    Ok((name.to_string(), parse_apr1(value.trim())?))
}

/// Parse the credential secret according to its declared mode.
pub fn parse_secret(
    cr: &BasicAuthCr,
    key: &ObjectKey,
    secret: &Secret,
) -> Result<BasicAuthPolicy, RouteError> {
    let mut users = BTreeMap::new();
    match cr.secret_type.as_str() {
        "auth-map" => {
            for (name, raw) in &secret.data {
                let decoded = base64::engine::general_purpose::STANDARD
                    .decode(raw)
                    .map_err(|e| RouteError::InvalidSecret(format!("user {:?}: {}", name, e)))?;
                let value = String::from_utf8(decoded).map_err(|_| {
                    RouteError::InvalidSecret(format!("user {:?}: hash is not utf-8", name))
                })?;
                users.insert(name.clone(), parse_apr1(value.trim())?);
            }
        }
        // auth-file is the default mode.
        _ => {
            let raw = secret.data.get("auth").ok_or_else(|| {
                RouteError::InvalidSecret(format!("secret {} has no auth key", key))
            })?;
            let text = std::str::from_utf8(raw)
                .map_err(|_| RouteError::InvalidSecret("auth data is not utf-8".to_string()))?;
            for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
                let (name, credential) = parse_entry(line)?;
                users.insert(name, credential);
            }
        }
    }
    if users.is_empty() {
        return Err(RouteError::InvalidSecret("no credentials found".to_string()));
    }
    Ok(BasicAuthPolicy { realm: cr.realm.clone(), users })
}

#[cfg(test)]
mod tests {
    use super::*;

    const APR1: &str = "$apr1$z1bm0g9a$lkXjMIHDUdlE9r3mCGpEy1";

    fn key() -> ObjectKey {
        ObjectKey::new("default", "creds")
    }

    #[test]
    fn test_auth_file_mode() {
        let cr = BasicAuthCr {
            auth_type: "basic".into(),
            secret: "default/creds".into(),
            secret_type: "auth-file".into(),
            realm: "restricted".into(),
        };
        let mut secret = Secret::default();
        secret.data.insert("auth".into(), format!("alice:{}", APR1).into_bytes());

        let policy = parse_secret(&cr, &key(), &secret).unwrap();
        assert_eq!(policy.realm, "restricted");
        let cred = policy.users.get("alice").unwrap();
        assert_eq!(cred.algorithm, "apr1");
        assert_eq!(cred.salt, "z1bm0g9a");
        assert_eq!(cred.hash, "lkXjMIHDUdlE9r3mCGpEy1");
    }

    #[test]
    fn test_auth_map_mode_decodes_base64() {
        let cr = BasicAuthCr { secret_type: "auth-map".into(), ..Default::default() };
        let mut secret = Secret::default();
        let encoded = base64::engine::general_purpose::STANDARD.encode(APR1);
        secret.data.insert("bob".into(), encoded.into_bytes());

        let policy = parse_secret(&cr, &key(), &secret).unwrap();
        assert!(policy.users.contains_key("bob"));
    }

    #[test]
    fn test_rejects_unsupported_hash() {
        let cr = BasicAuthCr::default();
        let mut secret = Secret::default();
        secret.data.insert("auth".into(), b"alice:{SHA}xxxx".to_vec());
        assert!(matches!(
            parse_secret(&cr, &key(), &secret),
            Err(RouteError::InvalidSecret(_))
        ));
    }

    #[test]
    fn test_rejects_missing_auth_key() {
        let cr = BasicAuthCr::default();
        let secret = Secret::default();
        let err = parse_secret(&cr, &key(), &secret).unwrap_err();
        assert!(err.to_string().contains("no auth key"));
    }

    #[test]
    fn test_rejects_malformed_entry() {
        let cr = BasicAuthCr::default();
        let mut secret = Secret::default();
        secret.data.insert("auth".into(), b"no-colon-here".to_vec());
        assert!(parse_secret(&cr, &key(), &secret).is_err());

        secret.data.insert("auth".into(), format!(":{}", APR1).into_bytes());
        assert!(parse_secret(&cr, &key(), &secret).is_err());
    }
}
