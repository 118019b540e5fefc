//! Signature-agent key directories.
//!
//! A signature agent publishes its signing keys as a JWK set at a
//! discoverable HTTPS URL. [`KeyDirectory`] abstracts the lookup so the
//! verifier can be exercised without network I/O; [`HttpKeyDirectory`] is
//! the production implementation with caching and fetch caps.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as b64url;
use dashmap::DashMap;
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{Duration, Instant};
use url::{Host, Url};

/// Expected content type of a key directory response.
pub const DIRECTORY_CONTENT_TYPE: &str = "application/http-message-signatures-directory+json";

/// Maximum accepted directory body size.
pub const MAX_DIRECTORY_BYTES: usize = 64 * 1024;

/// Maximum age of a cached directory.
pub const DIRECTORY_CACHE_TTL: Duration = Duration::from_secs(60);

/// Per-fetch deadline.
pub const DIRECTORY_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Error produced by directory resolution.
#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("signature agent url does not parse: {0}")]
    InvalidAgentUrl(#[from] url::ParseError),
    #[error("signature agent url scheme {0} is not allowed")]
    SchemeNotAllowed(String),
    #[error("directory fetch failed: {0}")]
    Fetch(String),
    #[error("directory content type {0:?} is not {DIRECTORY_CONTENT_TYPE}")]
    ContentType(Option<String>),
    #[error("directory body exceeds {MAX_DIRECTORY_BYTES} bytes")]
    TooLarge,
    #[error("directory body is not a JWK set: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Strips the surrounding double quotes of a `Signature-Agent` header value
/// and parses the URL inside.
pub fn agent_url(signature_agent: &str) -> Result<Url, DirectoryError> {
    let trimmed = signature_agent
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(signature_agent);
    Ok(Url::parse(trimmed)?)
}

/// A JSON Web Key as published in a signature-agent directory.
///
/// Only `OKP`/`Ed25519` keys participate in verification; other key types
/// are carried but never selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    /// Key type; must be `OKP` for Ed25519.
    pub kty: String,
    /// Curve name; must be `Ed25519`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
    /// Public key bytes, base64url without padding.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
}

impl Jwk {
    /// Wraps an Ed25519 verifying key as a directory JWK.
    pub fn from_ed25519(key: &VerifyingKey) -> Self {
        Jwk {
            kty: "OKP".into(),
            crv: Some("Ed25519".into()),
            x: Some(b64url.encode(key.as_bytes())),
        }
    }

    /// RFC 7638 thumbprint: SHA-256 over the canonical JSON of the required
    /// members (`crv`, `kty`, `x`; keys sorted, no whitespace), base64url
    /// without padding.
    ///
    /// Returns `None` for anything that is not an Ed25519 OKP key.
    pub fn thumbprint(&self) -> Option<String> {
        let crv = self.crv.as_deref()?;
        let x = self.x.as_deref()?;
        if self.kty != "OKP" || crv != "Ed25519" {
            return None;
        }
        let canonical = format!("{{\"crv\":\"{crv}\",\"kty\":\"{}\",\"x\":\"{x}\"}}", self.kty);
        let digest = Sha256::digest(canonical.as_bytes());
        Some(b64url.encode(digest))
    }

    /// Decodes the public key bytes into a verifying key.
    pub fn verifying_key(&self) -> Option<VerifyingKey> {
        let x = self.x.as_deref()?;
        let bytes = b64url.decode(x).ok()?;
        let bytes: [u8; 32] = bytes.try_into().ok()?;
        VerifyingKey::from_bytes(&bytes).ok()
    }
}

/// A key directory body: `{ "keys": [ JWK, ... ] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// Resolves a signature agent URL into its published keys.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    /// Fetches the agent's key set.
    async fn fetch(&self, agent: &Url) -> Result<Vec<Jwk>, DirectoryError>;

    /// Drops any cached entry for the agent.
    ///
    /// Called after a lookup failure so a rotated key is picked up on the
    /// next attempt.
    fn invalidate(&self, _agent: &Url) {}
}

/// Production key directory: HTTPS fetch with caching and caps.
///
/// `http://` agents are accepted only when `allow_loopback` is set and the
/// URL host is a loopback address; this exists for tests and local
/// development.
pub struct HttpKeyDirectory {
    client: reqwest::Client,
    cache: DashMap<Url, (Instant, Vec<Jwk>)>,
    allow_loopback: bool,
}

impl HttpKeyDirectory {
    /// Creates a directory resolver with the default fetch deadline.
    pub fn new(allow_loopback: bool) -> Self {
        let client = reqwest::Client::builder()
            .timeout(DIRECTORY_FETCH_TIMEOUT)
            .build()
            .expect("reqwest client construction does not fail with static options");
        Self {
            client,
            cache: DashMap::new(),
            allow_loopback,
        }
    }

    fn check_scheme(&self, agent: &Url) -> Result<(), DirectoryError> {
        match agent.scheme() {
            "https" => Ok(()),
            "http" if self.allow_loopback && is_loopback(agent) => Ok(()),
            other => Err(DirectoryError::SchemeNotAllowed(other.to_string())),
        }
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => ip.is_loopback(),
        Some(Host::Ipv6(ip)) => ip.is_loopback(),
        Some(Host::Domain(domain)) => domain == "localhost",
        None => false,
    }
}

#[async_trait]
impl KeyDirectory for HttpKeyDirectory {
    async fn fetch(&self, agent: &Url) -> Result<Vec<Jwk>, DirectoryError> {
        self.check_scheme(agent)?;

        if let Some(entry) = self.cache.get(agent) {
            let (fetched_at, keys) = entry.value();
            if fetched_at.elapsed() < DIRECTORY_CACHE_TTL {
                return Ok(keys.clone());
            }
        }

        let response = self
            .client
            .get(agent.clone())
            .send()
            .await
            .map_err(|e| DirectoryError::Fetch(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DirectoryError::Fetch(format!(
                "directory responded {}",
                response.status()
            )));
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let matches = content_type
            .as_deref()
            .is_some_and(|ct| ct.split(';').next().map(str::trim) == Some(DIRECTORY_CONTENT_TYPE));
        if !matches {
            return Err(DirectoryError::ContentType(content_type));
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_DIRECTORY_BYTES as u64)
        {
            return Err(DirectoryError::TooLarge);
        }
        let body = response
            .bytes()
            .await
            .map_err(|e| DirectoryError::Fetch(e.to_string()))?;
        if body.len() > MAX_DIRECTORY_BYTES {
            return Err(DirectoryError::TooLarge);
        }
        let set: JwkSet = serde_json::from_slice(&body)?;

        tracing::debug!(agent = %agent, keys = set.keys.len(), "fetched signature agent directory");
        self.cache
            .insert(agent.clone(), (Instant::now(), set.keys.clone()));
        Ok(set.keys)
    }

    fn invalidate(&self, agent: &Url) {
        self.cache.remove(agent);
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::SigningKey;

    #[test]
    fn test_agent_url_strips_quotes() {
        let url = agent_url("\"https://agent.example/directory\"").unwrap();
        assert_eq!(url.as_str(), "https://agent.example/directory");
        // Unquoted input is tolerated.
        assert!(agent_url("https://agent.example").is_ok());
    }

    #[test]
    fn test_thumbprint_known_vector() {
        // RFC 8037 appendix A.2 public key.
        let jwk = Jwk {
            kty: "OKP".into(),
            crv: Some("Ed25519".into()),
            x: Some("11qYAYKxCrfVS_7TyWQHOg7hcvPapiMlrwIaaPcHURo".into()),
        };
        assert_eq!(
            jwk.thumbprint().unwrap(),
            "kPrK_qmxVWaYVA9wwBF6Iuo3vVzz7TxHCTwXBygrS4k"
        );
    }

    #[test]
    fn test_thumbprint_rejects_non_ed25519() {
        let rsa = Jwk {
            kty: "RSA".into(),
            crv: None,
            x: None,
        };
        assert!(rsa.thumbprint().is_none());

        let p256 = Jwk {
            kty: "OKP".into(),
            crv: Some("P-256".into()),
            x: Some("AAAA".into()),
        };
        assert!(p256.thumbprint().is_none());
    }

    #[test]
    fn test_verifying_key_roundtrip() {
        let key = SigningKey::from_bytes(&[3u8; 32]);
        let jwk = Jwk::from_ed25519(&key.verifying_key());
        assert_eq!(jwk.verifying_key().unwrap(), key.verifying_key());
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback(&Url::parse("http://127.0.0.1:8402/x").unwrap()));
        assert!(is_loopback(&Url::parse("http://localhost/x").unwrap()));
        assert!(!is_loopback(&Url::parse("http://agent.example/x").unwrap()));
    }

    #[test]
    fn test_http_directory_scheme_policy() {
        let strict = HttpKeyDirectory::new(false);
        assert!(strict
            .check_scheme(&Url::parse("https://agent.example").unwrap())
            .is_ok());
        assert!(strict
            .check_scheme(&Url::parse("http://127.0.0.1:8402").unwrap())
            .is_err());

        let relaxed = HttpKeyDirectory::new(true);
        assert!(relaxed
            .check_scheme(&Url::parse("http://127.0.0.1:8402").unwrap())
            .is_ok());
        assert!(relaxed
            .check_scheme(&Url::parse("http://agent.example").unwrap())
            .is_err());
    }
}
