//! Access tokens for joining a room.
//!
//! Tokens are HMAC-SHA256 signed grants for one (identity, room) pair:
//!
//! ```text
//! <api_key>.<expires_unix_secs>.<hex(hmac(api_secret, api_key\nidentity\nroom\nexpires))>
//! ```
//!
//! Any process holding the same [`ApiCredentials`] can verify a token
//! without shared state, so the relay and its sessions only need to agree
//! on the key pair.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Default token lifetime.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("API credentials are not configured")]
    NotConfigured,
    #[error("missing parameter: {0}")]
    MissingParameter(&'static str),
    #[error("malformed access token")]
    Malformed,
    #[error("access token expired")]
    Expired,
    #[error("access token does not grant this identity and room")]
    Mismatch,
    #[error("signing failed: {0}")]
    Signing(String),
}

impl CredentialError {
    /// Status text shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            CredentialError::NotConfigured => {
                "Server configuration error: API credentials are missing".to_string()
            }
            CredentialError::MissingParameter(name) => {
                format!("Cannot request access: {name} is required")
            }
            CredentialError::Expired => "Your access has expired, please rejoin".to_string(),
            other => format!("Access denied: {other}"),
        }
    }
}

/// Key pair shared between token issuer and verifier.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct ApiCredentials {
    pub api_key: String,
    pub api_secret: String,
}

impl ApiCredentials {
    pub fn new(api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_secret: api_secret.into(),
        }
    }

    /// Both parts present and non-empty.
    pub fn from_parts(api_key: Option<String>, api_secret: Option<String>) -> Option<Self> {
        match (api_key, api_secret) {
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
                Some(Self::new(key, secret))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Grant to join `room` as `identity` until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessToken {
    pub value: String,
    pub identity: String,
    pub room: String,
    pub expires_at: SystemTime,
}

impl AccessToken {
    pub fn is_expired(&self) -> bool {
        SystemTime::now() >= self.expires_at
    }
}

/// Source of access tokens.
pub trait CredentialIssuer: Send + Sync {
    fn issue(&self, identity: &str, room: &str) -> Result<AccessToken, CredentialError>;

    fn verify(&self, token: &str, identity: &str, room: &str) -> Result<(), CredentialError>;
}

/// Signs tokens with locally configured [`ApiCredentials`].
#[derive(Debug, Clone)]
pub struct LocalTokenIssuer {
    credentials: Option<ApiCredentials>,
    ttl: Duration,
}

impl LocalTokenIssuer {
    pub fn new(credentials: Option<ApiCredentials>) -> Self {
        Self {
            credentials,
            ttl: DEFAULT_TOKEN_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn is_configured(&self) -> bool {
        self.credentials.is_some()
    }

    fn credentials(&self) -> Result<&ApiCredentials, CredentialError> {
        self.credentials.as_ref().ok_or(CredentialError::NotConfigured)
    }
}

fn check_params(identity: &str, room: &str) -> Result<(), CredentialError> {
    if identity.trim().is_empty() {
        return Err(CredentialError::MissingParameter("identity"));
    }
    if room.trim().is_empty() {
        return Err(CredentialError::MissingParameter("room"));
    }
    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn signer(
    creds: &ApiCredentials,
    identity: &str,
    room: &str,
    expires: u64,
) -> Result<HmacSha256, CredentialError> {
    let mut mac = HmacSha256::new_from_slice(creds.api_secret.as_bytes())
        .map_err(|e| CredentialError::Signing(e.to_string()))?;
    // length-prefixed so field boundaries cannot shift between grants
    for field in [creds.api_key.as_bytes(), identity.as_bytes(), room.as_bytes()] {
        mac.update(&(field.len() as u64).to_be_bytes());
        mac.update(field);
    }
    mac.update(&expires.to_be_bytes());
    Ok(mac)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| Some(hex_val(pair[0])? << 4 | hex_val(pair[1])?))
        .collect()
}

fn hex_val(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(10 + c - b'a'),
        b'A'..=b'F' => Some(10 + c - b'A'),
        _ => None,
    }
}

impl CredentialIssuer for LocalTokenIssuer {
    fn issue(&self, identity: &str, room: &str) -> Result<AccessToken, CredentialError> {
        let creds = self.credentials()?;
        check_params(identity, room)?;

        let expires = unix_now() + self.ttl.as_secs();
        let tag = signer(creds, identity, room, expires)?
            .finalize()
            .into_bytes();
        let value = format!("{}.{}.{}", creds.api_key, expires, to_hex(&tag));

        log::debug!("Issued token for {identity} in room {room} (ttl {}s)", self.ttl.as_secs());
        Ok(AccessToken {
            value,
            identity: identity.to_string(),
            room: room.to_string(),
            expires_at: UNIX_EPOCH + Duration::from_secs(expires),
        })
    }

    fn verify(&self, token: &str, identity: &str, room: &str) -> Result<(), CredentialError> {
        let creds = self.credentials()?;
        check_params(identity, room)?;

        // api keys may contain dots; the last two fields never do
        let mut fields = token.rsplitn(3, '.');
        let (Some(tag_hex), Some(expires), Some(key)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(CredentialError::Malformed);
        };
        let expires: u64 = expires.parse().map_err(|_| CredentialError::Malformed)?;
        let tag = from_hex(tag_hex).ok_or(CredentialError::Malformed)?;

        if key != creds.api_key {
            return Err(CredentialError::Mismatch);
        }
        signer(creds, identity, room, expires)?
            .verify_slice(&tag)
            .map_err(|_| CredentialError::Mismatch)?;
        if unix_now() >= expires {
            return Err(CredentialError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> LocalTokenIssuer {
        LocalTokenIssuer::new(Some(ApiCredentials::new("devkey", "devsecret")))
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = issuer();
        let token = issuer.issue("notary", "notary-room").unwrap();
        assert_eq!(token.identity, "notary");
        assert!(!token.is_expired());
        assert!(token.value.starts_with("devkey."));
        issuer.verify(&token.value, "notary", "notary-room").unwrap();
    }

    #[test]
    fn test_unconfigured_issuer() {
        let issuer = LocalTokenIssuer::new(None);
        assert!(!issuer.is_configured());
        assert_eq!(
            issuer.issue("notary", "room"),
            Err(CredentialError::NotConfigured)
        );
    }

    #[test]
    fn test_missing_parameters() {
        let issuer = issuer();
        assert_eq!(
            issuer.issue("", "room"),
            Err(CredentialError::MissingParameter("identity"))
        );
        assert_eq!(
            issuer.issue("notary", "  "),
            Err(CredentialError::MissingParameter("room"))
        );
    }

    #[test]
    fn test_token_bound_to_identity_and_room() {
        let issuer = issuer();
        let token = issuer.issue("notary", "room-a").unwrap();
        assert_eq!(
            issuer.verify(&token.value, "client", "room-a"),
            Err(CredentialError::Mismatch)
        );
        assert_eq!(
            issuer.verify(&token.value, "notary", "room-b"),
            Err(CredentialError::Mismatch)
        );
    }

    #[test]
    fn test_grant_fields_cannot_shift() {
        let issuer = issuer();
        let token = issuer.issue("a\nb", "c").unwrap();
        issuer.verify(&token.value, "a\nb", "c").unwrap();
        assert_eq!(
            issuer.verify(&token.value, "a", "b\nc"),
            Err(CredentialError::Mismatch)
        );
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = issuer().issue("notary", "room").unwrap();
        let other = LocalTokenIssuer::new(Some(ApiCredentials::new("devkey", "other")));
        assert_eq!(
            other.verify(&token.value, "notary", "room"),
            Err(CredentialError::Mismatch)
        );
    }

    #[test]
    fn test_shared_credentials_verify_across_instances() {
        let token = issuer().issue("client", "room").unwrap();
        issuer().verify(&token.value, "client", "room").unwrap();
    }

    #[test]
    fn test_expired_token() {
        let issuer = issuer().with_ttl(Duration::ZERO);
        let token = issuer.issue("notary", "room").unwrap();
        assert!(token.is_expired());
        assert_eq!(
            issuer.verify(&token.value, "notary", "room"),
            Err(CredentialError::Expired)
        );
    }

    #[test]
    fn test_malformed_tokens() {
        let issuer = issuer();
        for token in ["", "nodots", "devkey.notanumber.abcd", "devkey.1.xyz", "devkey.1.abc"] {
            assert_eq!(
                issuer.verify(token, "notary", "room"),
                Err(CredentialError::Malformed),
                "{token}"
            );
        }
    }

    #[test]
    fn test_from_parts() {
        assert!(ApiCredentials::from_parts(Some("k".into()), Some("s".into())).is_some());
        assert!(ApiCredentials::from_parts(Some("k".into()), None).is_none());
        assert!(ApiCredentials::from_parts(Some(String::new()), Some("s".into())).is_none());
    }

    #[test]
    fn test_secret_not_in_debug() {
        let creds = ApiCredentials::new("key", "hunter2");
        assert!(!format!("{creds:?}").contains("hunter2"));
    }

    #[test]
    fn test_user_messages() {
        assert!(CredentialError::NotConfigured
            .user_message()
            .contains("configuration"));
        assert!(CredentialError::Mismatch.user_message().starts_with("Access denied"));
    }
}
