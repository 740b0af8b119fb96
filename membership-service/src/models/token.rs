//! Token models - signed claims, opaque token records and issuance responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

use super::{TokenId, UserId};

/// How a token is represented. Chosen by the caller at issuance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    /// Self-contained JWT, validated by signature and time window.
    Signed,
    /// Random secret, validated against the token store.
    Opaque,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Signed => "signed",
            TokenKind::Opaque => "opaque",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown token kind: {0}")]
pub struct UnknownTokenKind(pub String);

impl FromStr for TokenKind {
    type Err = UnknownTokenKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "signed" => Ok(TokenKind::Signed),
            "opaque" => Ok(TokenKind::Opaque),
            other => Err(UnknownTokenKind(other.to_string())),
        }
    }
}

/// What a signed token may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Access,
    Refresh,
}

/// Claims embedded in a signed token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedClaims {
    pub sub: String,
    pub aud: Audience,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
    pub jti: String,
}

/// Persisted record behind an opaque token. Only the hash of the secret is stored.
#[derive(Debug, Clone, FromRow)]
pub struct OpaqueToken {
    pub token_id: TokenId,
    pub user_id: UserId,
    pub secret_hash: String,
    pub expires: bool,
    pub expiry_utc: DateTime<Utc>,
    pub created_utc: DateTime<Utc>,
}

impl OpaqueToken {
    /// `expiry_utc = None` issues a non-expiring token.
    pub fn new(
        user_id: UserId,
        secret: &[u8],
        now: DateTime<Utc>,
        expiry_utc: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            token_id: TokenId::new(),
            user_id,
            secret_hash: Self::hash_secret(secret),
            expires: expiry_utc.is_some(),
            expiry_utc: expiry_utc.unwrap_or(now),
            created_utc: now,
        }
    }

    /// SHA-256 hex digest of the secret bytes.
    pub fn hash_secret(secret: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(secret);
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires && now > self.expiry_utc
    }
}

/// A freshly issued token as handed to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub kind: TokenKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Access plus refresh token, returned by login.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}
