//! Token service: issues and resolves signed and opaque bearer tokens.
//!
//! The kind of a presented token is derived from its structure alone. A signed
//! token is a compact JWS (three non-empty `.`-separated segments). An opaque
//! token is unpadded base64url over a tag byte followed by the secret, and its
//! alphabet has no `.`, so the two encodings cannot collide.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use super::error::AuthError;
use super::metrics;
use super::store::{TokenStore, UserStore};
use crate::clock::Clock;
use crate::config::TokenConfig;
use crate::models::{
    Audience, IssuedToken, OpaqueToken, SignedClaims, TokenKind, TokenPair, UserId,
};

/// First byte of every decoded opaque token.
pub const OPAQUE_TAG: u8 = 0x4F;
/// Random bytes in an opaque token secret.
pub const OPAQUE_SECRET_LEN: usize = 32;

/// A presented token, classified by its encoding.
#[derive(Debug, PartialEq, Eq)]
pub enum RawToken<'a> {
    Signed(&'a str),
    Opaque([u8; OPAQUE_SECRET_LEN]),
}

impl<'a> RawToken<'a> {
    pub fn parse(raw: &'a str) -> Result<Self, AuthError> {
        let segments: Vec<&str> = raw.split('.').collect();
        if segments.len() == 3 && segments.iter().all(|s| !s.is_empty()) {
            return Ok(RawToken::Signed(raw));
        }
        if segments.len() != 1 {
            return Err(AuthError::TokenInvalid);
        }

        let bytes = URL_SAFE_NO_PAD
            .decode(raw)
            .map_err(|_| AuthError::TokenInvalid)?;
        match bytes.split_first() {
            Some((&OPAQUE_TAG, secret)) if secret.len() == OPAQUE_SECRET_LEN => {
                let mut out = [0u8; OPAQUE_SECRET_LEN];
                out.copy_from_slice(secret);
                Ok(RawToken::Opaque(out))
            }
            _ => Err(AuthError::TokenInvalid),
        }
    }
}

fn expiry_after(now: DateTime<Utc>, lifetime: Duration) -> Result<DateTime<Utc>, AuthError> {
    now.checked_add_signed(lifetime)
        .ok_or_else(|| AuthError::internal(format!("token lifetime {} out of range", lifetime)))
}

fn encode_opaque(secret: &[u8; OPAQUE_SECRET_LEN]) -> String {
    let mut bytes = Vec::with_capacity(1 + OPAQUE_SECRET_LEN);
    bytes.push(OPAQUE_TAG);
    bytes.extend_from_slice(secret);
    URL_SAFE_NO_PAD.encode(bytes)
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    access_token_expiry: Duration,
    refresh_token_expiry: Duration,
    opaque_token_expiry: Duration,
    store: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(
        config: &TokenConfig,
        store: Arc<dyn TokenStore>,
        users: Arc<dyn UserStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let key = config.signing_key.expose_secret().as_bytes();

        // Time window and audience are checked against the injected clock instead.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        Self {
            encoding_key: EncodingKey::from_secret(key),
            decoding_key: DecodingKey::from_secret(key),
            validation,
            access_token_expiry: Duration::try_minutes(config.access_token_expiry_minutes)
                .unwrap_or(Duration::MAX),
            refresh_token_expiry: Duration::try_days(config.refresh_token_expiry_days)
                .unwrap_or(Duration::MAX),
            opaque_token_expiry: Duration::try_days(config.opaque_token_expiry_days)
                .unwrap_or(Duration::MAX),
            store,
            users,
            clock,
        }
    }

    pub fn access_token_expiry(&self) -> Duration {
        self.access_token_expiry
    }

    pub fn opaque_token_expiry(&self) -> Duration {
        self.opaque_token_expiry
    }

    /// Issues a token of `kind` for `user_id`, valid for `lifetime`.
    pub async fn issue(
        &self,
        kind: TokenKind,
        user_id: UserId,
        lifetime: Duration,
    ) -> Result<IssuedToken, AuthError> {
        match kind {
            TokenKind::Signed => self.issue_signed(user_id, Audience::Access, lifetime),
            TokenKind::Opaque => self.issue_opaque(user_id, Some(lifetime)).await,
        }
    }

    pub fn issue_signed(
        &self,
        user_id: UserId,
        audience: Audience,
        lifetime: Duration,
    ) -> Result<IssuedToken, AuthError> {
        let now = self.clock.now();
        let exp = expiry_after(now, lifetime)?;

        let claims = SignedClaims {
            sub: user_id.to_string(),
            aud: audience,
            iat: now.timestamp(),
            nbf: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::internal(format!("Failed to encode token: {}", e)))?;

        metrics::record_token_issued(TokenKind::Signed);
        Ok(IssuedToken {
            token,
            kind: TokenKind::Signed,
            expires_at: Some(exp),
        })
    }

    /// Issues an opaque token. `lifetime = None` never expires.
    ///
    /// The record is persisted before the token is returned; a failed write
    /// yields no token.
    pub async fn issue_opaque(
        &self,
        user_id: UserId,
        lifetime: Option<Duration>,
    ) -> Result<IssuedToken, AuthError> {
        let mut secret = [0u8; OPAQUE_SECRET_LEN];
        OsRng.fill_bytes(&mut secret);

        let now = self.clock.now();
        let expiry = lifetime.map(|l| expiry_after(now, l)).transpose()?;
        let record = OpaqueToken::new(user_id, &secret, now, expiry);

        self.store.create(&record).await.map_err(|e| {
            AuthError::InternalError(anyhow::anyhow!("Failed to persist opaque token: {}", e))
        })?;

        metrics::record_token_issued(TokenKind::Opaque);
        Ok(IssuedToken {
            token: encode_opaque(&secret),
            kind: TokenKind::Opaque,
            expires_at: expiry,
        })
    }

    /// Signed access token plus signed refresh token.
    pub fn issue_token_pair(&self, user_id: UserId) -> Result<TokenPair, AuthError> {
        let access = self.issue_signed(user_id, Audience::Access, self.access_token_expiry)?;
        let refresh = self.issue_signed(user_id, Audience::Refresh, self.refresh_token_expiry)?;

        Ok(TokenPair {
            access_token: access.token,
            refresh_token: refresh.token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry.num_seconds(),
        })
    }

    /// Resolves an access token of either kind to its owner.
    pub async fn resolve(&self, raw: &str) -> Result<UserId, AuthError> {
        let user_id = match RawToken::parse(raw)? {
            RawToken::Signed(jws) => self.validate_signed(jws, Audience::Access)?,
            RawToken::Opaque(secret) => self.validate_opaque(&secret).await?,
        };
        self.ensure_user_exists(user_id).await?;
        Ok(user_id)
    }

    /// Exchanges a signed refresh token for a new access token.
    pub async fn refresh(&self, raw_refresh: &str) -> Result<IssuedToken, AuthError> {
        let user_id = match RawToken::parse(raw_refresh)? {
            RawToken::Signed(jws) => self.validate_signed(jws, Audience::Refresh)?,
            RawToken::Opaque(_) => return Err(AuthError::TokenInvalid),
        };
        self.ensure_user_exists(user_id).await?;
        self.issue_signed(user_id, Audience::Access, self.access_token_expiry)
    }

    fn validate_signed(&self, jws: &str, audience: Audience) -> Result<UserId, AuthError> {
        let claims = decode::<SignedClaims>(jws, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!("Signed token rejected: {}", e);
                AuthError::TokenInvalid
            })?
            .claims;

        let now = self.clock.now().timestamp();
        if now < claims.nbf || now > claims.exp {
            return Err(AuthError::TokenInvalid);
        }
        if claims.aud != audience {
            return Err(AuthError::TokenInvalid);
        }

        claims.sub.parse().map_err(|_| AuthError::TokenInvalid)
    }

    async fn validate_opaque(&self, secret: &[u8]) -> Result<UserId, AuthError> {
        let hash = OpaqueToken::hash_secret(secret);
        let record = self
            .store
            .find_by_secret_hash(&hash)
            .await?
            .ok_or(AuthError::TokenInvalid)?;

        if record.is_expired(self.clock.now()) {
            return Err(AuthError::TokenInvalid);
        }
        Ok(record.user_id)
    }

    async fn ensure_user_exists(&self, user_id: UserId) -> Result<(), AuthError> {
        if self.users.exists(user_id).await? {
            Ok(())
        } else {
            Err(AuthError::TokenInvalid)
        }
    }

    /// Removes expired opaque token records.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        Ok(self.store.purge_expired(self.clock.now()).await?)
    }
}
