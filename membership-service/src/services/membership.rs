//! The membership core: every operation the HTTP layer (or any other caller) uses.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use validator::ValidateEmail;

use super::credentials::CredentialVerifier;
use super::error::{AuthError, StoreError};
use super::groups::GroupService;
use super::invites::InviteService;
use super::metrics;
use super::roles::RoleService;
use super::store::Stores;
use super::tokens::TokenService;
use crate::clock::Clock;
use crate::config::MembershipConfig;
use crate::models::user::normalize_email;
use crate::models::{
    Capabilities, Group, GroupId, Invite, InviteId, IssuedToken, Membership, RoleId, TokenKind,
    TokenPair, User, UserId,
};
use crate::utils::Password;

#[derive(Clone)]
pub struct MembershipCore {
    stores: Stores,
    credentials: CredentialVerifier,
    tokens: TokenService,
    roles: RoleService,
    groups: GroupService,
    invites: InviteService,
    operation_timeout: std::time::Duration,
}

impl MembershipCore {
    pub fn new(config: &MembershipConfig, stores: Stores, clock: Arc<dyn Clock>) -> Self {
        let credentials = CredentialVerifier::new(&config.credentials);
        let tokens = TokenService::new(
            &config.tokens,
            stores.tokens.clone(),
            stores.users.clone(),
            clock,
        );
        let roles = RoleService::new(stores.roles.clone(), stores.groups.clone());
        let groups = GroupService::new(stores.groups.clone(), stores.roles.clone());
        let invites =
            InviteService::new(stores.invites.clone(), stores.groups.clone(), roles.clone());

        Self {
            stores,
            credentials,
            tokens,
            roles,
            groups,
            invites,
            operation_timeout: config.store.operation_timeout(),
        }
    }

    /// Runs `fut` under the operation deadline and records its latency.
    async fn bounded<T, F>(&self, operation: &'static str, fut: F) -> Result<T, AuthError>
    where
        F: Future<Output = Result<T, AuthError>>,
    {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.operation_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::internal(format!(
                "{} timed out after {:?}",
                operation, self.operation_timeout
            ))),
        };
        metrics::observe_operation(operation, started.elapsed().as_secs_f64());

        if let Err(AuthError::InternalError(e)) = &result {
            tracing::error!(operation, "Internal failure: {:#}", e);
        }
        result
    }

    // ==================== Credentials ====================

    #[tracing::instrument(skip(self, password))]
    pub async fn register_user(&self, email: &str, password: &Password) -> Result<User, AuthError> {
        self.bounded("register_user", async {
            let email = normalize_email(email);
            if !email.validate_email() {
                return Err(AuthError::EmailInvalid);
            }
            if self.stores.users.find_by_email(&email).await?.is_some() {
                return Err(AuthError::EmailAlreadyInUse);
            }

            self.credentials.validate_strength(password)?;
            let password_hash = self.credentials.hash(password).await?;

            let user = User::new(&email, password_hash.into_string());
            self.stores.users.create(&user).await.map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::EmailAlreadyInUse,
                other => other.into(),
            })?;

            tracing::info!(user_id = %user.user_id, "User registered");
            Ok(user)
        })
        .await
    }

    async fn authenticate(&self, email: &str, password: &Password) -> Result<User, AuthError> {
        let email = normalize_email(email);
        let user = match self.stores.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                metrics::record_auth_failure(AuthError::BadCredentials.kind());
                return Err(AuthError::BadCredentials);
            }
        };

        if !self.credentials.verify(&user.password_hash, password).await? {
            metrics::record_auth_failure(AuthError::BadCredentials.kind());
            return Err(AuthError::BadCredentials);
        }
        Ok(user)
    }

    /// Verifies credentials and issues a single token of the requested kind.
    #[tracing::instrument(skip(self, password))]
    pub async fn issue_token(
        &self,
        email: &str,
        password: &Password,
        kind: &str,
    ) -> Result<IssuedToken, AuthError> {
        self.bounded("issue_token", async {
            let kind: TokenKind = kind
                .parse()
                .map_err(|_| AuthError::BadTokenKind(kind.to_string()))?;
            let user = self.authenticate(email, password).await?;

            let lifetime = match kind {
                TokenKind::Signed => self.tokens.access_token_expiry(),
                TokenKind::Opaque => self.tokens.opaque_token_expiry(),
            };
            self.tokens.issue(kind, user.user_id, lifetime).await
        })
        .await
    }

    /// Verifies credentials and issues a signed access/refresh pair.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &Password) -> Result<TokenPair, AuthError> {
        self.bounded("login", async {
            let user = self.authenticate(email, password).await?;
            self.tokens.issue_token_pair(user.user_id)
        })
        .await
    }

    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self, refresh_token: &str) -> Result<IssuedToken, AuthError> {
        self.bounded("refresh", async {
            self.tokens.refresh(refresh_token).await.inspect_err(|e| {
                metrics::record_auth_failure(e.kind());
            })
        })
        .await
    }

    /// Resolves a presented bearer token to its owner.
    pub async fn resolve_token(&self, raw: &str) -> Result<UserId, AuthError> {
        self.bounded("resolve_token", async {
            self.tokens.resolve(raw).await.inspect_err(|e| {
                metrics::record_auth_failure(e.kind());
            })
        })
        .await
    }

    /// Issues a non-expiring opaque token for an already authenticated user.
    pub async fn issue_api_key(&self, user_id: UserId) -> Result<IssuedToken, AuthError> {
        self.bounded("issue_api_key", self.tokens.issue_opaque(user_id, None))
            .await
    }

    pub async fn find_user(&self, user_id: UserId) -> Result<User, AuthError> {
        self.bounded("find_user", async {
            self.stores
                .users
                .find_by_id(user_id)
                .await?
                .ok_or(AuthError::TokenInvalid)
        })
        .await
    }

    /// Removes a user. Tokens already issued to it stop resolving.
    pub async fn delete_user(&self, user_id: UserId) -> Result<bool, AuthError> {
        self.bounded("delete_user", async {
            let deleted = self.stores.users.delete(user_id).await?;
            if deleted {
                tracing::info!(user_id = %user_id, "User deleted");
            }
            Ok(deleted)
        })
        .await
    }

    pub async fn purge_expired_tokens(&self) -> Result<u64, AuthError> {
        self.bounded("purge_expired_tokens", self.tokens.purge_expired())
            .await
    }

    /// Direct access to the token service, for callers that pick lifetimes themselves.
    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    // ==================== Groups and roles ====================

    #[tracing::instrument(skip(self, description))]
    pub async fn create_group(
        &self,
        owner_id: UserId,
        name: &str,
        description: Option<String>,
    ) -> Result<Group, AuthError> {
        self.bounded(
            "create_group",
            self.groups.create_group(owner_id, name, description),
        )
        .await
    }

    pub async fn find_group(&self, group_id: GroupId) -> Result<Group, AuthError> {
        self.bounded("find_group", self.groups.find_group(group_id))
            .await
    }

    pub async fn resolve_role(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Capabilities, AuthError> {
        self.bounded("resolve_role", self.roles.resolve_role(user_id, group_id))
            .await
    }

    pub async fn create_role(&self, capabilities: &Capabilities) -> Result<RoleId, AuthError> {
        self.bounded("create_role", self.roles.create_role(capabilities))
            .await
    }

    pub async fn get_role_id(
        &self,
        capabilities: &Capabilities,
    ) -> Result<Option<RoleId>, AuthError> {
        self.bounded("get_role_id", self.roles.get_role_id(capabilities))
            .await
    }

    // ==================== Invites ====================

    #[tracing::instrument(skip(self))]
    pub async fn create_invite(
        &self,
        actor: UserId,
        group_id: GroupId,
        capabilities: &Capabilities,
        max_uses: i32,
    ) -> Result<Invite, AuthError> {
        self.bounded(
            "create_invite",
            self.invites
                .create_invite(actor, group_id, capabilities, max_uses),
        )
        .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn redeem_invite(
        &self,
        invite_id: InviteId,
        user_id: UserId,
    ) -> Result<Membership, AuthError> {
        self.bounded("redeem_invite", self.invites.redeem(invite_id, user_id))
            .await
    }

    pub async fn invite_exists(
        &self,
        invite_id: InviteId,
        group_id: GroupId,
    ) -> Result<bool, AuthError> {
        self.bounded("invite_exists", self.invites.exists(invite_id, group_id))
            .await
    }

    pub async fn health_check(&self) -> Result<(), AuthError> {
        self.bounded("health_check", async {
            Ok(self.stores.health.health_check().await?)
        })
        .await
    }
}
