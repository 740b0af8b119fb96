//! Storage contracts used by the membership core.
//!
//! Two backends implement every trait here: [`super::Database`] (PostgreSQL) and
//! [`super::MemoryStore`] (in-process). Implementations report uniqueness
//! collisions as [`StoreError::Conflict`]; the core decides what a collision means.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::error::StoreError;
use crate::models::{
    Capabilities, Group, GroupId, Invite, InviteGrant, InviteId, Membership, OpaqueToken, Role,
    RoleId, User, UserId,
};

#[async_trait]
pub trait UserStore: Send + Sync {
    /// `email` is expected in its normalized (lower-case) form.
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError>;

    async fn exists(&self, user_id: UserId) -> Result<bool, StoreError>;

    async fn create(&self, user: &User) -> Result<(), StoreError>;

    /// Returns whether a user was removed.
    async fn delete(&self, user_id: UserId) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn create(&self, record: &OpaqueToken) -> Result<(), StoreError>;

    async fn find_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<OpaqueToken>, StoreError>;

    /// Deletes expiring tokens whose expiry is before `now`. Returns the count removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_role_id(&self, capabilities: &Capabilities) -> Result<Option<RoleId>, StoreError>;

    /// Idempotent: an existing identical tuple returns its id.
    async fn create_role(&self, capabilities: &Capabilities) -> Result<RoleId, StoreError>;

    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError>;
}

#[async_trait]
pub trait GroupStore: Send + Sync {
    /// Inserts the group and its owner's membership atomically.
    async fn create_group_with_owner(
        &self,
        group: &Group,
        owner: &Membership,
    ) -> Result<(), StoreError>;

    async fn find_group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError>;

    async fn find_membership(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<Membership>, StoreError>;
}

#[async_trait]
pub trait InviteStore: Send + Sync {
    async fn create_invite(&self, invite: &Invite) -> Result<(), StoreError>;

    async fn find_invite(&self, invite_id: InviteId) -> Result<Option<Invite>, StoreError>;

    /// Opens an isolated redemption transaction.
    async fn begin(&self) -> Result<Box<dyn InviteTransaction>, StoreError>;

    /// True when the invite belongs to `group_id` and has uses left.
    async fn exists(&self, invite_id: InviteId, group_id: GroupId) -> Result<bool, StoreError>;
}

/// Scoped redemption transaction. Dropping it without [`commit`](Self::commit)
/// rolls back every write made through it.
#[async_trait]
pub trait InviteTransaction: Send {
    /// Decrements `remaining_uses` if positive and returns the grant.
    ///
    /// `NotFound` when the invite does not exist, `Exhausted` when it has no uses left.
    async fn decrement_and_fetch(&mut self, invite_id: InviteId) -> Result<InviteGrant, StoreError>;

    /// `Conflict` when the user already belongs to the group.
    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// Every store the core needs, shared behind `Arc`.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub roles: Arc<dyn RoleStore>,
    pub groups: Arc<dyn GroupStore>,
    pub invites: Arc<dyn InviteStore>,
    pub health: Arc<dyn HealthCheck>,
}

impl Stores {
    /// Uses one backend for every store.
    pub fn from_backend<B>(backend: B) -> Self
    where
        B: UserStore + TokenStore + RoleStore + GroupStore + InviteStore + HealthCheck + 'static,
    {
        let backend = Arc::new(backend);
        Self {
            users: backend.clone(),
            tokens: backend.clone(),
            roles: backend.clone(),
            groups: backend.clone(),
            invites: backend.clone(),
            health: backend,
        }
    }
}
