//! PostgreSQL store backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;

use super::error::StoreError;
use super::store::{
    GroupStore, HealthCheck, InviteStore, InviteTransaction, RoleStore, TokenStore, UserStore,
};
use crate::models::{
    Capabilities, Group, GroupId, Invite, InviteGrant, InviteId, Membership, OpaqueToken, Role,
    RoleId, User, UserId,
};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl HealthCheck for Database {
    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                StoreError::from(e)
            })?;
        Ok(())
    }
}

// ==================== Users ====================

#[async_trait]
impl UserStore for Database {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, email, password_hash, created_utc FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT user_id, email, password_hash, created_utc FROM users WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn exists(&self, user_id: UserId) -> Result<bool, StoreError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE user_id = $1)")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO users (user_id, email, password_hash, created_utc) VALUES ($1, $2, $3, $4)",
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete(&self, user_id: UserId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

// ==================== Opaque tokens ====================

#[async_trait]
impl TokenStore for Database {
    async fn create(&self, record: &OpaqueToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO opaque_tokens (token_id, user_id, secret_hash, expires, expiry_utc, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(record.token_id)
        .bind(record.user_id)
        .bind(&record.secret_hash)
        .bind(record.expires)
        .bind(record.expiry_utc)
        .bind(record.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_secret_hash(
        &self,
        secret_hash: &str,
    ) -> Result<Option<OpaqueToken>, StoreError> {
        let record = sqlx::query_as::<_, OpaqueToken>(
            r#"
            SELECT token_id, user_id, secret_hash, expires, expiry_utc, created_utc
            FROM opaque_tokens
            WHERE secret_hash = $1
            "#,
        )
        .bind(secret_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM opaque_tokens WHERE expires AND expiry_utc < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// ==================== Roles ====================

#[async_trait]
impl RoleStore for Database {
    async fn find_role_id(&self, caps: &Capabilities) -> Result<Option<RoleId>, StoreError> {
        let role_id = sqlx::query_scalar::<_, RoleId>(
            r#"
            SELECT role_id FROM roles
            WHERE manage_members = $1 AND manage_tasks = $2 AND review = $3
              AND comment = $4 AND admin = $5
            "#,
        )
        .bind(caps.manage_members)
        .bind(caps.manage_tasks)
        .bind(caps.review)
        .bind(caps.comment)
        .bind(caps.admin)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role_id)
    }

    async fn create_role(&self, caps: &Capabilities) -> Result<RoleId, StoreError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let role_id = sqlx::query_scalar::<_, RoleId>(
            r#"
            INSERT INTO roles (role_id, manage_members, manage_tasks, review, comment, admin)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT ON CONSTRAINT roles_capabilities_key
            DO UPDATE SET admin = EXCLUDED.admin
            RETURNING role_id
            "#,
        )
        .bind(RoleId::new())
        .bind(caps.manage_members)
        .bind(caps.manage_tasks)
        .bind(caps.review)
        .bind(caps.comment)
        .bind(caps.admin)
        .fetch_one(&self.pool)
        .await?;
        Ok(role_id)
    }

    async fn find_role(&self, role_id: RoleId) -> Result<Option<Role>, StoreError> {
        let role = sqlx::query_as::<_, Role>(
            r#"
            SELECT role_id, manage_members, manage_tasks, review, comment, admin
            FROM roles WHERE role_id = $1
            "#,
        )
        .bind(role_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(role)
    }
}

// ==================== Groups ====================

async fn insert_membership(
    tx: &mut Transaction<'static, Postgres>,
    membership: &Membership,
) -> Result<(), StoreError> {
    sqlx::query(
        r#"
        INSERT INTO memberships (user_id, group_id, role_id, is_admin, created_utc)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(membership.user_id)
    .bind(membership.group_id)
    .bind(membership.role_id)
    .bind(membership.is_admin)
    .bind(membership.created_utc)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

#[async_trait]
impl GroupStore for Database {
    async fn create_group_with_owner(
        &self,
        group: &Group,
        owner: &Membership,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO groups (group_id, name, description, owner_id, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(group.group_id)
        .bind(&group.name)
        .bind(&group.description)
        .bind(group.owner_id)
        .bind(group.created_utc)
        .execute(&mut *tx)
        .await?;

        insert_membership(&mut tx, owner).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn find_group(&self, group_id: GroupId) -> Result<Option<Group>, StoreError> {
        let group = sqlx::query_as::<_, Group>(
            "SELECT group_id, name, description, owner_id, created_utc FROM groups WHERE group_id = $1",
        )
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(group)
    }

    async fn find_membership(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Option<Membership>, StoreError> {
        let membership = sqlx::query_as::<_, Membership>(
            r#"
            SELECT user_id, group_id, role_id, is_admin, created_utc
            FROM memberships
            WHERE user_id = $1 AND group_id = $2
            "#,
        )
        .bind(user_id)
        .bind(group_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(membership)
    }
}

// ==================== Invites ====================

#[async_trait]
impl InviteStore for Database {
    async fn create_invite(&self, invite: &Invite) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invites (invite_id, group_id, role_id, remaining_uses, created_by, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(invite.invite_id)
        .bind(invite.group_id)
        .bind(invite.role_id)
        .bind(invite.remaining_uses)
        .bind(invite.created_by)
        .bind(invite.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_invite(&self, invite_id: InviteId) -> Result<Option<Invite>, StoreError> {
        let invite = sqlx::query_as::<_, Invite>(
            r#"
            SELECT invite_id, group_id, role_id, remaining_uses, created_by, created_utc
            FROM invites WHERE invite_id = $1
            "#,
        )
        .bind(invite_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(invite)
    }

    async fn begin(&self) -> Result<Box<dyn InviteTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgInviteTransaction { tx }))
    }

    async fn exists(&self, invite_id: InviteId, group_id: GroupId) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM invites
                WHERE invite_id = $1 AND group_id = $2 AND remaining_uses > 0
            )
            "#,
        )
        .bind(invite_id)
        .bind(group_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }
}

/// Redemption transaction over a pooled connection. sqlx rolls back on drop.
struct PgInviteTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl InviteTransaction for PgInviteTransaction {
    async fn decrement_and_fetch(&mut self, invite_id: InviteId) -> Result<InviteGrant, StoreError> {
        // Concurrent redeemers queue on the row lock and re-check the predicate.
        let grant = sqlx::query_as::<_, InviteGrant>(
            r#"
            UPDATE invites
            SET remaining_uses = remaining_uses - 1
            WHERE invite_id = $1 AND remaining_uses > 0
            RETURNING group_id, role_id
            "#,
        )
        .bind(invite_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        if let Some(grant) = grant {
            return Ok(grant);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM invites WHERE invite_id = $1)")
                .bind(invite_id)
                .fetch_one(&mut *self.tx)
                .await?;

        if exists {
            Err(StoreError::Exhausted)
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn insert_membership(&mut self, membership: &Membership) -> Result<(), StoreError> {
        insert_membership(&mut self.tx, membership).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
