//! Invite creation and redemption.
//!
//! Redemption runs in one store transaction: decrement the invite, then insert
//! the membership, then commit. Any failure before the commit drops the
//! transaction and with it the decrement, so a use is consumed only by a
//! redemption that actually admitted someone.

use std::sync::Arc;

use super::error::{AuthError, StoreError};
use super::metrics;
use super::roles::RoleService;
use super::store::{GroupStore, InviteStore};
use crate::models::{Capabilities, GroupId, Invite, InviteId, Membership, Permission, UserId};

#[derive(Clone)]
pub struct InviteService {
    invites: Arc<dyn InviteStore>,
    groups: Arc<dyn GroupStore>,
    roles: RoleService,
}

impl InviteService {
    pub fn new(
        invites: Arc<dyn InviteStore>,
        groups: Arc<dyn GroupStore>,
        roles: RoleService,
    ) -> Self {
        Self {
            invites,
            groups,
            roles,
        }
    }

    /// Creates an invite admitting up to `max_uses` users with `capabilities`.
    ///
    /// The actor needs `manage_members` in the group and cannot hand out
    /// permissions it does not hold itself.
    pub async fn create_invite(
        &self,
        actor: UserId,
        group_id: GroupId,
        capabilities: &Capabilities,
        max_uses: i32,
    ) -> Result<Invite, AuthError> {
        if max_uses <= 0 {
            return Err(AuthError::BadInviteLimit);
        }

        if self.groups.find_group(group_id).await?.is_none() {
            return Err(AuthError::GroupNotFound);
        }

        let actor_caps = match self.roles.resolve_role(actor, group_id).await {
            Ok(caps) => caps,
            Err(AuthError::NotAMember) => return Err(AuthError::Forbidden("manage_members")),
            Err(e) => return Err(e),
        };
        if !actor_caps.allows(Permission::ManageMembers) {
            return Err(AuthError::Forbidden("manage_members"));
        }
        if !actor_caps.covers(capabilities) {
            return Err(AuthError::Forbidden("granted role exceeds own role"));
        }

        let role_id = self.roles.create_role(capabilities).await?;
        let invite = Invite::new(group_id, role_id, max_uses, actor);
        self.invites.create_invite(&invite).await?;

        tracing::info!(
            invite_id = %invite.invite_id,
            group_id = %group_id,
            max_uses,
            "Invite created"
        );
        Ok(invite)
    }

    /// Admits `user_id` into the invite's group. At most `max_uses` calls succeed.
    pub async fn redeem(
        &self,
        invite_id: InviteId,
        user_id: UserId,
    ) -> Result<Membership, AuthError> {
        let result = self.redeem_in_transaction(invite_id, user_id).await;

        match &result {
            Ok(membership) => {
                metrics::record_redemption("ok");
                tracing::info!(
                    invite_id = %invite_id,
                    user_id = %user_id,
                    group_id = %membership.group_id,
                    "Invite redeemed"
                );
            }
            Err(e) => {
                metrics::record_redemption(e.kind().as_str());
                tracing::warn!(invite_id = %invite_id, user_id = %user_id, "Invite redemption rejected: {}", e);
            }
        }
        result
    }

    async fn redeem_in_transaction(
        &self,
        invite_id: InviteId,
        user_id: UserId,
    ) -> Result<Membership, AuthError> {
        let mut tx = self.invites.begin().await?;

        let grant = tx
            .decrement_and_fetch(invite_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::InviteNotFound,
                StoreError::Exhausted => AuthError::InviteExhausted,
                other => other.into(),
            })?;

        let membership = Membership::new(user_id, grant.group_id, grant.role_id);
        tx.insert_membership(&membership)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::AlreadyInGroup,
                other => other.into(),
            })?;

        tx.commit().await.map_err(|e| {
            AuthError::InternalError(anyhow::anyhow!("Failed to commit invite redemption: {}", e))
        })?;

        Ok(membership)
    }

    /// Best-effort check that the invite belongs to `group_id` and has uses left.
    pub async fn exists(&self, invite_id: InviteId, group_id: GroupId) -> Result<bool, AuthError> {
        Ok(self.invites.exists(invite_id, group_id).await?)
    }
}
