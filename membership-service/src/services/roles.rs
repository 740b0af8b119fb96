//! Role lookups and effective-permission resolution.

use std::sync::Arc;

use super::error::AuthError;
use super::store::{GroupStore, RoleStore};
use crate::models::{Capabilities, GroupId, RoleId, UserId};

#[derive(Clone)]
pub struct RoleService {
    roles: Arc<dyn RoleStore>,
    groups: Arc<dyn GroupStore>,
}

impl RoleService {
    pub fn new(roles: Arc<dyn RoleStore>, groups: Arc<dyn GroupStore>) -> Self {
        Self { roles, groups }
    }

    /// Returns the id for `capabilities`, creating the role on first use.
    pub async fn create_role(&self, capabilities: &Capabilities) -> Result<RoleId, AuthError> {
        Ok(self.roles.create_role(capabilities).await?)
    }

    pub async fn get_role_id(
        &self,
        capabilities: &Capabilities,
    ) -> Result<Option<RoleId>, AuthError> {
        Ok(self.roles.find_role_id(capabilities).await?)
    }

    /// Effective capabilities of `user_id` in `group_id`, admin escalation applied.
    pub async fn resolve_role(
        &self,
        user_id: UserId,
        group_id: GroupId,
    ) -> Result<Capabilities, AuthError> {
        let membership = self
            .groups
            .find_membership(user_id, group_id)
            .await?
            .ok_or(AuthError::NotAMember)?;

        let role = self
            .roles
            .find_role(membership.role_id)
            .await?
            .ok_or_else(|| {
                AuthError::internal(format!(
                    "membership of {} in {} references missing role {}",
                    user_id, group_id, membership.role_id
                ))
            })?;

        Ok(membership.effective_role(&role.capabilities))
    }
}
