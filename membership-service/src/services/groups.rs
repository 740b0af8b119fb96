use std::sync::Arc;

use super::error::{AuthError, StoreError};
use super::store::{GroupStore, RoleStore};
use crate::models::{Capabilities, Group, GroupId, Membership, UserId};

#[derive(Clone)]
pub struct GroupService {
    groups: Arc<dyn GroupStore>,
    roles: Arc<dyn RoleStore>,
}

impl GroupService {
    pub fn new(groups: Arc<dyn GroupStore>, roles: Arc<dyn RoleStore>) -> Self {
        Self { groups, roles }
    }

    /// Creates a group; the owner joins it as an admin in the same write.
    pub async fn create_group(
        &self,
        owner_id: UserId,
        name: &str,
        description: Option<String>,
    ) -> Result<Group, AuthError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AuthError::GroupNameInvalid);
        }

        let role_id = self.roles.create_role(&Capabilities::full()).await?;
        let group = Group::new(name.to_string(), description, owner_id);
        let owner = Membership::owner(owner_id, group.group_id, role_id);

        self.groups
            .create_group_with_owner(&group, &owner)
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => AuthError::GroupNameTaken,
                other => other.into(),
            })?;

        tracing::info!(group_id = %group.group_id, owner_id = %owner_id, "Group created");
        Ok(group)
    }

    pub async fn find_group(&self, group_id: GroupId) -> Result<Group, AuthError> {
        self.groups
            .find_group(group_id)
            .await?
            .ok_or(AuthError::GroupNotFound)
    }
}
