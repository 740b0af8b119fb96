use chrono::{DateTime, Utc};
use sqlx::FromRow;

use super::{Capabilities, GroupId, RoleId, UserId};

/// A user's membership in a group. At most one per `(user_id, group_id)`.
#[derive(Debug, Clone, FromRow)]
pub struct Membership {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub role_id: RoleId,
    pub is_admin: bool,
    pub created_utc: DateTime<Utc>,
}

impl Membership {
    pub fn new(user_id: UserId, group_id: GroupId, role_id: RoleId) -> Self {
        Self {
            user_id,
            group_id,
            role_id,
            is_admin: false,
            created_utc: Utc::now(),
        }
    }

    /// Membership for a group owner.
    pub fn owner(user_id: UserId, group_id: GroupId, role_id: RoleId) -> Self {
        Self {
            is_admin: true,
            ..Self::new(user_id, group_id, role_id)
        }
    }

    /// Capabilities this member actually holds, given the stored role tuple.
    pub fn effective_role(&self, stored: &Capabilities) -> Capabilities {
        if self.is_admin {
            Capabilities::full()
        } else {
            stored.effective()
        }
    }
}
