//! Invite model - bounded-use links that admit users into a group.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{GroupId, InviteId, RoleId, UserId};

#[derive(Debug, Clone, FromRow)]
pub struct Invite {
    pub invite_id: InviteId,
    pub group_id: GroupId,
    pub role_id: RoleId,
    /// Zero means exhausted. Never negative.
    pub remaining_uses: i32,
    pub created_by: UserId,
    pub created_utc: DateTime<Utc>,
}

impl Invite {
    pub fn new(group_id: GroupId, role_id: RoleId, max_uses: i32, created_by: UserId) -> Self {
        Self {
            invite_id: InviteId::new(),
            group_id,
            role_id,
            remaining_uses: max_uses,
            created_by,
            created_utc: Utc::now(),
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining_uses <= 0
    }
}

/// What a successful decrement hands back: where the redeemer lands and with which role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct InviteGrant {
    pub group_id: GroupId,
    pub role_id: RoleId,
}

#[derive(Debug, Clone, Serialize)]
pub struct InviteResponse {
    pub invite_id: InviteId,
    pub group_id: GroupId,
    pub remaining_uses: i32,
}

impl From<Invite> for InviteResponse {
    fn from(invite: Invite) -> Self {
        Self {
            invite_id: invite.invite_id,
            group_id: invite.group_id,
            remaining_uses: invite.remaining_uses,
        }
    }
}
