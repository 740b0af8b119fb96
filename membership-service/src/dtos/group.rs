use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::{Capabilities, GroupId, UserId};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateGroupRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateInviteRequest {
    /// Role granted on redemption; defaults to a plain member.
    #[serde(default = "Capabilities::member")]
    pub role: Capabilities,

    pub max_uses: i32,
}

#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    pub user_id: UserId,
    pub group_id: GroupId,
    pub role: Capabilities,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub group_id: GroupId,
    pub role: Capabilities,
}
