use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::{GroupId, UserId};

/// A named collaboration group. Names are unique across the service.
#[derive(Debug, Clone, FromRow)]
pub struct Group {
    pub group_id: GroupId,
    pub name: String,
    pub description: String,
    pub owner_id: UserId,
    pub created_utc: DateTime<Utc>,
}

impl Group {
    pub fn new(name: String, description: Option<String>, owner_id: UserId) -> Self {
        Self {
            group_id: GroupId::new(),
            name,
            description: description.unwrap_or_default(),
            owner_id,
            created_utc: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupResponse {
    pub group_id: GroupId,
    pub name: String,
    pub description: String,
    pub owner_id: UserId,
    pub created_utc: DateTime<Utc>,
}

impl From<Group> for GroupResponse {
    fn from(group: Group) -> Self {
        Self {
            group_id: group.group_id,
            name: group.name,
            description: group.description,
            owner_id: group.owner_id,
            created_utc: group.created_utc,
        }
    }
}
