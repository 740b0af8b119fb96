//! Role model - immutable capability tuples shared by every membership that holds them.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::RoleId;

/// Highest administrative level a role can carry.
pub const ADMIN_LEVEL_MAX: i16 = 1;

/// The permission axes of a role. Two roles with equal tuples are the same role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, FromRow)]
#[serde(default)]
pub struct Capabilities {
    pub manage_members: bool,
    pub manage_tasks: bool,
    pub review: bool,
    pub comment: bool,
    pub admin: i16,
}

/// A single axis of [`Capabilities`], for per-permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ManageMembers,
    ManageTasks,
    Review,
    Comment,
    Administer,
}

impl Capabilities {
    /// Every axis at its maximum.
    pub fn full() -> Self {
        Self {
            manage_members: true,
            manage_tasks: true,
            review: true,
            comment: true,
            admin: ADMIN_LEVEL_MAX,
        }
    }

    /// Default capabilities for an ordinary member.
    pub fn member() -> Self {
        Self {
            comment: true,
            ..Self::default()
        }
    }

    pub fn is_admin(&self) -> bool {
        self.admin > 0
    }

    /// A positive admin level escalates every axis.
    pub fn effective(&self) -> Self {
        if self.is_admin() {
            Self::full()
        } else {
            *self
        }
    }

    pub fn allows(&self, permission: Permission) -> bool {
        match permission {
            Permission::ManageMembers => self.manage_members,
            Permission::ManageTasks => self.manage_tasks,
            Permission::Review => self.review,
            Permission::Comment => self.comment,
            Permission::Administer => self.is_admin(),
        }
    }

    /// True when `self` holds at least every permission `other` holds.
    pub fn covers(&self, other: &Capabilities) -> bool {
        let me = self.effective();
        let other = other.effective();
        (me.manage_members || !other.manage_members)
            && (me.manage_tasks || !other.manage_tasks)
            && (me.review || !other.review)
            && (me.comment || !other.comment)
            && me.admin >= other.admin
    }
}

/// A persisted role.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Role {
    pub role_id: RoleId,
    #[sqlx(flatten)]
    pub capabilities: Capabilities,
}
