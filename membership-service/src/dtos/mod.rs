pub mod auth;
pub mod group;

pub use auth::{RefreshRequest, RegisterRequest, TokenRequest};
pub use group::{CreateGroupRequest, CreateInviteRequest, RedeemResponse, RoleResponse};
