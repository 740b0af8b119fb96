pub mod group;
pub mod ids;
pub mod invite;
pub mod membership;
pub mod role;
pub mod token;
pub mod user;

pub use group::{Group, GroupResponse};
pub use ids::{GroupId, InviteId, RoleId, TokenId, UserId};
pub use invite::{Invite, InviteGrant, InviteResponse};
pub use membership::Membership;
pub use role::{Capabilities, Permission, Role, ADMIN_LEVEL_MAX};
pub use token::{Audience, IssuedToken, OpaqueToken, SignedClaims, TokenKind, TokenPair};
pub use user::{User, UserResponse};
