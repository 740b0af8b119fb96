pub mod credentials;
pub mod database;
pub mod error;
pub mod groups;
pub mod invites;
pub mod membership;
pub mod memory;
pub mod metrics;
pub mod roles;
pub mod store;
pub mod tokens;

pub use credentials::CredentialVerifier;
pub use database::Database;
pub use error::{AuthError, ErrorKind, StoreError};
pub use groups::GroupService;
pub use invites::InviteService;
pub use membership::MembershipCore;
pub use memory::MemoryStore;
pub use roles::RoleService;
pub use store::{
    GroupStore, HealthCheck, InviteStore, InviteTransaction, RoleStore, Stores, TokenStore,
    UserStore,
};
pub use tokens::{RawToken, TokenService};
