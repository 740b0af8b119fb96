pub mod auth;
pub mod group;
pub mod invitation;
pub mod metrics;
pub mod user;
