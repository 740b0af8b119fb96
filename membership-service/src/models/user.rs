//! User model - registered accounts.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

use super::UserId;

/// User entity. `email` is stored lower-cased.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: UserId,
    pub email: String,
    pub password_hash: String,
    pub created_utc: DateTime<Utc>,
}

impl User {
    pub fn new(email: &str, password_hash: String) -> Self {
        Self {
            user_id: UserId::new(),
            email: normalize_email(email),
            password_hash,
            created_utc: Utc::now(),
        }
    }

    /// Convert to sanitized response (no password hash).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// Emails compare case-insensitively; the lower-cased form is the stored key.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub user_id: UserId,
    pub email: String,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            created_utc: user.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_user_lowercases_email() {
        let user = User::new("  A@X.com ", "$argon2id$hash".to_string());
        assert_eq!(user.email, "a@x.com");
    }

    #[test]
    fn test_sanitized_omits_hash() {
        let user = User::new("a@x.com", "$argon2id$hash".to_string());
        let json = serde_json::to_value(user.sanitized()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["email"], "a@x.com");
    }
}
