use service_core::error::AppError;
use thiserror::Error;

/// Discriminant of [`AuthError`], for callers that branch on the kind of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadCredentials,
    PasswordTooWeak,
    PasswordTooLong,
    EmailInvalid,
    EmailAlreadyInUse,
    TokenInvalid,
    BadTokenKind,
    InviteExhausted,
    InviteNotFound,
    AlreadyInGroup,
    BadInviteLimit,
    Conflict,
    GroupNameInvalid,
    GroupNameTaken,
    GroupNotFound,
    NotAMember,
    Forbidden,
    InternalError,
}

impl ErrorKind {
    /// Short stable label, used as a metric label value.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadCredentials => "bad_credentials",
            ErrorKind::PasswordTooWeak => "password_too_weak",
            ErrorKind::PasswordTooLong => "password_too_long",
            ErrorKind::EmailInvalid => "email_invalid",
            ErrorKind::EmailAlreadyInUse => "email_already_in_use",
            ErrorKind::TokenInvalid => "token_invalid",
            ErrorKind::BadTokenKind => "bad_token_kind",
            ErrorKind::InviteExhausted => "invite_exhausted",
            ErrorKind::InviteNotFound => "invite_not_found",
            ErrorKind::AlreadyInGroup => "already_in_group",
            ErrorKind::BadInviteLimit => "bad_invite_limit",
            ErrorKind::Conflict => "conflict",
            ErrorKind::GroupNameInvalid => "group_name_invalid",
            ErrorKind::GroupNameTaken => "group_name_taken",
            ErrorKind::GroupNotFound => "group_not_found",
            ErrorKind::NotAMember => "not_a_member",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InternalError => "internal_error",
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    BadCredentials,

    #[error("Password is too weak")]
    PasswordTooWeak,

    #[error("Password exceeds {max} bytes")]
    PasswordTooLong { max: usize },

    #[error("Invalid email address")]
    EmailInvalid,

    #[error("Email already in use")]
    EmailAlreadyInUse,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Unknown token kind: {0}")]
    BadTokenKind(String),

    #[error("Invite has no remaining uses")]
    InviteExhausted,

    #[error("Invite not found")]
    InviteNotFound,

    #[error("User is already a member of this group")]
    AlreadyInGroup,

    #[error("Invite use limit must be positive")]
    BadInviteLimit,

    #[error("Conflicting update: {0}")]
    Conflict(String),

    #[error("Group name must not be blank")]
    GroupNameInvalid,

    #[error("Group name already taken")]
    GroupNameTaken,

    #[error("Group not found")]
    GroupNotFound,

    #[error("User is not a member of this group")]
    NotAMember,

    #[error("Missing permission: {0}")]
    Forbidden(&'static str),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl AuthError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::BadCredentials => ErrorKind::BadCredentials,
            AuthError::PasswordTooWeak => ErrorKind::PasswordTooWeak,
            AuthError::PasswordTooLong { .. } => ErrorKind::PasswordTooLong,
            AuthError::EmailInvalid => ErrorKind::EmailInvalid,
            AuthError::EmailAlreadyInUse => ErrorKind::EmailAlreadyInUse,
            AuthError::TokenInvalid => ErrorKind::TokenInvalid,
            AuthError::BadTokenKind(_) => ErrorKind::BadTokenKind,
            AuthError::InviteExhausted => ErrorKind::InviteExhausted,
            AuthError::InviteNotFound => ErrorKind::InviteNotFound,
            AuthError::AlreadyInGroup => ErrorKind::AlreadyInGroup,
            AuthError::BadInviteLimit => ErrorKind::BadInviteLimit,
            AuthError::Conflict(_) => ErrorKind::Conflict,
            AuthError::GroupNameInvalid => ErrorKind::GroupNameInvalid,
            AuthError::GroupNameTaken => ErrorKind::GroupNameTaken,
            AuthError::GroupNotFound => ErrorKind::GroupNotFound,
            AuthError::NotAMember => ErrorKind::NotAMember,
            AuthError::Forbidden(_) => ErrorKind::Forbidden,
            AuthError::InternalError(_) => ErrorKind::InternalError,
        }
    }

    pub fn internal(message: impl std::fmt::Display) -> Self {
        AuthError::InternalError(anyhow::anyhow!("{}", message))
    }
}

/// Failures reported by a store implementation.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    /// A uniqueness constraint rejected the write. Carries the constraint name.
    #[error("Unique constraint violated: {0}")]
    Conflict(String),

    /// A conditional decrement found no remaining uses.
    #[error("No remaining uses")]
    Exhausted,

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                StoreError::Conflict(db_err.constraint().unwrap_or("unique").to_string())
            }
            other => StoreError::Database(anyhow::Error::new(other)),
        }
    }
}

/// Unclassified store failures surface as internal errors.
impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        AuthError::InternalError(anyhow::Error::new(e))
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        let message = err.to_string();
        match err {
            AuthError::BadCredentials | AuthError::TokenInvalid => AppError::Unauthorized(message),
            AuthError::PasswordTooWeak | AuthError::PasswordTooLong { .. } => {
                AppError::Unprocessable {
                    message,
                    field: Some("password"),
                }
            }
            AuthError::EmailInvalid => AppError::Unprocessable {
                message,
                field: Some("email"),
            },
            AuthError::EmailAlreadyInUse => AppError::Conflict {
                message,
                field: Some("email"),
            },
            AuthError::BadTokenKind(_) => AppError::BadRequest {
                message,
                field: Some("kind"),
            },
            AuthError::BadInviteLimit => AppError::Unprocessable {
                message,
                field: Some("max_uses"),
            },
            AuthError::InviteExhausted | AuthError::AlreadyInGroup | AuthError::Conflict(_) => {
                AppError::Conflict {
                    message,
                    field: None,
                }
            }
            AuthError::GroupNameInvalid => AppError::Unprocessable {
                message,
                field: Some("name"),
            },
            AuthError::GroupNameTaken => AppError::Conflict {
                message,
                field: Some("name"),
            },
            AuthError::InviteNotFound | AuthError::GroupNotFound => AppError::NotFound(message),
            AuthError::NotAMember | AuthError::Forbidden(_) => AppError::Forbidden(message),
            AuthError::InternalError(e) => AppError::InternalError(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(AuthError::TokenInvalid.kind(), ErrorKind::TokenInvalid);
        assert_eq!(
            AuthError::BadTokenKind("jwt".into()).kind(),
            ErrorKind::BadTokenKind
        );
        assert_eq!(
            AuthError::internal("boom").kind(),
            ErrorKind::InternalError
        );
    }

    #[test]
    fn test_store_errors_become_internal() {
        let err: AuthError = StoreError::Conflict("users_email_key".into()).into();
        assert_eq!(err.kind(), ErrorKind::InternalError);
    }

    #[test]
    fn test_transport_mapping() {
        let cases = [
            (AuthError::BadCredentials, StatusCode::UNAUTHORIZED),
            (AuthError::TokenInvalid, StatusCode::UNAUTHORIZED),
            (AuthError::PasswordTooWeak, StatusCode::UNPROCESSABLE_ENTITY),
            (AuthError::EmailAlreadyInUse, StatusCode::CONFLICT),
            (AuthError::BadTokenKind("x".into()), StatusCode::BAD_REQUEST),
            (AuthError::InviteExhausted, StatusCode::CONFLICT),
            (AuthError::InviteNotFound, StatusCode::NOT_FOUND),
            (AuthError::AlreadyInGroup, StatusCode::CONFLICT),
            (AuthError::BadInviteLimit, StatusCode::UNPROCESSABLE_ENTITY),
            (AuthError::Forbidden("manage_members"), StatusCode::FORBIDDEN),
            (AuthError::internal("db down"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[test]
    fn test_field_hints() {
        match AppError::from(AuthError::EmailAlreadyInUse) {
            AppError::Conflict { field, .. } => assert_eq!(field, Some("email")),
            other => panic!("unexpected mapping: {:?}", other),
        }
        match AppError::from(AuthError::BadInviteLimit) {
            AppError::Unprocessable { field, .. } => assert_eq!(field, Some("max_uses")),
            other => panic!("unexpected mapping: {:?}", other),
        }
        match AppError::from(AuthError::GroupNameInvalid) {
            AppError::Unprocessable { field, .. } => assert_eq!(field, Some("name")),
            other => panic!("unexpected mapping: {:?}", other),
        }
    }
}
