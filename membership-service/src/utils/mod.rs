pub mod password;
pub mod validation;

pub use password::{
    hash_password, password_entropy, validate_strength, verify_password, Password,
    PasswordError, PasswordHashString,
};
pub use validation::ValidatedJson;
