use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Newtype for password to prevent accidental logging
#[derive(Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("password exceeds {max} bytes")]
    TooLong { max: usize },

    #[error("password entropy {entropy:.1} bits is below the required {required:.1}")]
    TooWeak { entropy: f64, required: f64 },

    #[error("failed to hash password: {0}")]
    Hashing(String),
}

fn hasher(server_salt: &[u8]) -> Result<Argon2<'_>, PasswordError> {
    Argon2::new_with_secret(
        server_salt,
        Algorithm::Argon2id,
        Version::V0x13,
        Params::default(),
    )
    .map_err(|e| PasswordError::Hashing(e.to_string()))
}

/// Hash a password using Argon2id.
///
/// The server salt is mixed in as the Argon2 secret; a random per-hash salt is
/// generated and embedded in the PHC string. Passwords longer than `max_bytes`
/// are rejected, never truncated.
pub fn hash_password(
    password: &Password,
    server_salt: &[u8],
    max_bytes: usize,
) -> Result<PasswordHashString, PasswordError> {
    if password.as_str().len() > max_bytes {
        return Err(PasswordError::TooLong { max: max_bytes });
    }

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = hasher(server_salt)?
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| match e {
            argon2::password_hash::Error::Password => PasswordError::TooLong { max: max_bytes },
            other => PasswordError::Hashing(other.to_string()),
        })?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a stored hash.
///
/// Returns false on mismatch and for empty or malformed hashes. Comparison is
/// constant-time inside argon2.
pub fn verify_password(
    password_hash: &PasswordHashString,
    password: &Password,
    server_salt: &[u8],
) -> bool {
    if password_hash.as_str().is_empty() {
        return false;
    }
    let Ok(parsed_hash) = PasswordHash::new(password_hash.as_str()) else {
        return false;
    };
    let Ok(argon2) = hasher(server_salt) else {
        return false;
    };

    argon2
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .is_ok()
}

const LOWER_POOL: f64 = 26.0;
const UPPER_POOL: f64 = 26.0;
const DIGIT_POOL: f64 = 10.0;
const SYMBOL_POOL: f64 = 32.0;
const OTHER_POOL: f64 = 32.0;

/// Estimated entropy in bits: `log2(pool) * effective_length`.
///
/// The pool is the sum of the character classes present. A character equal to
/// both of the two before it does not count towards the length.
pub fn password_entropy(password: &str) -> f64 {
    let (mut lower, mut upper, mut digit, mut symbol, mut other) =
        (false, false, false, false, false);
    let mut length = 0usize;
    let mut prev: [Option<char>; 2] = [None, None];

    for c in password.chars() {
        match c {
            'a'..='z' => lower = true,
            'A'..='Z' => upper = true,
            '0'..='9' => digit = true,
            c if c.is_ascii_punctuation() || c == ' ' => symbol = true,
            _ => other = true,
        }

        if !(prev[0] == Some(c) && prev[1] == Some(c)) {
            length += 1;
        }
        prev = [prev[1], Some(c)];
    }

    let pool = [
        (lower, LOWER_POOL),
        (upper, UPPER_POOL),
        (digit, DIGIT_POOL),
        (symbol, SYMBOL_POOL),
        (other, OTHER_POOL),
    ]
    .iter()
    .filter(|(present, _)| *present)
    .map(|(_, size)| size)
    .sum::<f64>();

    if pool == 0.0 {
        return 0.0;
    }
    pool.log2() * length as f64
}

/// Accepts a password whose entropy is at least `min_bits`.
pub fn validate_strength(password: &Password, min_bits: f64) -> Result<f64, PasswordError> {
    let entropy = password_entropy(password.as_str());
    if entropy < min_bits {
        return Err(PasswordError::TooWeak {
            entropy,
            required: min_bits,
        });
    }
    Ok(entropy)
}
