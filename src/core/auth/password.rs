//! Password verification against stored bcrypt hashes

/// Cost factor for bcrypt hashing (12 is recommended for production)
pub const DEFAULT_BCRYPT_COST: u32 = 12;

/// Password errors
#[derive(Debug, thiserror::Error)]
pub enum PasswordError {
    #[error("Password does not match")]
    Mismatch,

    #[error("Stored password hash is not a valid bcrypt hash")]
    InvalidHash,

    #[error("Password hashing failed: {0}")]
    Hashing(String),
}

/// Checks submitted passwords against salted bcrypt hashes.
///
/// Verification has no side effects and never logs the plaintext.
#[derive(Debug, Clone, Copy)]
pub struct PasswordVerifier {
    cost: u32,
}

impl Default for PasswordVerifier {
    fn default() -> Self {
        Self {
            cost: DEFAULT_BCRYPT_COST,
        }
    }
}

impl PasswordVerifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom bcrypt cost for newly created hashes
    pub fn with_cost(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a password with a fresh random salt
    pub fn hash_password(&self, password: &str) -> Result<String, PasswordError> {
        bcrypt::hash(password, self.cost).map_err(|e| PasswordError::Hashing(e.to_string()))
    }

    /// Verify `password` against `hash`
    pub fn verify(&self, password: &str, hash: &str) -> Result<(), PasswordError> {
        match bcrypt::verify(password, hash) {
            Ok(true) => Ok(()),
            Ok(false) => Err(PasswordError::Mismatch),
            Err(_) => Err(PasswordError::InvalidHash),
        }
    }
}
