//! Password digests for synchronized local records.
//!
//! Digests are Argon2id PHC strings using the OWASP recommended parameters
//! (m=19456 KiB, t=2, p=1).

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

pub use argon2::password_hash::Error as HashError;

const MEMORY_COST_KIB: u32 = 19456;
const TIME_COST: u32 = 2;
const PARALLELISM: u32 = 1;

fn hasher() -> Result<Argon2<'static>, HashError> {
    let params = Params::new(MEMORY_COST_KIB, TIME_COST, PARALLELISM, None)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a secret under a fresh random salt.
pub fn hash_secret(secret: &str) -> Result<String, HashError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = hasher()?.hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Check a secret against a stored digest. Malformed digests never verify.
pub fn verify_secret(secret: &str, stored: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(stored) else {
        return false;
    };
    // parameters come from the PHC string itself
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_verifies() {
        let stored = hash_secret("hunter2").unwrap();
        assert!(stored.starts_with("$argon2id$v=19$m=19456,t=2,p=1$"));
        assert!(verify_secret("hunter2", &stored));
        assert!(!verify_secret("hunter3", &stored));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_secret("same").unwrap(), hash_secret("same").unwrap());
    }

    #[test]
    fn test_malformed_digest_never_verifies() {
        assert!(!verify_secret("x", ""));
        assert!(!verify_secret("x", "md5$00$00"));
        assert!(!verify_secret("x", "$argon2id$v=19$m=19456,t=2,p=1$bm90YXNhbHQ"));
    }

    #[test]
    fn test_legacy_hmac_digest_is_not_accepted() {
        assert!(!verify_secret("x", "hmac-sha256$00ff$00ff"));
    }
}
