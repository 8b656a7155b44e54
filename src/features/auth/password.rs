use crate::error::ApiError;

/// Work factor for new hashes. Stored hashes with a lower cost are flagged
/// for rehash on the next successful verification.
pub const BCRYPT_COST: u32 = 12;

pub fn hash_password(password: &str) -> Result<String, ApiError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| ApiError::PasswordHash(e.to_string()))
}

/// Returns false rather than erroring on malformed input.
pub fn verify_password(password: &str, hashed: &str) -> bool {
    bcrypt::verify(password, hashed).unwrap_or(false)
}

pub fn needs_rehash(hashed: &str) -> bool {
    // Hash format: $2b$12$<salt+digest>
    match hashed
        .split('$')
        .nth(2)
        .and_then(|cost| cost.parse::<u32>().ok())
    {
        Some(cost) => cost < BCRYPT_COST,
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_round_trip() {
        let hashed = hash_password("mysecretpassword").unwrap();
        assert!(verify_password("mysecretpassword", &hashed));
        assert!(!verify_password("wrongpassword", &hashed));
    }

    #[test]
    fn hashes_are_salted() {
        let first = hash_password("mysecretpassword").unwrap();
        let second = hash_password("mysecretpassword").unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn verify_tolerates_malformed_input() {
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", "not-a-bcrypt-hash"));
        assert!(!verify_password("anything", "$2b$garbage"));
    }

    #[test]
    fn rehash_flags_low_cost_and_malformed_hashes() {
        let current = hash_password("mysecretpassword").unwrap();
        assert!(!needs_rehash(&current));

        let low_cost = bcrypt::hash("mysecretpassword", 10).unwrap();
        assert!(needs_rehash(&low_cost));

        assert!(needs_rehash("not-a-bcrypt-hash"));
    }
}
