use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};

use crate::common::config::SecurityConfig;

pub fn hash_password(password: &str, config: &SecurityConfig) -> Result<String, String> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let params = Params::new(
        config.argon2_m_cost,
        config.argon2_t_cost,
        config.argon2_p_cost,
        None,
    )
    .map_err(|e| e.to_string())?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| e.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(password_hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SecurityConfig {
        SecurityConfig {
            session_secret: "s".to_string(),
            argon2_m_cost: 512,
            argon2_t_cost: 1,
            argon2_p_cost: 1,
        }
    }

    #[test]
    fn hashed_password_verifies_against_same_password() {
        let hash = hash_password("correct horse", &config()).unwrap();
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong", &hash));
    }
}
