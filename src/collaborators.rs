//! The two external-collaborator seams named in SPEC_FULL.md §6: verifying a username/password
//! against the identity store, and remembering that a browser has an active CAS session. Both
//! are deliberately thin — the ticket subsystem is the point of this crate, not identity
//! management — but they're still traits so a deployment can swap in an LDAP- or OIDC-backed
//! implementation without touching the Protocol Endpoints.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;

use crate::common::config::SecurityConfig;
use crate::common::{crypto, ApiError};

#[async_trait::async_trait]
pub trait CredentialAuthenticator: Send + Sync {
    async fn verify(&self, username: &str, password: &str) -> Result<bool, ApiError>;
}

/// Verifies primary credentials against the `cas_credentials` table using the same Argon2id
/// parameters the rest of the crate hashes with.
pub struct PostgresCredentialAuthenticator {
    pool: PgPool,
}

impl PostgresCredentialAuthenticator {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CredentialAuthenticator for PostgresCredentialAuthenticator {
    async fn verify(&self, username: &str, password: &str) -> Result<bool, ApiError> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT password_hash FROM cas_credentials WHERE user_id = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(match row {
            Some((password_hash,)) => crypto::verify_password(password, &password_hash),
            None => false,
        })
    }
}

/// Remembers which user a browser authenticated as, via an HMAC-signed cookie value rather than
/// server-side session storage — there is no session table to garbage-collect, and the signature
/// ties the cookie to the TGT it was issued alongside.
pub trait SessionStore: Send + Sync {
    fn sign(&self, tgt: &str, user_id: &str) -> String;
    fn verify(&self, cookie_value: &str) -> Option<SessionClaims>;
}

pub struct SessionClaims {
    pub tgt: String,
    pub user_id: String,
}

type HmacSha256 = Hmac<Sha256>;

pub struct HmacSessionStore {
    secret: Vec<u8>,
}

impl HmacSessionStore {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            secret: config.session_secret.as_bytes().to_vec(),
        }
    }

    fn mac_for(&self, payload: &str) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts a key of any length");
        mac.update(payload.as_bytes());
        let bytes = mac.finalize().into_bytes();
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl SessionStore for HmacSessionStore {
    fn sign(&self, tgt: &str, user_id: &str) -> String {
        let payload = format!("{tgt}|{user_id}|{}", Utc::now().timestamp());
        let signature = self.mac_for(&payload);
        format!("{payload}|{signature}")
    }

    fn verify(&self, cookie_value: &str) -> Option<SessionClaims> {
        let mut parts = cookie_value.rsplitn(2, '|');
        let signature = parts.next()?;
        let payload = parts.next()?;

        if self.mac_for(payload) != signature {
            return None;
        }

        let mut fields = payload.splitn(3, '|');
        let tgt = fields.next()?.to_string();
        let user_id = fields.next()?.to_string();

        Some(SessionClaims { tgt, user_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> HmacSessionStore {
        HmacSessionStore::new(&SecurityConfig {
            session_secret: "unit-test-secret".to_string(),
            argon2_m_cost: 512,
            argon2_t_cost: 1,
            argon2_p_cost: 1,
        })
    }

    #[test]
    fn a_cookie_round_trips_through_sign_and_verify() {
        let store = store();
        let cookie = store.sign("TGT-0000000001-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "ellen");
        let claims = store.verify(&cookie).expect("valid signature should verify");
        assert_eq!(claims.user_id, "ellen");
        assert_eq!(claims.tgt, "TGT-0000000001-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
    }

    #[test]
    fn a_tampered_cookie_fails_verification() {
        let store = store();
        let mut cookie = store.sign("TGT-0000000001-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "ellen");
        cookie = cookie.replace("ellen", "mallory");
        assert!(store.verify(&cookie).is_none());
    }

    #[test]
    fn a_cookie_signed_with_a_different_secret_fails_verification() {
        let store_a = store();
        let store_b = HmacSessionStore::new(&SecurityConfig {
            session_secret: "a-different-secret".to_string(),
            argon2_m_cost: 512,
            argon2_t_cost: 1,
            argon2_p_cost: 1,
        });
        let cookie = store_a.sign("TGT-0000000001-aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa", "ellen");
        assert!(store_b.verify(&cookie).is_none());
    }
}
