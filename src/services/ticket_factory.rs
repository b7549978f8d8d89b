use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

use crate::common::ApiError;

const ALPHANUMERIC: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
const SUFFIX_LEN: usize = 32;
const SEQUENCE_MODULUS: u64 = 10_000_000_000;
const MAX_COLLISION_RETRIES: usize = 3;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Builds identifiers of the form `PREFIX-NNNNNNNNNN-XXXX...X` (10-digit zero-padded decimal,
/// 32 alphanumeric characters sampled from a cryptographically strong RNG). The decimal
/// component is a process-wide monotonic counter rather than a per-kind sequence so the facade
/// stays a free function; global uniqueness is still the Store's primary-key constraint's job,
/// with this function retried by the caller on collision (§4.2).
pub fn new_identifier(prefix: &str) -> String {
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed) % SEQUENCE_MODULUS;
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHANUMERIC[rng.gen_range(0..ALPHANUMERIC.len())] as char)
        .collect();
    format!("{prefix}-{sequence:010}-{suffix}")
}

/// Generates a fresh `prefix`-ed identifier and hands it to `insert`, retrying with a new
/// identifier if `insert` reports a primary-key collision (§4.2) — global uniqueness is still the
/// Store's constraint's job, this just absorbs the vanishingly rare retry.
pub async fn new_ticket_with_retry<T, F, Fut>(prefix: &str, mut insert: F) -> Result<T, ApiError>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let mut last_err = None;
    for _ in 0..MAX_COLLISION_RETRIES {
        match insert(new_identifier(prefix)).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_unique_violation() => last_err = Some(err),
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("loop runs at least once"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    #[test]
    fn identifier_matches_the_expected_shape() {
        let re = Regex::new(r"^ST-[0-9]{10}-[A-Za-z0-9]{32}$").unwrap();
        let id = new_identifier("ST");
        assert!(re.is_match(&id), "identifier {id} did not match shape");
    }

    #[test]
    fn successive_identifiers_are_unique() {
        let a = new_identifier("PGT");
        let b = new_identifier("PGT");
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn retries_past_a_unique_violation_then_succeeds() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result = new_ticket_with_retry("ST", |ticket| {
            let attempt = attempts.fetch_add(1, Ordering::Relaxed);
            async move {
                if attempt == 0 {
                    Err(ApiError::database("duplicate key value violates unique constraint"))
                } else {
                    Ok(ticket)
                }
            }
        })
        .await;

        assert!(result.is_ok());
        assert_eq!(attempts.load(Ordering::Relaxed), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts_on_persistent_collisions() {
        let result: Result<String, ApiError> = new_ticket_with_retry("ST", |_| async {
            Err(ApiError::database("duplicate key value violates unique constraint"))
        })
        .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_collision_errors_are_not_retried() {
        let attempts = std::sync::atomic::AtomicU32::new(0);
        let result: Result<String, ApiError> = new_ticket_with_retry("ST", |_| {
            attempts.fetch_add(1, Ordering::Relaxed);
            async { Err(ApiError::internal("connection pool exhausted")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::Relaxed), 1);
    }
}
