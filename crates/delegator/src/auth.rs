//! Bearer JWT verification for the `api` feature. HS256 with a static
//! shared key; the current-time function is injected so dev mode can
//! disable expiry checks without special-casing the verification logic
//! itself.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::error::DelegatorError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    pub exp: i64,
}

pub type NowFn = fn() -> i64;

pub fn system_now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Dev mode: tokens never expire, since every real `exp` claim is a
/// positive Unix timestamp and the zero instant is always in the past.
pub fn dev_now() -> i64 {
    0
}

/// Parses and validates a bearer token from an `Authorization` header
/// value. `exp` validation uses `now_fn` rather than jsonwebtoken's
/// built-in clock, so tests and dev mode can control it.
pub fn verify_bearer(header: Option<&str>, jwt_key: &str, now_fn: NowFn) -> Result<Claims, DelegatorError> {
    let token = header.and_then(|h| h.strip_prefix("Bearer ")).ok_or(DelegatorError::Unauthorized)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = false;
    validation.required_spec_claims.clear();

    let data = decode::<Claims>(token, &DecodingKey::from_secret(jwt_key.as_bytes()), &validation)
        .map_err(|_| DelegatorError::Unauthorized)?;

    if data.claims.id.is_empty() {
        return Err(DelegatorError::Unauthorized);
    }
    if data.claims.exp <= now_fn() {
        return Err(DelegatorError::Unauthorized);
    }
    Ok(data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token_for(id: &str, exp: i64, key: &str) -> String {
        let claims = Claims { id: id.to_string(), exp };
        encode(&Header::new(Algorithm::HS256), &claims, &EncodingKey::from_secret(key.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_valid_unexpired_token() {
        let token = token_for("u1", system_now() + 3600, "secret");
        let header = format!("Bearer {token}");
        let claims = verify_bearer(Some(&header), "secret", system_now).expect("valid");
        assert_eq!(claims.id, "u1");
    }

    #[test]
    fn rejects_missing_header() {
        assert!(matches!(verify_bearer(None, "secret", system_now), Err(DelegatorError::Unauthorized)));
    }

    #[test]
    fn rejects_expired_token() {
        let token = token_for("u1", system_now() - 10, "secret");
        let header = format!("Bearer {token}");
        assert!(matches!(verify_bearer(Some(&header), "secret", system_now), Err(DelegatorError::Unauthorized)));
    }

    #[test]
    fn rejects_wrong_key() {
        let token = token_for("u1", system_now() + 3600, "secret");
        let header = format!("Bearer {token}");
        assert!(matches!(verify_bearer(Some(&header), "other-secret", system_now), Err(DelegatorError::Unauthorized)));
    }

    #[test]
    fn dev_mode_never_expires() {
        let token = token_for("u1", 1, "secret");
        let header = format!("Bearer {token}");
        assert!(verify_bearer(Some(&header), "secret", dev_now).is_ok());
    }

    #[test]
    fn rejects_empty_id_claim() {
        let token = token_for("", system_now() + 3600, "secret");
        let header = format!("Bearer {token}");
        assert!(matches!(verify_bearer(Some(&header), "secret", system_now), Err(DelegatorError::Unauthorized)));
    }
}
