use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::BackendError;

/// Audience the backend stamps on user access tokens.
pub const AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub role: Option<String>,
}

pub fn issue_token(
    user_id: Uuid,
    email: Option<&str>,
    secret: &str,
    ttl_secs: i64,
) -> Result<(String, i64), BackendError> {
    let now = Utc::now();
    let expiration = (now + Duration::seconds(ttl_secs)).timestamp();
    let claims = Claims {
        sub: user_id,
        email: email.map(str::to_string),
        aud: AUDIENCE.to_string(),
        exp: expiration,
        iat: now.timestamp(),
        role: Some(AUDIENCE.to_string()),
    };
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| BackendError::internal(format!("failed to sign token: {}", e)))?;
    Ok((token, expiration))
}

pub fn verify_token(token: &str, secret: &str) -> Result<Claims, BackendError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[AUDIENCE]);
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| BackendError::unauthenticated(format!("invalid token: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn issued_token_verifies() {
        let id = Uuid::new_v4();
        let (token, exp) = issue_token(id, Some("a@b.c"), "s3cret", 3600).unwrap();
        let claims = verify_token(&token, "s3cret").unwrap();
        assert_eq!(claims.sub, id);
        assert_eq!(claims.exp, exp);
        assert_eq!(claims.email.as_deref(), Some("a@b.c"));
    }

    #[test]
    fn wrong_secret_is_unauthenticated() {
        let (token, _) = issue_token(Uuid::new_v4(), None, "one", 3600).unwrap();
        let err = verify_token(&token, "two").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Unauthenticated);
    }

    #[test]
    fn expired_token_is_rejected() {
        let (token, _) = issue_token(Uuid::new_v4(), None, "s", -3600).unwrap();
        assert!(verify_token(&token, "s").is_err());
    }
}
