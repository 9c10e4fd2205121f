//! Bearer token issue and verification.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub username: String,
    pub role: String,
    /// Identifier of the signing key the token was minted with.
    pub kid: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(
        user_id: String,
        username: String,
        role: String,
        key_id: String,
        expiration_hours: u64,
    ) -> Self {
        let now = Utc::now();
        let exp = now + Duration::hours(expiration_hours as i64);
        Claims {
            sub: user_id,
            username,
            role,
            kid: key_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or_else(Utc::now)
    }
}

pub fn create_access_token(
    user_id: String,
    username: String,
    role: String,
    secret: &str,
    key_id: &str,
    expiration_hours: u64,
) -> anyhow::Result<(String, Claims)> {
    let claims = Claims::new(
        user_id,
        username,
        role,
        key_id.to_string(),
        expiration_hours,
    );
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;
    Ok((token, claims))
}

/// Validates signature and expiry, then checks the token was minted with the
/// active signing key. Malformed input maps to `InvalidToken`; a valid shape
/// failing signature/expiry/key checks maps to `Unauthenticated`.
pub fn verify_access_token(token: &str, secret: &str, active_key_id: &str) -> Result<Claims, AppError> {
    if token.is_empty() || token.split('.').count() != 3 {
        return Err(AppError::InvalidToken("Malformed bearer token".to_string()));
    }
    let validation = Validation::default();
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::Base64(_)
        | jsonwebtoken::errors::ErrorKind::Json(_)
        | jsonwebtoken::errors::ErrorKind::Utf8(_) => {
            AppError::InvalidToken("Malformed bearer token".to_string())
        }
        _ => AppError::Unauthenticated("Invalid or expired token".to_string()),
    })?;
    if token_data.claims.kid != active_key_id {
        return Err(AppError::Unauthenticated(
            "Token signed with an inactive key".to_string(),
        ));
    }
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-signing-secret-at-least-32-chars!";

    #[test]
    fn create_and_verify_round_trip() {
        let (token, _) = create_access_token(
            "user-123".into(),
            "tanaka".into(),
            "approver".into(),
            SECRET,
            "k1",
            8,
        )
        .expect("create token");
        let claims = verify_access_token(&token, SECRET, "k1").expect("verify token");
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.role, "approver");
        assert_eq!(claims.kid, "k1");
    }

    #[test]
    fn inactive_key_id_is_rejected() {
        let (token, _) = create_access_token(
            "user-123".into(),
            "tanaka".into(),
            "user".into(),
            SECRET,
            "k1",
            8,
        )
        .unwrap();
        let err = verify_access_token(&token, SECRET, "k2").unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn malformed_token_maps_to_invalid_token() {
        let err = verify_access_token("not-a-jwt", SECRET, "k1").unwrap_err();
        assert!(matches!(err, AppError::InvalidToken(_)));
    }

    #[test]
    fn wrong_secret_maps_to_unauthenticated() {
        let (token, _) = create_access_token(
            "user-123".into(),
            "tanaka".into(),
            "user".into(),
            SECRET,
            "k1",
            8,
        )
        .unwrap();
        let err =
            verify_access_token(&token, "another-secret-that-is-32-chars-long!", "k1").unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }
}
