//! Session token verification
//!
//! Sessions are minted by the identity provider as HS256 JWTs and verified
//! locally with the shared secret.

use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Audience the identity provider stamps on user sessions
pub const SESSION_AUDIENCE: &str = "authenticated";

/// JWT-related errors
#[derive(Error, Debug)]
pub enum JwtError {
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),

    #[error("Token decoding failed: {0}")]
    DecodingFailed(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),
}

/// Claims carried by an identity-provider session
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Database role, `authenticated` for signed-in users
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    /// Server-controlled metadata; `role: "admin"` grants the back-office
    #[serde(default)]
    pub app_metadata: serde_json::Value,
}

impl SessionClaims {
    pub fn user_id(&self) -> Result<Uuid, JwtError> {
        Uuid::parse_str(&self.sub).map_err(|e| JwtError::InvalidToken(e.to_string()))
    }

    pub fn is_admin(&self) -> bool {
        self.app_metadata
            .get("role")
            .and_then(|role| role.as_str())
            .map_or(false, |role| role == "admin")
    }
}

/// Verifies session tokens against the identity provider's signing secret
#[derive(Clone)]
pub struct SessionVerifier {
    secret: String,
}

impl SessionVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify and decode a session token
    pub fn verify(&self, token: &str) -> Result<SessionClaims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SESSION_AUDIENCE]);
        validation.validate_exp = true;

        let token_data = decode::<SessionClaims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => JwtError::TokenExpired,
            _ => JwtError::DecodingFailed(e.to_string()),
        })?;

        Ok(token_data.claims)
    }
}

/// Sign a session token the way the identity provider does. Used by local
/// tooling and tests.
pub fn issue_session_token(claims: &SessionClaims, secret: &str) -> Result<String, JwtError> {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| JwtError::EncodingFailed(e.to_string()))
}

/// Claims for a fresh session of `user_id` lasting `ttl_seconds`
pub fn session_claims(user_id: Uuid, ttl_seconds: i64, admin: bool) -> SessionClaims {
    let now = Utc::now();
    let app_metadata = if admin {
        serde_json::json!({ "provider": "email", "role": "admin" })
    } else {
        serde_json::json!({ "provider": "email" })
    };

    SessionClaims {
        sub: user_id.to_string(),
        email: None,
        phone: None,
        role: Some("authenticated".to_string()),
        aud: SESSION_AUDIENCE.to_string(),
        exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
        iat: now.timestamp(),
        app_metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret-key";

    #[test]
    fn test_verify_session_token() {
        let user_id = Uuid::new_v4();
        let token = issue_session_token(&session_claims(user_id, 900, false), SECRET).unwrap();

        let claims = SessionVerifier::new(SECRET).verify(&token).unwrap();
        assert_eq!(claims.user_id().unwrap(), user_id);
        assert!(!claims.is_admin());
    }

    #[test]
    fn test_admin_claim() {
        let token =
            issue_session_token(&session_claims(Uuid::new_v4(), 900, true), SECRET).unwrap();
        let claims = SessionVerifier::new(SECRET).verify(&token).unwrap();
        assert!(claims.is_admin());
    }

    #[test]
    fn test_expired_token() {
        let token =
            issue_session_token(&session_claims(Uuid::new_v4(), -3600, false), SECRET).unwrap();
        let result = SessionVerifier::new(SECRET).verify(&token);
        assert!(matches!(result, Err(JwtError::TokenExpired)));
    }

    #[test]
    fn test_wrong_audience() {
        let mut claims = session_claims(Uuid::new_v4(), 900, false);
        claims.aud = "anon".to_string();
        let token = issue_session_token(&claims, SECRET).unwrap();
        assert!(SessionVerifier::new(SECRET).verify(&token).is_err());
    }

    #[test]
    fn test_wrong_secret() {
        let token =
            issue_session_token(&session_claims(Uuid::new_v4(), 900, false), "secret1").unwrap();
        assert!(SessionVerifier::new("secret2").verify(&token).is_err());
    }

    #[test]
    fn test_invalid_token() {
        assert!(SessionVerifier::new(SECRET)
            .verify("invalid.token.here")
            .is_err());
    }
}
