//! JWT Authentication
//!
//! HS256 bearer tokens carrying the user id, email and role level.

use chrono::Utc;
use erp_core::Id;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    /// Level of the user's role at issue time
    pub role_level: i32,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// JWT ID
    pub jti: String,
}

/// JWT errors
#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Token expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Missing token")]
    Missing,
    #[error("Token encoding failed: {0}")]
    EncodingFailed(String),
}

/// JWT service for creating and validating tokens
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expires_in_seconds: i64,
}

impl JwtService {
    pub fn new(secret: &[u8], expires_in_seconds: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            expires_in_seconds,
        }
    }

    pub fn expires_in_seconds(&self) -> i64 {
        self.expires_in_seconds
    }

    /// Create a new JWT token
    pub fn create_token(
        &self,
        user_id: Id,
        email: &str,
        role_level: i32,
    ) -> Result<String, JwtError> {
        let now = Utc::now().timestamp().max(0) as usize;

        let claims = Claims {
            sub: user_id.to_string(),
            email: email.to_string(),
            role_level,
            exp: now + self.expires_in_seconds.max(0) as usize,
            iat: now,
            jti: uuid::Uuid::new_v4().to_string(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| JwtError::EncodingFailed(e.to_string()))
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Invalid(e.to_string()),
            })?;

        Ok(token_data.claims)
    }

    /// Extract user ID from a validated token
    pub fn get_user_id(&self, token: &str) -> Result<Id, JwtError> {
        let claims = self.validate_token(token)?;
        claims
            .sub
            .parse()
            .map_err(|_| JwtError::Invalid("Invalid user ID in token".to_string()))
    }
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(authorization: &str) -> Option<&str> {
    let scheme = authorization.get(..7)?;
    let token = authorization.get(7..)?;
    if scheme.eq_ignore_ascii_case("bearer ") {
        Some(token.trim()).filter(|t| !t.is_empty())
    } else {
        None
    }
}
