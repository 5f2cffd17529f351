//! Request authentication
//!
//! Turns a bearer token (header or `?token=` for WebSocket upgrades) into a
//! [`CurrentUser`] with resolved permissions.

use std::sync::Arc;

use erp_core::{ErpError, ErpResult};
use thiserror::Error;
use tracing::debug;

use crate::jwt::{extract_bearer_token, JwtError, JwtService};
use crate::permissions::CurrentUser;
use crate::resolver::PermissionResolver;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    Required,
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
}

impl From<JwtError> for AuthError {
    fn from(err: JwtError) -> Self {
        match err {
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::Missing => AuthError::Required,
            JwtError::Invalid(_) | JwtError::EncodingFailed(_) => AuthError::InvalidToken,
        }
    }
}

impl From<AuthError> for ErpError {
    fn from(err: AuthError) -> Self {
        ErpError::unauthorized(err.to_string())
    }
}

/// Request headers relevant for authentication
#[derive(Debug, Default)]
pub struct RequestHeaders {
    pub authorization: Option<String>,
    /// `token` query parameter
    pub query_token: Option<String>,
}

impl RequestHeaders {
    /// Create from a list of header key-value pairs
    pub fn from_pairs(pairs: &[(impl AsRef<str>, impl AsRef<str>)]) -> Self {
        let mut headers = Self::default();

        for (name, value) in pairs {
            if name.as_ref().eq_ignore_ascii_case("authorization") {
                headers.authorization = Some(value.as_ref().to_string());
            }
        }

        headers
    }

    pub fn with_query_token(mut self, token: Option<String>) -> Self {
        self.query_token = token;
        self
    }

    fn token(&self) -> Option<&str> {
        self.authorization
            .as_deref()
            .and_then(extract_bearer_token)
            .or(self.query_token.as_deref().filter(|t| !t.is_empty()))
    }
}

/// Authenticator for validating requests
pub struct Authenticator {
    jwt: Arc<JwtService>,
    resolver: Arc<PermissionResolver>,
}

impl Authenticator {
    pub fn new(jwt: Arc<JwtService>, resolver: Arc<PermissionResolver>) -> Self {
        Self { jwt, resolver }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Authenticate a request using available headers
    pub async fn authenticate(&self, headers: &RequestHeaders) -> ErpResult<CurrentUser> {
        let token = headers.token().ok_or(AuthError::Required)?;
        self.authenticate_token(token).await
    }

    pub async fn authenticate_token(&self, token: &str) -> ErpResult<CurrentUser> {
        let user_id = self.jwt.get_user_id(token).map_err(AuthError::from)?;
        debug!(user_id, "Token accepted");
        self.resolver.resolve(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use erp_db::Stores;
    use erp_models::{NewUser, UserStatus};
    use std::time::Duration;

    const SECRET: &[u8] = b"test-secret-key-at-least-32-bytes";

    async fn authenticator() -> (Authenticator, String) {
        let stores = Stores::memory();
        let user = stores
            .users
            .create(NewUser {
                name: "Test".into(),
                email: "test@example.com".into(),
                password_hash: String::new(),
                role_id: None,
                status: UserStatus::Active,
            })
            .await
            .unwrap();

        let jwt = Arc::new(JwtService::new(SECRET, 3600));
        let token = jwt.create_token(user.id, &user.email, 0).unwrap();
        let resolver = Arc::new(PermissionResolver::new(&stores, Duration::from_secs(60)));
        (Authenticator::new(jwt, resolver), token)
    }

    #[tokio::test]
    async fn test_jwt_authentication() {
        let (authenticator, token) = authenticator().await;
        let headers = RequestHeaders::from_pairs(&[("Authorization", format!("Bearer {}", token))]);

        let user = authenticator.authenticate(&headers).await.unwrap();
        assert_eq!(user.email, "test@example.com");
    }

    #[tokio::test]
    async fn test_query_token_authentication() {
        let (authenticator, token) = authenticator().await;
        let headers = RequestHeaders::default().with_query_token(Some(token));

        assert!(authenticator.authenticate(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn test_authentication_required() {
        let (authenticator, _) = authenticator().await;

        let err = authenticator
            .authenticate(&RequestHeaders::default())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.to_string(), "Authentication required");
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let (authenticator, _) = authenticator().await;
        let err = authenticator.authenticate_token("not.a.jwt").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid token");
    }
}
