/*!
 * # Authentication Module
 *
 * Callers present the PocketBase user token they obtained when logging in to
 * the dashboard (`Authorization: Bearer <token>`). The token is resolved to
 * its user record through the store's `auth-refresh` endpoint; the user's
 * `role` field drives [`permissions`].
 */

pub mod permissions;

use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::errors::{ErrorResponse, ServiceError};
use crate::models::User;
use crate::store::{decode_record, StoreError};
use crate::AppState;
pub use permissions::{Action, Role};

/// The user behind the current request.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn can(&self, action: Action) -> bool {
        permissions::can(self.role, action)
    }

    /// `Forbidden` unless the user's role allows `action`.
    pub fn require(&self, action: Action) -> Result<(), ServiceError> {
        if self.can(action) {
            Ok(())
        } else {
            warn!(user_id = %self.user_id, role = %self.role, %action, "permission denied");
            Err(ServiceError::Forbidden(format!(
                "role '{}' may not {}",
                self.role, action
            )))
        }
    }
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            role: Role::parse_lenient(&user.role),
            user_id: user.id,
            name: user.name,
            email: user.email,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Authentication backend unavailable: {0}")]
    Backend(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::MissingToken => (
                StatusCode::UNAUTHORIZED,
                "No authentication token provided".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "Invalid authentication token".to_string(),
            ),
            Self::Backend(_) => (
                StatusCode::BAD_GATEWAY,
                "Authentication backend unavailable".to_string(),
            ),
        };
        if status.is_server_error() {
            tracing::error!(error = %self, "authentication failed");
        }

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message,
            details: None,
            request_id: crate::tracing::current_request_id().map(|r| r.as_str().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        (status, Json(body)).into_response()
    }
}

/// Token from `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(AuthError::MissingToken)?;

        let record = state.store.authenticate(token).await.map_err(|e| match e {
            StoreError::Unauthorized(_) | StoreError::NotFound(_) => AuthError::InvalidToken,
            other => AuthError::Backend(other.to_string()),
        })?;
        let user: User = decode_record(record).map_err(|e| AuthError::Backend(e.to_string()))?;

        let user = AuthUser::from(user);
        debug!(user_id = %user.user_id, role = %user.role, "authenticated");
        Ok(user)
    }
}
