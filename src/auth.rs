use crate::{error::AppError, AppState};
use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use subtle::ConstantTimeEq;

/// Extractor that enforces admin authentication on any handler that includes
/// it as a parameter. The request must carry `Authorization: Bearer <ADMIN_PASSWORD>`;
/// otherwise the handler never runs and the client gets a 401.
pub struct AdminAuth;

/// Constant-time comparison of a supplied credential against the expected one.
pub fn credentials_match(supplied: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(supplied.as_bytes().ct_eq(expected.as_bytes()))
}

fn bearer(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminAuth
where
    S: Send + Sync,
    Arc<AppState>: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = Arc::<AppState>::from_ref(state);

        match bearer(parts) {
            Some(token) if credentials_match(token, &state.config.admin_password) => Ok(AdminAuth),
            _ => {
                tracing::debug!(path = %parts.uri.path(), "Rejected admin request");
                Err(AppError::Unauthorized)
            }
        }
    }
}
