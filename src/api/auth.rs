//! Authenticated principal extraction for route handlers.
//!
//! Flow Overview: read the `Authorization` header, verify the bearer token
//! (plus revocation state when an oracle is wired in) and hand downstream
//! handlers an [`AuthUser`]. On the hard gate every failure mode maps to the
//! same 401 shape: a `WWW-Authenticate: Bearer` header and an
//! [`ErrorResponse`] body. The soft gate resolves failures to anonymous.

use axum::{
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::debug;
use utoipa::ToSchema;

use super::ApiState;
use crate::token::{IdentityClaims, VerifyError};

/// Authenticated user context derived from a verified bearer token.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub picture: Option<String>,
}

impl From<IdentityClaims> for AuthUser {
    fn from(claims: IdentityClaims) -> Self {
        Self {
            uid: claims.sub,
            email: claims.email,
            email_verified: claims.email_verified.unwrap_or(false),
            name: claims.name,
            picture: claims.picture,
        }
    }
}

/// Error body returned by every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
}

/// Resolve the `Authorization` header into an [`AuthUser`], or return the
/// ready-to-send 401 response.
///
/// # Errors
///
/// Returns the 401 [`Response`] for a missing, malformed, expired, revoked or
/// otherwise invalid token.
pub async fn require_auth(headers: &HeaderMap, state: &ApiState) -> Result<AuthUser, Response> {
    let claims = verify(headers, state).await.map_err(|err| {
        debug!(%err, "rejecting request");
        unauthorized(&err)
    })?;
    Ok(AuthUser::from(claims))
}

/// Soft variant of [`require_auth`]: any verification failure (absent header
/// included) resolves to an anonymous `None` instead of a 401, so routes
/// using it never reject a caller over credentials.
pub async fn optional_auth(headers: &HeaderMap, state: &ApiState) -> Option<AuthUser> {
    match verify(headers, state).await {
        Ok(claims) => Some(AuthUser::from(claims)),
        Err(err) => {
            debug!(%err, "treating caller as anonymous");
            None
        }
    }
}

async fn verify(headers: &HeaderMap, state: &ApiState) -> Result<IdentityClaims, VerifyError> {
    let header = match headers.get(header::AUTHORIZATION) {
        None => None,
        Some(value) => Some(
            value
                .to_str()
                .map_err(|_| VerifyError::MalformedHeader)?,
        ),
    };
    match &state.revocations {
        Some(revocations) => {
            state
                .verifier
                .verify_header_checked(header, revocations.as_ref())
                .await
        }
        None => state.verifier.verify_header(header),
    }
}

fn unauthorized(err: &VerifyError) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Bearer")],
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
        .into_response()
}
