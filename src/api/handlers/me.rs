//! Authenticated self-service endpoint.
//!
//! Flow Overview:
//! 1) Authenticate via bearer token.
//! 2) Resolve the profile document for the token's `uid`.
//! 3) Return token claims plus the profile, when one exists.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;

use crate::api::auth::{require_auth, ErrorResponse};
use crate::api::ApiState;
use crate::profile::ProfileDocument;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MeResponse {
    pub uid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub email_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// Profile document, absent when the sign-up write has not landed yet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile: Option<ProfileDocument>,
}

#[utoipa::path(
    get,
    path = "/v1/me",
    responses(
        (status = 200, description = "Return the authenticated user.", body = MeResponse),
        (status = 401, description = "Missing or invalid bearer token.", body = ErrorResponse),
        (status = 500, description = "Profile lookup failed.", body = ErrorResponse),
    ),
    tag = "session"
)]
pub async fn me(headers: HeaderMap, state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let user = match require_auth(&headers, &state).await {
        Ok(user) => user,
        Err(response) => return response,
    };

    let profile = match state.profiles.get_profile(&user.uid).await {
        Ok(profile) => profile,
        Err(err) => {
            error!("Failed to fetch /v1/me profile: {err}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Internal server error".to_string(),
                }),
            )
                .into_response();
        }
    };

    let response = MeResponse {
        uid: user.uid,
        email: user.email,
        email_verified: user.email_verified,
        name: user.name,
        picture: user.picture,
        profile,
    };
    (StatusCode::OK, Json(response)).into_response()
}
