use axum::{
    extract::Extension,
    http::HeaderMap,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

use crate::api::auth::optional_auth;
use crate::api::ApiState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GreetingResponse {
    pub greeting: String,
}

#[utoipa::path(
    get,
    path = "/v1/greeting",
    responses(
        (status = 200, description = "Personalized greeting, or the guest greeting when anonymous or when the presented token fails verification.", body = GreetingResponse),
    ),
    tag = "session"
)]
pub async fn greeting(headers: HeaderMap, state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let greeting = match optional_auth(&headers, &state).await {
        Some(user) => {
            // Display name first, then email, then a generic fallback.
            let name = user
                .name
                .or(user.email)
                .unwrap_or_else(|| "user".to_string());
            format!("Welcome back, {name}!")
        }
        None => "Hello, guest!".to_string(),
    };

    Json(GreetingResponse { greeting }).into_response()
}
