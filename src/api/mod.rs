//! HTTP surface: the protected-access gate plus a small set of routes that
//! exercise it (`/health`, `/v1/me`, `/v1/greeting`).
//!
//! Route handlers never see raw tokens; they go through [`auth::require_auth`]
//! (401 on any failure) or [`auth::optional_auth`] (anonymous on any
//! failure), which own header parsing and verification.

use anyhow::Result;
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request},
    routing::options,
    Extension,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;
use utoipa_axum::router::OpenApiRouter;
use utoipa_swagger_ui::SwaggerUi;

use crate::profile::ProfileSync;
use crate::store::DocumentStore;
use crate::token::{RevocationCheck, TokenVerifier};

pub mod auth;
pub(crate) mod handlers;
mod openapi;

pub use openapi::openapi;

/// Shared state for the route handlers, injected as an [`Extension`].
pub struct ApiState {
    pub verifier: TokenVerifier,
    /// Revocation oracle, when one is wired in. A server fronting an external
    /// issuer runs without one and stays fully stateless.
    pub revocations: Option<Arc<dyn RevocationCheck>>,
    pub profiles: Arc<ProfileSync>,
    pub store: Arc<dyn DocumentStore>,
}

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Assemble the full application: documented routes, the preflight-only
/// `OPTIONS /health`, middleware layers and shared state.
#[must_use]
pub fn app(state: Arc<ApiState>) -> axum::Router {
    let cors = CorsLayer::new()
        .allow_headers(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(Any);

    let (router, api) = router().split_for_parts();
    router
        .route("/health", options(handlers::health::health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", api))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(state)),
        )
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, state: Arc<ApiState>) -> Result<()> {
    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app(state).into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
