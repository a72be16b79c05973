//! API Routes for Teleharvest
//!
//! This module combines all API routes into a single router and applies
//! the HTTP layers (request tracing and CORS).

mod analytics;
pub mod status;

use std::time::Duration;

use axum::http::HeaderValue;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use analytics::ApiQuery;

use crate::AppState;

/// Requests still running after this are answered with 408.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the complete API router.
///
/// Route structure:
/// - /api/* - Analytics queries
/// - /health, /health/ready - Health checks
pub fn routes() -> Router<AppState> {
    Router::new()
        .merge(status::routes())
        .nest("/api", analytics::routes())
}

/// CORS policy for the configured origins.
///
/// `*` (or an empty list) allows any origin without credentials; an explicit
/// list allows exactly those origins with credentials.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(origin = %o, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    // Credentials cannot be combined with wildcard methods/headers, so mirror
    // the request instead.
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(tower_http::cors::AllowMethods::mirror_request())
        .allow_headers(tower_http::cors::AllowHeaders::mirror_request())
        .allow_credentials(true)
}

/// The full application: routes, tracing, timeout, CORS, and state.
pub fn app(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .merge(routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(cors_origins))
                .layer(TimeoutLayer::new(REQUEST_TIMEOUT)),
        )
        .with_state(state)
}
