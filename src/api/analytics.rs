//! Analytics Routes
//!
//! Read-only endpoints over the analytics views.
//!
//! Routes:
//! - GET /api/search - Keyword search over message text
//! - GET /api/detections - Object detections with optional filters
//! - GET /api/channel-activity/:channel - Daily message counts
//! - GET /api/top-objects - Most frequently detected objects
//! - GET /api/messages-with-objects - Messages joined to their detections

use axum::{
    async_trait,
    extract::{FromRequestParts, Path, Query, State},
    http::request::Parts,
    routing::get,
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use teleharvest_models::{
    ChannelActivityItem, DetectionRow, MessageRow, MessageWithObject, TopObjectItem,
};

use crate::db::{DetectionFilter, MessageObjectFilter};
use crate::{AppState, Error, Result};

/// Build analytics routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/search", get(search_messages))
        .route("/detections", get(list_detections))
        .route("/channel-activity/:channel", get(channel_activity))
        .route("/top-objects", get(top_objects))
        .route("/messages-with-objects", get(messages_with_objects))
}

// ============================================================================
// Extractors
// ============================================================================

/// Query string extractor whose failures are validation errors (422).
#[derive(Debug)]
pub struct ApiQuery<T>(pub T);

#[async_trait]
impl<T, S> FromRequestParts<S> for ApiQuery<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|e| Error::Validation(e.body_text()))?;
        Ok(Self(value))
    }
}

fn check_range(name: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if value < min || value > max {
        return Err(Error::Validation(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )));
    }
    Ok(())
}

fn check_min(name: &str, value: i64, min: i64) -> Result<()> {
    if value < min {
        return Err(Error::Validation(format!(
            "{} must be at least {}, got {}",
            name, min, value
        )));
    }
    Ok(())
}

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
}

fn default_search_limit() -> i64 {
    50
}

#[derive(Debug, Deserialize)]
pub struct DetectionsQuery {
    pub channel: Option<String>,
    pub object_name: Option<String>,
    #[serde(default)]
    pub min_confidence: f64,
    #[serde(default = "default_detections_limit")]
    pub limit: i64,
}

fn default_detections_limit() -> i64 {
    100
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    #[serde(default = "default_days")]
    pub days: i64,
}

fn default_days() -> i64 {
    90
}

#[derive(Debug, Deserialize)]
pub struct TopObjectsQuery {
    #[serde(default = "default_top_limit")]
    pub limit: i64,
}

fn default_top_limit() -> i64 {
    20
}

#[derive(Debug, Deserialize)]
pub struct MessagesWithObjectsQuery {
    pub channel: Option<String>,
    pub object_name: Option<String>,
    #[serde(default = "default_search_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

// ============================================================================
// Handlers
// ============================================================================

/// Search message text for a keyword (case-insensitive).
///
/// GET /api/search?q=<text>&limit=<n>
#[axum::debug_handler]
async fn search_messages(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<SearchQuery>,
) -> Result<Json<Vec<MessageRow>>> {
    if query.q.chars().count() < 2 {
        return Err(Error::Validation(
            "q must be at least 2 characters".to_string(),
        ));
    }
    check_range("limit", query.limit, 1, 1000)?;

    let rows = state.analytics.search_messages(&query.q, query.limit).await?;
    Ok(Json(rows))
}

/// Object detections, highest confidence first.
///
/// GET /api/detections?channel=&object_name=&min_confidence=&limit=
#[axum::debug_handler]
async fn list_detections(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<DetectionsQuery>,
) -> Result<Json<Vec<DetectionRow>>> {
    // No upper bound here, unlike the other listing endpoints
    check_min("limit", query.limit, 1)?;

    let filter = DetectionFilter {
        channel: query.channel,
        object_name: query.object_name,
        min_confidence: query.min_confidence,
        limit: query.limit,
    };
    let rows = state.analytics.detections(&filter).await?;
    Ok(Json(rows))
}

/// Daily message counts for a channel over the last `days` days.
///
/// GET /api/channel-activity/:channel?days=<n>
#[axum::debug_handler]
async fn channel_activity(
    State(state): State<AppState>,
    Path(channel): Path<String>,
    ApiQuery(query): ApiQuery<ActivityQuery>,
) -> Result<Json<Vec<ChannelActivityItem>>> {
    check_range("days", query.days, 1, 365)?;

    let rows = state
        .analytics
        .channel_activity(&channel, query.days as i32)
        .await?;
    Ok(Json(rows))
}

/// GET /api/top-objects?limit=<n>
#[axum::debug_handler]
async fn top_objects(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<TopObjectsQuery>,
) -> Result<Json<Vec<TopObjectItem>>> {
    check_range("limit", query.limit, 1, 200)?;

    let rows = state.analytics.top_objects(query.limit).await?;
    Ok(Json(rows))
}

/// Messages with media joined to their detected objects (if any).
///
/// GET /api/messages-with-objects?channel=&object_name=&limit=&offset=
#[axum::debug_handler]
async fn messages_with_objects(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<MessagesWithObjectsQuery>,
) -> Result<Json<Vec<MessageWithObject>>> {
    check_range("limit", query.limit, 1, 1000)?;
    check_min("offset", query.offset, 0)?;

    let filter = MessageObjectFilter {
        channel: query.channel,
        object_name: query.object_name,
        limit: query.limit,
        offset: query.offset,
    };
    let rows = state.analytics.messages_with_objects(&filter).await?;
    Ok(Json(rows))
}
