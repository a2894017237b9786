//! Public tracking and unsubscribe endpoints.
//!
//! These are hit by mail clients, not API users, so they sit outside the
//! bearer-auth layer. The token itself is the credential.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use mailcast_core::tracking::redirect_target;
use mailcast_core::TrackingError;
use mailcast_storage::repository::ContactRepository;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AppState;
use crate::error::{ApiError, ApiResult, ErrorResponse};

/// Transparent 1x1 GIF
pub const PIXEL_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

/// Query of a click redirect
#[derive(Debug, Deserialize, IntoParams)]
pub struct ClickQuery {
    /// Original link target
    pub url: String,
}

/// Query of an unsubscribe link
#[derive(Debug, Deserialize, IntoParams)]
pub struct UnsubscribeQuery {
    #[serde(default)]
    pub token: String,
}

/// Unsubscribe confirmation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct UnsubscribeResponse {
    pub status: String,
    pub email: String,
}

fn pixel() -> Response {
    (
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-store, no-cache, must-revalidate"),
        ],
        PIXEL_GIF,
    )
        .into_response()
}

/// Open-tracking pixel.
///
/// Always answers with the image; a bad token or a failed write is only
/// logged so mail clients never render a broken image.
#[utoipa::path(
    get,
    path = "/track/open/{token}",
    tag = "tracking",
    params(("token" = String, Path, description = "Tracking token")),
    responses((status = 200, description = "1x1 transparent GIF", body = Vec<u8>, content_type = "image/gif"))
)]
pub async fn track_open(State(state): State<Arc<AppState>>, Path(token): Path<String>) -> Response {
    match state.tracking.record_open(&token).await {
        Ok(email_id) => debug!(email_id = %email_id, "Open tracked"),
        Err(TrackingError::Database(e)) => error!("Failed to record open: {}", e),
        Err(e) => debug!("Ignoring open with bad token: {}", e),
    }
    pixel()
}

/// Click-tracking redirect
#[utoipa::path(
    get,
    path = "/track/click/{token}",
    tag = "tracking",
    params(("token" = String, Path, description = "Tracking token"), ClickQuery),
    responses(
        (status = 302, description = "Redirect to the original link"),
        (status = 400, description = "Missing or unsafe target URL", body = ErrorResponse),
        (status = 404, description = "Unknown tracking token", body = ErrorResponse)
    )
)]
pub async fn track_click(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Query(query): Query<ClickQuery>,
) -> ApiResult<Redirect> {
    // Only absolute http(s) targets are followed
    let target = redirect_target(&query.url)
        .ok_or_else(|| ApiError::bad_request("url must be an absolute http(s) URL"))?;

    match state.tracking.record_click(&token, target.as_str()).await {
        Ok(email_id) => debug!(email_id = %email_id, "Click tracked"),
        // Still send the reader where they were going
        Err(TrackingError::Database(e)) => error!("Failed to record click: {}", e),
        Err(e) => return Err(e.into()),
    }

    Ok(Redirect::to(target.as_str()))
}

async fn unsubscribe_contact(state: &AppState, token: &str) -> ApiResult<UnsubscribeResponse> {
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::bad_request("token is required"));
    }

    let contact = ContactRepository::new(state.db_pool.pool().clone())
        .unsubscribe_by_token(token)
        .await?
        .ok_or_else(|| ApiError::not_found("Subscription"))?;

    info!(contact_id = %contact.id, user_id = %contact.user_id, "Contact unsubscribed");

    Ok(UnsubscribeResponse {
        status: "unsubscribed".to_string(),
        email: contact.email,
    })
}

/// Unsubscribe link from an email footer
#[utoipa::path(
    get,
    path = "/unsubscribe",
    tag = "tracking",
    params(UnsubscribeQuery),
    responses(
        (status = 200, description = "Contact unsubscribed", body = UnsubscribeResponse),
        (status = 400, description = "Missing token", body = ErrorResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse)
    )
)]
pub async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeQuery>,
) -> ApiResult<Json<UnsubscribeResponse>> {
    Ok(Json(unsubscribe_contact(&state, &query.token).await?))
}

/// One-click unsubscribe (RFC 8058), posted by mail clients from the
/// `List-Unsubscribe` header
#[utoipa::path(
    post,
    path = "/unsubscribe",
    tag = "tracking",
    params(UnsubscribeQuery),
    responses(
        (status = 200, description = "Contact unsubscribed"),
        (status = 404, description = "Unknown token", body = ErrorResponse)
    )
)]
pub async fn unsubscribe_one_click(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeQuery>,
) -> ApiResult<StatusCode> {
    unsubscribe_contact(&state, &query.token).await?;
    Ok(StatusCode::OK)
}
