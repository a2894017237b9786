//! Email send record handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use mailcast_common::types::{CampaignId, EmailId, Paginated, UserId};
use mailcast_storage::models::{Email, EmailEvent, EmailEventType};
use mailcast_storage::repository::{EmailEventRepository, EmailRepository};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{AppState, AuthContext};
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::handlers::Pagination;

/// Query parameters for listing emails
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListEmailsQuery {
    /// Only emails sent for this campaign
    pub campaign_id: Option<CampaignId>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    Pagination::default().limit
}

/// Delivery status reported by the SMTP provider
#[derive(Debug, Deserialize, ToSchema)]
pub struct ProviderEvent {
    /// One of `delivered`, `bounced`, `complained`
    pub event_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub detail: serde_json::Value,
}

fn repo(state: &AppState) -> EmailRepository {
    EmailRepository::new(state.db_pool.pool().clone())
}

async fn load(state: &AppState, user_id: UserId, id: EmailId) -> ApiResult<Email> {
    repo(state)
        .get_for_user(user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Email"))
}

/// Provider reports may only move an email to a delivery outcome
fn parse_provider_event(event_type: &str) -> ApiResult<EmailEventType> {
    match event_type.parse::<EmailEventType>() {
        Ok(
            event @ (EmailEventType::Delivered
            | EmailEventType::Bounced
            | EmailEventType::Complained),
        ) => Ok(event),
        Ok(other) => Err(ApiError::validation(format!(
            "'{}' cannot be reported by a provider",
            other
        ))),
        Err(e) => Err(ApiError::validation(e)),
    }
}

/// List emails, newest first
#[utoipa::path(
    get,
    path = "/api/v1/emails",
    tag = "emails",
    params(ListEmailsQuery),
    responses((status = 200, description = "Paginated emails")),
    security(("bearer" = []))
)]
pub async fn list_emails(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListEmailsQuery>,
) -> ApiResult<Json<Paginated<Email>>> {
    let page = Pagination {
        limit: query.limit,
        offset: query.offset,
    };
    let repo = repo(&state);
    let data = repo
        .list_for_user(auth.user_id, query.campaign_id, page.limit(), page.offset())
        .await?;
    let total = repo.count_for_user(auth.user_id, query.campaign_id).await?;

    Ok(Json(Paginated {
        data,
        total,
        limit: page.limit(),
        offset: page.offset(),
    }))
}

/// Get an email
#[utoipa::path(
    get,
    path = "/api/v1/emails/{id}",
    tag = "emails",
    params(("id" = Uuid, Path, description = "Email ID")),
    responses(
        (status = 200, description = "Email", body = Email),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_email(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<EmailId>,
) -> ApiResult<Json<Email>> {
    Ok(Json(load(&state, auth.user_id, id).await?))
}

/// List an email's tracking and delivery events, oldest first
#[utoipa::path(
    get,
    path = "/api/v1/emails/{id}/events",
    tag = "emails",
    params(("id" = Uuid, Path, description = "Email ID")),
    responses((status = 200, description = "Events", body = [EmailEvent])),
    security(("bearer" = []))
)]
pub async fn list_email_events(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<EmailId>,
) -> ApiResult<Json<Vec<EmailEvent>>> {
    load(&state, auth.user_id, id).await?;
    let events = EmailEventRepository::new(state.db_pool.pool().clone())
        .list_for_email(id)
        .await?;
    Ok(Json(events))
}

/// Record a delivery, bounce or complaint reported by the provider
#[utoipa::path(
    post,
    path = "/api/v1/emails/{id}/events",
    tag = "emails",
    params(("id" = Uuid, Path, description = "Email ID")),
    request_body = ProviderEvent,
    responses(
        (status = 202, description = "Event recorded"),
        (status = 422, description = "Unsupported event type", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn report_email_event(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<EmailId>,
    Json(input): Json<ProviderEvent>,
) -> ApiResult<StatusCode> {
    let event_type = parse_provider_event(&input.event_type)?;
    load(&state, auth.user_id, id).await?;

    let detail = if input.detail.is_null() {
        serde_json::json!({})
    } else {
        input.detail
    };
    state.tracking.record_status(id, event_type, detail).await?;

    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_provider_events() {
        assert_eq!(
            parse_provider_event("bounced").unwrap(),
            EmailEventType::Bounced
        );
        assert_eq!(
            parse_provider_event("delivered").unwrap(),
            EmailEventType::Delivered
        );
        assert_eq!(parse_provider_event("opened").unwrap_err().status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(parse_provider_event("exploded").is_err());
    }
}
