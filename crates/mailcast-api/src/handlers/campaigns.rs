//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use mailcast_common::types::{CampaignId, EmailId, Paginated, UserId};
use mailcast_storage::models::{Campaign, CampaignStatus, CreateCampaign, UpdateCampaign};
use mailcast_storage::repository::{
    BrandRepository, CampaignRepository, GroupRepository, SenderAddressRepository,
    TemplateRepository,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::auth::{AppState, AuthContext};
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::handlers::{is_email_like, Pagination};

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize, IntoParams)]
pub struct ListCampaignsQuery {
    /// Filter by status
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl ListCampaignsQuery {
    fn page(&self) -> Pagination {
        Pagination {
            limit: self.limit,
            offset: self.offset,
        }
    }
}

fn default_limit() -> i64 {
    Pagination::default().limit
}

/// Response to a send-now request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct SendAccepted {
    pub status: String,
    pub total_recipients: usize,
}

/// Request body for a test send
#[derive(Debug, Deserialize, ToSchema)]
pub struct TestSendRequest {
    pub email: String,
    pub name: Option<String>,
}

/// Response to a test send
#[derive(Debug, Serialize, ToSchema)]
pub struct TestSendResponse {
    pub email_id: EmailId,
    pub message_id: String,
}

fn repo(state: &AppState) -> CampaignRepository {
    CampaignRepository::new(state.db_pool.pool().clone())
}

async fn load(state: &AppState, user_id: UserId, id: CampaignId) -> ApiResult<Campaign> {
    repo(state)
        .get_for_user(user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Campaign"))
}

fn ensure_pending(campaign: &Campaign) -> ApiResult<()> {
    match campaign.status_enum() {
        Some(status) if status.is_pending() => Ok(()),
        _ => Err(ApiError::new(
            StatusCode::CONFLICT,
            "invalid_status",
            format!("Campaign is '{}' and can no longer be changed", campaign.status),
        )),
    }
}

/// Referenced group, template, brand and sender must belong to the caller
async fn check_references(
    state: &AppState,
    user_id: UserId,
    group_id: Option<Uuid>,
    template_id: Option<Uuid>,
    brand_id: Option<Uuid>,
    sender_address_id: Option<Uuid>,
) -> ApiResult<()> {
    let pool = state.db_pool.pool().clone();

    if let Some(id) = group_id {
        GroupRepository::new(pool.clone())
            .get_for_user(user_id, id)
            .await?
            .ok_or_else(|| ApiError::validation("Unknown group_id"))?;
    }
    if let Some(id) = template_id {
        TemplateRepository::new(pool.clone())
            .get_for_user(user_id, id)
            .await?
            .ok_or_else(|| ApiError::validation("Unknown template_id"))?;
    }
    if let Some(id) = brand_id {
        BrandRepository::new(pool.clone())
            .get_for_user(user_id, id)
            .await?
            .ok_or_else(|| ApiError::validation("Unknown brand_id"))?;
    }
    if let Some(id) = sender_address_id {
        SenderAddressRepository::new(pool)
            .get_for_user(user_id, id)
            .await?
            .ok_or_else(|| ApiError::validation("Unknown sender_address_id"))?;
    }

    Ok(())
}

/// List campaigns
#[utoipa::path(
    get,
    path = "/api/v1/campaigns",
    tag = "campaigns",
    params(ListCampaignsQuery),
    responses((status = 200, description = "Paginated campaigns")),
    security(("bearer" = []))
)]
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListCampaignsQuery>,
) -> ApiResult<Json<Paginated<Campaign>>> {
    let status = query
        .status
        .as_deref()
        .map(|s| s.parse::<CampaignStatus>().map_err(ApiError::validation))
        .transpose()?;

    let page = query.page();
    let repo = repo(&state);
    let data = repo
        .list_for_user(auth.user_id, status, page.limit(), page.offset())
        .await?;
    let total = repo.count_for_user(auth.user_id, status).await?;

    Ok(Json(Paginated {
        data,
        total,
        limit: page.limit(),
        offset: page.offset(),
    }))
}

/// Create a campaign
#[utoipa::path(
    post,
    path = "/api/v1/campaigns",
    tag = "campaigns",
    request_body = CreateCampaign,
    responses(
        (status = 201, description = "Campaign created", body = Campaign),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateCampaign>,
) -> ApiResult<(StatusCode, Json<Campaign>)> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }

    check_references(
        &state,
        auth.user_id,
        input.group_id,
        input.template_id,
        input.brand_id,
        input.sender_address_id,
    )
    .await?;

    let campaign = repo(&state).create(auth.user_id, input).await?;

    info!(
        campaign_id = %campaign.id,
        user_id = %auth.user_id,
        status = %campaign.status,
        "Created campaign"
    );

    Ok((StatusCode::CREATED, Json(campaign)))
}

/// Get a campaign
#[utoipa::path(
    get,
    path = "/api/v1/campaigns/{id}",
    tag = "campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 200, description = "Campaign", body = Campaign),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<CampaignId>,
) -> ApiResult<Json<Campaign>> {
    Ok(Json(load(&state, auth.user_id, id).await?))
}

/// Update a draft or scheduled campaign
#[utoipa::path(
    put,
    path = "/api/v1/campaigns/{id}",
    tag = "campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = UpdateCampaign,
    responses(
        (status = 200, description = "Campaign updated", body = Campaign),
        (status = 409, description = "Campaign already sent", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<CampaignId>,
    Json(input): Json<UpdateCampaign>,
) -> ApiResult<Json<Campaign>> {
    ensure_pending(&load(&state, auth.user_id, id).await?)?;

    if input.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
        return Err(ApiError::validation("name cannot be empty"));
    }

    check_references(
        &state,
        auth.user_id,
        input.group_id,
        input.template_id,
        input.brand_id,
        input.sender_address_id,
    )
    .await?;

    // None here means a concurrent send moved it out of draft/scheduled
    let campaign = repo(&state)
        .update(auth.user_id, id, input)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::CONFLICT,
                "invalid_status",
                "Campaign can no longer be changed",
            )
        })?;

    Ok(Json(campaign))
}

/// Delete a draft or scheduled campaign
#[utoipa::path(
    delete,
    path = "/api/v1/campaigns/{id}",
    tag = "campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 204, description = "Campaign deleted"),
        (status = 409, description = "Campaign already sent", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<CampaignId>,
) -> ApiResult<StatusCode> {
    ensure_pending(&load(&state, auth.user_id, id).await?)?;

    if !repo(&state).delete(auth.user_id, id).await? {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "invalid_status",
            "Campaign can no longer be deleted",
        ));
    }

    info!(campaign_id = %id, "Deleted campaign");
    Ok(StatusCode::NO_CONTENT)
}

/// Send a campaign now.
///
/// Preconditions are checked synchronously; the fan-out runs in the
/// background after the 202.
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/send",
    tag = "campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    responses(
        (status = 202, description = "Send started", body = SendAccepted),
        (status = 409, description = "Campaign not in draft or scheduled", body = ErrorResponse),
        (status = 422, description = "No target group or no eligible recipients", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn send_campaign(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<CampaignId>,
) -> ApiResult<(StatusCode, Json<SendAccepted>)> {
    let campaign = load(&state, auth.user_id, id).await?;
    let prepared = state.dispatcher.prepare_campaign(campaign).await?;
    let total_recipients = prepared.recipient_count();

    let dispatcher = state.dispatcher.clone();
    tokio::spawn(async move {
        if let Err(e) = dispatcher.run(prepared).await {
            error!(campaign_id = %id, "Campaign send failed: {}", e);
        }
    });

    info!(campaign_id = %id, total_recipients, "Campaign send accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SendAccepted {
            status: "accepted".to_string(),
            total_recipients,
        }),
    ))
}

/// Send one rendered copy of a campaign to a single address
#[utoipa::path(
    post,
    path = "/api/v1/campaigns/{id}/test",
    tag = "campaigns",
    params(("id" = Uuid, Path, description = "Campaign ID")),
    request_body = TestSendRequest,
    responses(
        (status = 200, description = "Test email sent", body = TestSendResponse),
        (status = 502, description = "SMTP relay rejected the message", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn send_test(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<CampaignId>,
    Json(input): Json<TestSendRequest>,
) -> ApiResult<Json<TestSendResponse>> {
    if !is_email_like(&input.email) {
        return Err(ApiError::validation("A valid email is required"));
    }

    let sent = state
        .dispatcher
        .send_test(auth.user_id, id, input.email.trim(), input.name.as_deref())
        .await?;

    Ok(Json(TestSendResponse {
        email_id: sent.email_id,
        message_id: sent.message_id,
    }))
}
