//! Contact group handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use mailcast_common::types::{ContactId, GroupId, UserId};
use mailcast_storage::models::{Contact, Group, GroupInput, GroupMember};
use mailcast_storage::repository::{ContactRepository, GroupRepository};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use utoipa::ToSchema;

use crate::auth::{AppState, AuthContext};
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::handlers::Pagination;

/// Request body for adding a contact to a group
#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub contact_id: ContactId,
}

fn repo(state: &AppState) -> GroupRepository {
    GroupRepository::new(state.db_pool.pool().clone())
}

async fn load(state: &AppState, user_id: UserId, id: GroupId) -> ApiResult<Group> {
    repo(state)
        .get_for_user(user_id, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Group"))
}

fn validate(input: &GroupInput) -> ApiResult<()> {
    if input.name.trim().is_empty() {
        return Err(ApiError::validation("name is required"));
    }
    Ok(())
}

/// List groups
#[utoipa::path(
    get,
    path = "/api/v1/groups",
    tag = "groups",
    params(Pagination),
    responses((status = 200, description = "Groups", body = [Group])),
    security(("bearer" = []))
)]
pub async fn list_groups(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Group>>> {
    let groups = repo(&state)
        .list_for_user(auth.user_id, page.limit(), page.offset())
        .await?;
    Ok(Json(groups))
}

/// Create a group
#[utoipa::path(
    post,
    path = "/api/v1/groups",
    tag = "groups",
    request_body = GroupInput,
    responses(
        (status = 201, description = "Group created", body = Group),
        (status = 422, description = "Invalid input", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn create_group(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<GroupInput>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    validate(&input)?;
    let group = repo(&state).create(auth.user_id, input).await?;
    info!(group_id = %group.id, "Created group");
    Ok((StatusCode::CREATED, Json(group)))
}

/// Get a group
#[utoipa::path(
    get,
    path = "/api/v1/groups/{id}",
    tag = "groups",
    params(("id" = Uuid, Path, description = "Group ID")),
    responses(
        (status = 200, description = "Group", body = Group),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_group(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<GroupId>,
) -> ApiResult<Json<Group>> {
    Ok(Json(load(&state, auth.user_id, id).await?))
}

/// Rename or re-describe a group
#[utoipa::path(
    put,
    path = "/api/v1/groups/{id}",
    tag = "groups",
    params(("id" = Uuid, Path, description = "Group ID")),
    request_body = GroupInput,
    responses((status = 200, description = "Group updated", body = Group)),
    security(("bearer" = []))
)]
pub async fn update_group(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<GroupId>,
    Json(input): Json<GroupInput>,
) -> ApiResult<Json<Group>> {
    validate(&input)?;
    let group = repo(&state)
        .update(auth.user_id, id, input)
        .await?
        .ok_or_else(|| ApiError::not_found("Group"))?;
    Ok(Json(group))
}

/// Delete a group and its memberships
#[utoipa::path(
    delete,
    path = "/api/v1/groups/{id}",
    tag = "groups",
    params(("id" = Uuid, Path, description = "Group ID")),
    responses((status = 204, description = "Group deleted")),
    security(("bearer" = []))
)]
pub async fn delete_group(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<GroupId>,
) -> ApiResult<StatusCode> {
    if !repo(&state).delete(auth.user_id, id).await? {
        return Err(ApiError::not_found("Group"));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// List a group's members
#[utoipa::path(
    get,
    path = "/api/v1/groups/{id}/contacts",
    tag = "groups",
    params(("id" = Uuid, Path, description = "Group ID"), Pagination),
    responses((status = 200, description = "Members", body = [Contact])),
    security(("bearer" = []))
)]
pub async fn list_members(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<GroupId>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Vec<Contact>>> {
    load(&state, auth.user_id, id).await?;
    let contacts = repo(&state)
        .list_contacts(id, page.limit(), page.offset())
        .await?;
    Ok(Json(contacts))
}

/// Add a contact to a group; adding an existing member is a no-op
#[utoipa::path(
    post,
    path = "/api/v1/groups/{id}/contacts",
    tag = "groups",
    params(("id" = Uuid, Path, description = "Group ID")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Membership", body = GroupMember),
        (status = 422, description = "Unknown contact", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn add_member(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<GroupId>,
    Json(input): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<GroupMember>)> {
    load(&state, auth.user_id, id).await?;
    ContactRepository::new(state.db_pool.pool().clone())
        .get_for_user(auth.user_id, input.contact_id)
        .await?
        .ok_or_else(|| ApiError::validation("Unknown contact_id"))?;

    let member = repo(&state).add_contact(id, input.contact_id).await?;
    Ok((StatusCode::CREATED, Json(member)))
}

/// Remove a contact from a group
#[utoipa::path(
    delete,
    path = "/api/v1/groups/{id}/contacts/{contact_id}",
    tag = "groups",
    params(
        ("id" = Uuid, Path, description = "Group ID"),
        ("contact_id" = Uuid, Path, description = "Contact ID")
    ),
    responses((status = 204, description = "Membership removed")),
    security(("bearer" = []))
)]
pub async fn remove_member(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path((id, contact_id)): Path<(GroupId, ContactId)>,
) -> ApiResult<StatusCode> {
    load(&state, auth.user_id, id).await?;
    if !repo(&state).remove_contact(id, contact_id).await? {
        return Err(ApiError::not_found("Membership"));
    }
    Ok(StatusCode::NO_CONTENT)
}
