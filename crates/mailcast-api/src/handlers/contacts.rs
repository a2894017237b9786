//! Contact handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use mailcast_common::types::{ContactId, Paginated};
use mailcast_storage::models::{Contact, CreateContact, UpdateContact};
use mailcast_storage::repository::ContactRepository;
use std::sync::Arc;
use tracing::info;

use crate::auth::{AppState, AuthContext};
use crate::error::{ApiError, ApiResult, ErrorResponse};
use crate::handlers::{is_email_like, Pagination};

fn repo(state: &AppState) -> ContactRepository {
    ContactRepository::new(state.db_pool.pool().clone())
}

/// List contacts
#[utoipa::path(
    get,
    path = "/api/v1/contacts",
    tag = "contacts",
    params(Pagination),
    responses((status = 200, description = "Paginated contacts")),
    security(("bearer" = []))
)]
pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Query(page): Query<Pagination>,
) -> ApiResult<Json<Paginated<Contact>>> {
    let repo = repo(&state);
    let data = repo
        .list_for_user(auth.user_id, page.limit(), page.offset())
        .await?;
    let total = repo.count_for_user(auth.user_id).await?;

    Ok(Json(Paginated {
        data,
        total,
        limit: page.limit(),
        offset: page.offset(),
    }))
}

/// Create a contact
#[utoipa::path(
    post,
    path = "/api/v1/contacts",
    tag = "contacts",
    request_body = CreateContact,
    responses(
        (status = 201, description = "Contact created", body = Contact),
        (status = 409, description = "Email already present", body = ErrorResponse),
        (status = 422, description = "Invalid email", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Json(mut input): Json<CreateContact>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    if !is_email_like(&input.email) {
        return Err(ApiError::validation("A valid email is required"));
    }
    input.email = input.email.trim().to_lowercase();

    let contact = repo(&state).create(auth.user_id, input).await?;
    info!(contact_id = %contact.id, "Created contact");
    Ok((StatusCode::CREATED, Json(contact)))
}

/// Get a contact
#[utoipa::path(
    get,
    path = "/api/v1/contacts/{id}",
    tag = "contacts",
    params(("id" = Uuid, Path, description = "Contact ID")),
    responses(
        (status = 200, description = "Contact", body = Contact),
        (status = 404, description = "Not found", body = ErrorResponse)
    ),
    security(("bearer" = []))
)]
pub async fn get_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<ContactId>,
) -> ApiResult<Json<Contact>> {
    repo(&state)
        .get_for_user(auth.user_id, id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Contact"))
}

/// Update a contact
#[utoipa::path(
    put,
    path = "/api/v1/contacts/{id}",
    tag = "contacts",
    params(("id" = Uuid, Path, description = "Contact ID")),
    request_body = UpdateContact,
    responses((status = 200, description = "Contact updated", body = Contact)),
    security(("bearer" = []))
)]
pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<ContactId>,
    Json(mut input): Json<UpdateContact>,
) -> ApiResult<Json<Contact>> {
    if let Some(email) = input.email.as_deref() {
        if !is_email_like(email) {
            return Err(ApiError::validation("A valid email is required"));
        }
        input.email = Some(email.trim().to_lowercase());
    }

    repo(&state)
        .update(auth.user_id, id, input)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Contact"))
}

/// Delete a contact
#[utoipa::path(
    delete,
    path = "/api/v1/contacts/{id}",
    tag = "contacts",
    params(("id" = Uuid, Path, description = "Contact ID")),
    responses((status = 204, description = "Contact deleted")),
    security(("bearer" = []))
)]
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthContext>,
    Path(id): Path<ContactId>,
) -> ApiResult<StatusCode> {
    if !repo(&state).delete(auth.user_id, id).await? {
        return Err(ApiError::not_found("Contact"));
    }
    Ok(StatusCode::NO_CONTENT)
}
