//! OpenAPI documentation
//!
//! The document is generated from the `#[utoipa::path]` annotations on the
//! handlers and served with a Swagger UI page.

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use utoipa::openapi::schema::{KnownFormat, ObjectBuilder, SchemaFormat, SchemaType};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::ErrorResponse;
use crate::handlers::{
    brands, campaigns, contacts, emails, groups, health, metrics, senders, templates, tracking,
    webhooks,
};
use mailcast_storage::models::{
    Brand, Campaign, CampaignStatus, Contact, CreateBrand, CreateCampaign, CreateContact,
    CreateSenderAddress, CreateTemplate, CreateWebhook, Email, EmailEvent, EmailEventType,
    EmailRecipient, EmailStatus, Group, GroupInput, GroupMember, SenderAddress, Template,
    UpdateBrand, UpdateCampaign, UpdateContact, UpdateTemplate, Webhook,
};

/// Id aliases that appear as field types in the models
const ID_SCHEMAS: &[&str] = &[
    "UserId",
    "CampaignId",
    "GroupId",
    "ContactId",
    "BrandId",
    "TemplateId",
    "SenderAddressId",
    "EmailId",
    "WebhookId",
];

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Mailcast API",
        description = "Campaign email API.\n\nEvery `/api/v1` endpoint requires `Authorization: Bearer <jwt>`."
    ),
    paths(
        health::health,
        health::liveness,
        health::readiness,
        health::health_detailed,
        metrics::metrics,
        campaigns::list_campaigns,
        campaigns::create_campaign,
        campaigns::get_campaign,
        campaigns::update_campaign,
        campaigns::delete_campaign,
        campaigns::send_campaign,
        campaigns::send_test,
        groups::list_groups,
        groups::create_group,
        groups::get_group,
        groups::update_group,
        groups::delete_group,
        groups::list_members,
        groups::add_member,
        groups::remove_member,
        contacts::list_contacts,
        contacts::create_contact,
        contacts::get_contact,
        contacts::update_contact,
        contacts::delete_contact,
        brands::list_brands,
        brands::create_brand,
        brands::get_brand,
        brands::update_brand,
        brands::set_default_brand,
        brands::delete_brand,
        templates::list_templates,
        templates::create_template,
        templates::get_template,
        templates::update_template,
        templates::delete_template,
        senders::list_senders,
        senders::create_sender,
        senders::get_sender,
        senders::update_sender_status,
        senders::set_default_sender,
        senders::delete_sender,
        webhooks::list_webhooks,
        webhooks::create_webhook,
        webhooks::delete_webhook,
        emails::list_emails,
        emails::get_email,
        emails::list_email_events,
        emails::report_email_event,
        tracking::track_open,
        tracking::track_click,
        tracking::unsubscribe,
        tracking::unsubscribe_one_click,
    ),
    components(schemas(
        ErrorResponse,
        health::HealthResponse,
        health::DetailedHealthResponse,
        health::ComponentHealth,
        Campaign,
        CampaignStatus,
        CreateCampaign,
        UpdateCampaign,
        campaigns::SendAccepted,
        campaigns::TestSendRequest,
        campaigns::TestSendResponse,
        Group,
        GroupInput,
        GroupMember,
        groups::AddMemberRequest,
        Contact,
        CreateContact,
        UpdateContact,
        Brand,
        CreateBrand,
        UpdateBrand,
        Template,
        CreateTemplate,
        UpdateTemplate,
        SenderAddress,
        CreateSenderAddress,
        senders::UpdateSenderStatus,
        Webhook,
        CreateWebhook,
        webhooks::CreatedWebhook,
        Email,
        EmailStatus,
        EmailRecipient,
        EmailEvent,
        EmailEventType,
        emails::ProviderEvent,
        tracking::UnsubscribeResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health and metrics"),
        (name = "campaigns", description = "Campaigns and sending"),
        (name = "groups", description = "Contact groups"),
        (name = "contacts", description = "Contacts"),
        (name = "brands", description = "Brands"),
        (name = "templates", description = "Templates"),
        (name = "senders", description = "Sender addresses"),
        (name = "webhooks", description = "Webhook endpoints"),
        (name = "emails", description = "Send records and their events"),
        (name = "tracking", description = "Open/click tracking and unsubscribe")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);

        components.add_security_scheme(
            "bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );

        for name in ID_SCHEMAS {
            components.schemas.insert(
                name.to_string(),
                ObjectBuilder::new()
                    .schema_type(SchemaType::String)
                    .format(Some(SchemaFormat::KnownFormat(KnownFormat::Uuid)))
                    .into(),
            );
        }
    }
}

/// Create OpenAPI routes
pub fn create_openapi_routes() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

/// Swagger UI HTML template
const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Mailcast API Documentation</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; padding: 0; }
        .swagger-ui .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({
                url: "/openapi.json",
                dom_id: '#swagger-ui',
                deepLinking: true,
                presets: [
                    SwaggerUIBundle.presets.apis,
                    SwaggerUIBundle.SwaggerUIStandalonePreset
                ],
                layout: "StandaloneLayout"
            });
        };
    </script>
</body>
</html>"#;
