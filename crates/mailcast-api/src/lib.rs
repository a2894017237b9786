//! Mailcast API - REST API server
//!
//! JWT-authenticated CRUD for campaigns, groups, contacts, brands,
//! templates, sender addresses and webhooks; send-now and test sends; and the
//! public tracking, unsubscribe, health and metrics endpoints.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod openapi;
pub mod routes;

pub use auth::AppState;
pub use openapi::{create_openapi_routes, ApiDoc};
pub use routes::create_router;
