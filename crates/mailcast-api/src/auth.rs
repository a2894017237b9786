//! Authentication module
//!
//! Requests carry an HS256 JWT issued by the account service. The token's
//! `sub` claim is the user id every query is scoped to.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use mailcast_common::types::UserId;
use mailcast_common::Config;
use mailcast_core::{
    CampaignDispatcher, Metrics, PgCampaignStore, PgTrackingStore, SendUnit, SmtpTransportFactory,
    TrackingRecorder, TrackingSigner, TransportSelector, WebhookBroadcaster, WebhookDispatcher,
};
use mailcast_storage::repository::{
    EmailRepository, GroupRepository, SenderAddressRepository, WebhookRepository,
};
use mailcast_storage::DatabasePool;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db_pool: DatabasePool,
    pub dispatcher: Arc<CampaignDispatcher>,
    pub tracking: Arc<TrackingRecorder>,
    pub metrics: Metrics,
    pub jwt_secret: String,
    pub allow_private_webhooks: bool,
}

impl AppState {
    /// Wire the send pipeline against the database
    pub fn new(config: &Config, db_pool: DatabasePool) -> anyhow::Result<Self> {
        let pool = db_pool.pool().clone();
        let metrics = Metrics::new()?;

        let webhooks: Arc<dyn WebhookBroadcaster> = Arc::new(WebhookDispatcher::new(
            WebhookRepository::new(pool.clone()),
            &config.webhooks,
        )?);

        let signer = TrackingSigner::new(&config.tracking.secret);
        let send_unit = Arc::new(SendUnit::new(
            config.tracking.enabled.then(|| signer.clone()),
            &config.server.api_base_url,
            webhooks.clone(),
        ));

        let transports = Arc::new(TransportSelector::new(
            Arc::new(SenderAddressRepository::new(pool.clone())),
            Arc::new(SmtpTransportFactory),
            config.smtp.clone(),
        ));

        let dispatcher = CampaignDispatcher::new(
            Arc::new(PgCampaignStore::new(&db_pool)),
            Arc::new(EmailRepository::new(pool.clone())),
            Arc::new(GroupRepository::new(pool)),
            transports,
            send_unit,
            metrics.clone(),
            &config.server.client_base_url,
        )
        .with_concurrency(config.scheduler.send_concurrency);

        let tracking = TrackingRecorder::new(
            signer,
            Arc::new(PgTrackingStore::new(&db_pool)),
            webhooks,
        );

        Ok(Self {
            db_pool,
            dispatcher: Arc::new(dispatcher),
            tracking: Arc::new(tracking),
            metrics,
            jwt_secret: config.auth.jwt_secret.clone(),
            allow_private_webhooks: config.webhooks.allow_private_targets,
        })
    }
}

/// Authenticated caller
#[derive(Debug, Clone, Copy)]
pub struct AuthContext {
    pub user_id: UserId,
}

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: UserId,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Verify an HS256 JWT and return its claims
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, JwtError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map(|data| data.claims)
}

/// Client-facing reason a token was refused
fn rejection_reason(error: &JwtError) -> &'static str {
    match error.kind() {
        ErrorKind::ExpiredSignature => "Token expired",
        ErrorKind::InvalidSignature => "Invalid signature",
        ErrorKind::InvalidAlgorithm => "Unsupported algorithm",
        _ => "Invalid token",
    }
}

/// Encode claims as an HS256 JWT
#[cfg(test)]
pub(crate) fn sign_token(claims: &Claims, secret: &str) -> Result<String, JwtError> {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Extract the bearer token from the Authorization header
pub fn extract_bearer(req: &Request) -> Option<&str> {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer(&request).ok_or_else(|| {
        warn!("Missing bearer token in request to {}", request.uri().path());
        ApiError::unauthorized("Missing bearer token")
    })?;

    let claims = verify_token(token, &state.jwt_secret).map_err(|e| {
        warn!("Rejected token: {}", e);
        ApiError::unauthorized(rejection_reason(&e))
    })?;

    debug!(user_id = %claims.sub, "Request authenticated");

    request.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
    });

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn claims(exp_offset: i64) -> Claims {
        Claims {
            sub: Uuid::now_v7(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: None,
        }
    }

    #[test]
    fn test_token_round_trip() {
        let claims = claims(3600);
        let token = sign_token(&claims, "secret").unwrap();

        let verified = verify_token(&token, "secret").unwrap();
        assert_eq!(verified.sub, claims.sub);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = sign_token(&claims(3600), "secret").unwrap();
        let err = verify_token(&token, "other").unwrap_err();
        assert_eq!(rejection_reason(&err), "Invalid signature");
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = sign_token(&claims(-10), "secret").unwrap();
        let err = verify_token(&token, "secret").unwrap_err();
        assert_eq!(rejection_reason(&err), "Token expired");
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(verify_token("abc", "secret").is_err());
        assert!(verify_token("a.b.c.d", "secret").is_err());
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::new(Algorithm::HS512),
            &claims(3600),
            &jsonwebtoken::EncodingKey::from_secret(b"secret"),
        )
        .unwrap();

        let err = verify_token(&token, "secret").unwrap_err();
        assert_eq!(rejection_reason(&err), "Unsupported algorithm");
    }
}
