//! Webhook Dispatcher - Delivers signed event notifications to user endpoints

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use hmac::{Hmac, Mac};
use mailcast_common::config::WebhookConfig;
use mailcast_common::types::{UserId, WebhookEvent};
use mailcast_storage::models::Webhook;
use mailcast_storage::repository::WebhookRepository;
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `sha256=<hex HMAC of the body>`
pub const SIGNATURE_HEADER: &str = "X-Mailcast-Signature";

/// Header carrying the event name
pub const EVENT_HEADER: &str = "X-Mailcast-Event";

/// Announces email events to a user's webhook endpoints.
///
/// Delivery failures are logged and never reported to the caller.
#[async_trait]
pub trait WebhookBroadcaster: Send + Sync {
    async fn broadcast(&self, user_id: UserId, event: WebhookEvent, data: serde_json::Value);
}

/// Body POSTed to an endpoint
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: WebhookEvent,
    pub timestamp: chrono::DateTime<Utc>,
    pub data: serde_json::Value,
}

/// HTTP webhook dispatcher
pub struct WebhookDispatcher {
    repo: WebhookRepository,
    http_client: Client,
    allow_private_targets: bool,
}

impl WebhookDispatcher {
    /// Create a new webhook dispatcher
    pub fn new(repo: WebhookRepository, config: &WebhookConfig) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            repo,
            http_client,
            allow_private_targets: config.allow_private_targets,
        })
    }

    /// Deliver one event to the given endpoints concurrently
    pub async fn deliver_to(
        &self,
        webhooks: &[Webhook],
        event: WebhookEvent,
        data: serde_json::Value,
    ) {
        let payload = WebhookPayload {
            event,
            timestamp: Utc::now(),
            data,
        };

        let body = match serde_json::to_vec(&payload) {
            Ok(body) => body,
            Err(e) => {
                error!(event = %event, "Failed to serialize webhook payload: {}", e);
                return;
            }
        };

        let deliveries = webhooks
            .iter()
            .filter(|webhook| webhook.is_active && webhook.subscribes_to(event))
            .map(|webhook| async {
                match self.deliver(webhook, event, &body).await {
                    Ok(()) => debug!(webhook_id = %webhook.id, event = %event, "Webhook delivered"),
                    Err(e) => warn!(
                        webhook_id = %webhook.id,
                        url = %webhook.url,
                        event = %event,
                        "Webhook delivery failed: {}",
                        e
                    ),
                }
            });

        join_all(deliveries).await;
    }

    async fn deliver(&self, webhook: &Webhook, event: WebhookEvent, body: &[u8]) -> Result<()> {
        let url = validate_webhook_url(&webhook.url, self.allow_private_targets)?;

        let response = self
            .http_client
            .post(url)
            .header("Content-Type", "application/json")
            .header(EVENT_HEADER, event.as_str())
            .header(
                SIGNATURE_HEADER,
                format!("sha256={}", sign_payload(&webhook.secret, body)?),
            )
            .body(body.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!(
                "Endpoint returned status {}",
                response.status()
            ));
        }

        Ok(())
    }
}

#[async_trait]
impl WebhookBroadcaster for WebhookDispatcher {
    async fn broadcast(&self, user_id: UserId, event: WebhookEvent, data: serde_json::Value) {
        let webhooks = match self.repo.list_active_for_event(user_id, event).await {
            Ok(webhooks) => webhooks,
            Err(e) => {
                error!(user_id = %user_id, event = %event, "Failed to load webhooks: {}", e);
                return;
            }
        };

        if webhooks.is_empty() {
            return;
        }

        info!(
            user_id = %user_id,
            event = %event,
            endpoints = webhooks.len(),
            "Broadcasting webhook event"
        );

        self.deliver_to(&webhooks, event, data).await;
    }
}

/// Hex HMAC-SHA256 of a payload
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| anyhow::anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Why a webhook target was refused
#[derive(Error, Debug, PartialEq, Eq)]
pub enum WebhookTargetError {
    #[error("Invalid webhook URL: {0}")]
    Invalid(#[from] url::ParseError),

    #[error("Webhook URL scheme '{0}' is not allowed")]
    Scheme(String),

    #[error("Webhook URL has no host")]
    NoHost,

    #[error("Webhook target '{0}' is an internal address")]
    Internal(String),
}

/// Parse a webhook URL, refusing targets inside the deployment's network.
///
/// With `allow_private` only the scheme and host are checked.
pub fn validate_webhook_url(raw: &str, allow_private: bool) -> Result<Url, WebhookTargetError> {
    let url = Url::parse(raw)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(WebhookTargetError::Scheme(url.scheme().to_string()));
    }

    let host = url.host().ok_or(WebhookTargetError::NoHost)?;
    let internal = match &host {
        Host::Domain(name) => is_internal_name(name),
        Host::Ipv4(ip) => is_internal_v4(*ip),
        // ::ffff:a.b.c.d reaches the IPv4 host
        Host::Ipv6(ip) => match ip.to_ipv4_mapped() {
            Some(v4) => is_internal_v4(v4),
            None => is_internal_v6(ip),
        },
    };

    if internal && !allow_private {
        return Err(WebhookTargetError::Internal(host.to_string()));
    }

    Ok(url)
}

fn is_internal_name(name: &str) -> bool {
    let name = name.trim_end_matches('.').to_ascii_lowercase();
    name == "localhost"
        || [".localhost", ".local", ".internal"]
            .iter()
            .any(|suffix| name.ends_with(suffix))
}

fn is_internal_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_unspecified()
        || (a == 100 && (64..128).contains(&b))
}

fn is_internal_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
}
