//! Transport Selector - Resolves SMTP credentials and builds mail transports

use async_trait::async_trait;
use lettre::message::header::{ContentType, HeaderName, HeaderValue};
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use mailcast_common::config::SmtpConfig;
use mailcast_common::types::{SenderAddressId, UserId};
use mailcast_storage::models::{EmailRecipient, SenderAddress};
use mailcast_storage::repository::SenderAddressRepository;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::send::SendError;

/// Transport errors
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Message(String),

    #[error("Failed to create SMTP transport: {0}")]
    Setup(String),

    #[error("SMTP delivery failed: {0}")]
    Smtp(String),
}

/// Sending identity: the address and an optional display name, kept apart
/// so a name with commas or quotes never needs re-parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FromAddress {
    pub email: String,
    pub name: Option<String>,
}

impl FromAddress {
    pub fn new(email: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            email: email.into(),
            name: name
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(String::from),
        }
    }

    /// Domain part of the address, if it has one
    pub fn domain(&self) -> Option<&str> {
        self.email
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim())
            .filter(|domain| !domain.is_empty())
    }

    fn mailbox(&self) -> Result<Mailbox, TransportError> {
        let address = self
            .email
            .parse()
            .map_err(|e| TransportError::Address(format!("from {}: {}", self.email, e)))?;
        Ok(Mailbox::new(self.name.clone(), address))
    }
}

impl std::fmt::Display for FromAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&format_from_address(&self.email, self.name.as_deref()))
    }
}

/// A fully rendered message ready for the transport
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    pub from: FromAddress,
    pub to: EmailRecipient,
    pub subject: String,
    pub html: Option<String>,
    pub text: Option<String>,
    /// Value of the `Message-ID` header, angle brackets included
    pub message_id: String,
    pub headers: Vec<(String, String)>,
}

/// Accepted hand-off
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    pub message_id: String,
}

/// Something that can deliver a message
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt, TransportError>;
}

/// SMTP credentials of one sending identity
#[derive(Debug, Clone)]
pub struct SmtpCredentials {
    pub host: String,
    pub port: u16,
    pub tls: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub timeout: Duration,
}

impl SmtpCredentials {
    /// Credentials stored on a sender address
    pub fn from_sender(sender: &SenderAddress, timeout: Duration) -> Self {
        Self {
            host: sender.smtp_host.clone(),
            port: u16::try_from(sender.smtp_port).unwrap_or(587),
            tls: sender.smtp_tls,
            username: sender.smtp_username.clone(),
            password: sender.smtp_password.clone(),
            timeout,
        }
    }

    /// Process-wide fallback credentials, if a relay host is configured
    pub fn from_config(config: &SmtpConfig) -> Option<Self> {
        let host = config.host.clone().filter(|h| !h.trim().is_empty())?;
        Some(Self {
            host,
            port: config.port,
            tls: config.tls,
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

/// Builds transports from credentials
pub trait TransportFactory: Send + Sync {
    fn build(&self, credentials: &SmtpCredentials) -> Result<Arc<dyn MailTransport>, TransportError>;
}

/// lettre SMTP transport
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailTransport {
    /// Configure a transport; no connection is made until the first send
    pub fn new(credentials: &SmtpCredentials) -> Result<Self, TransportError> {
        let mut builder = if credentials.tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&credentials.host)
                .map_err(|e| TransportError::Setup(e.to_string()))?
        } else if credentials.port == 587 {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&credentials.host)
                .map_err(|e| TransportError::Setup(e.to_string()))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&credentials.host)
        };

        builder = builder
            .port(credentials.port)
            .timeout(Some(credentials.timeout));

        if let (Some(username), Some(password)) = (&credentials.username, &credentials.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            mailer: builder.build(),
        })
    }
}

/// Build the MIME message for an outgoing email
pub fn build_message(message: &OutgoingMessage) -> Result<Message, TransportError> {
    let from = message.from.mailbox()?;

    let to_address = message
        .to
        .email
        .parse()
        .map_err(|e| TransportError::Address(format!("to {}: {}", message.to.email, e)))?;
    let to = Mailbox::new(
        message.to.name.clone().filter(|n| !n.is_empty()),
        to_address,
    );

    let mut builder = Message::builder()
        .from(from)
        .to(to)
        .subject(&message.subject)
        .message_id(Some(message.message_id.clone()));

    for (name, value) in &message.headers {
        let name = HeaderName::new_from_ascii(name.clone())
            .map_err(|e| TransportError::Message(format!("header {}: {}", name, e)))?;
        builder = builder.raw_header(HeaderValue::new(name, value.clone()));
    }

    let built = match (&message.html, &message.text) {
        (Some(html), Some(text)) => builder.multipart(
            MultiPart::alternative()
                .singlepart(SinglePart::plain(text.clone()))
                .singlepart(SinglePart::html(html.clone())),
        ),
        (Some(html), None) => builder.header(ContentType::TEXT_HTML).body(html.clone()),
        (None, Some(text)) => builder.header(ContentType::TEXT_PLAIN).body(text.clone()),
        (None, None) => builder.header(ContentType::TEXT_PLAIN).body(String::new()),
    };

    built.map_err(|e| TransportError::Message(e.to_string()))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, message: &OutgoingMessage) -> Result<SendReceipt, TransportError> {
        let email = build_message(message)?;

        let response = self
            .mailer
            .send(email)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        debug!(code = %response.code(), "SMTP relay accepted message");

        Ok(SendReceipt {
            message_id: message.message_id.clone(),
        })
    }
}

/// Builds [`SmtpMailTransport`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct SmtpTransportFactory;

impl TransportFactory for SmtpTransportFactory {
    fn build(&self, credentials: &SmtpCredentials) -> Result<Arc<dyn MailTransport>, TransportError> {
        Ok(Arc::new(SmtpMailTransport::new(credentials)?))
    }
}

/// Sender address lookups needed by the selector
#[async_trait]
pub trait SenderLookup: Send + Sync {
    async fn sender(&self, id: SenderAddressId) -> Result<Option<SenderAddress>, sqlx::Error>;
    async fn default_sender(&self, user_id: UserId) -> Result<Option<SenderAddress>, sqlx::Error>;
}

#[async_trait]
impl SenderLookup for SenderAddressRepository {
    async fn sender(&self, id: SenderAddressId) -> Result<Option<SenderAddress>, sqlx::Error> {
        self.get(id).await
    }

    async fn default_sender(&self, user_id: UserId) -> Result<Option<SenderAddress>, sqlx::Error> {
        self.get_default_active(user_id).await
    }
}

/// Transport chosen for a send, with its From identity
#[derive(Clone)]
pub struct SelectedTransport {
    pub transport: Arc<dyn MailTransport>,
    pub from: FromAddress,
}

impl std::fmt::Debug for SelectedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedTransport")
            .field("from", &self.from)
            .finish_non_exhaustive()
    }
}

/// `"Display Name <email>"`, or the bare email without a name. For logs and
/// display only; messages take their From from [`FromAddress`].
pub fn format_from_address(email: &str, name: Option<&str>) -> String {
    match name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{} <{}>", name, email),
        None => email.to_string(),
    }
}

/// Chooses the transport for a user's send
pub struct TransportSelector {
    senders: Arc<dyn SenderLookup>,
    factory: Arc<dyn TransportFactory>,
    fallback: SmtpConfig,
}

impl TransportSelector {
    /// Create a new transport selector
    pub fn new(
        senders: Arc<dyn SenderLookup>,
        factory: Arc<dyn TransportFactory>,
        fallback: SmtpConfig,
    ) -> Self {
        Self {
            senders,
            factory,
            fallback,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.fallback.timeout_secs)
    }

    /// Resolve explicit sender, then the user's default active sender, then
    /// the configured fallback relay
    pub async fn select(
        &self,
        user_id: UserId,
        explicit_sender: Option<SenderAddressId>,
    ) -> Result<SelectedTransport, SendError> {
        let sender = match explicit_sender {
            Some(id) => {
                let sender = self
                    .senders
                    .sender(id)
                    .await?
                    .filter(|s| s.user_id == user_id)
                    .ok_or(SendError::SenderNotFound(id))?;
                if !sender.is_active {
                    return Err(SendError::SenderInactive(id));
                }
                Some(sender)
            }
            None => self.senders.default_sender(user_id).await?,
        };

        if let Some(sender) = sender {
            debug!(user_id = %user_id, sender_id = %sender.id, "Using sender address");
            let credentials = SmtpCredentials::from_sender(&sender, self.timeout());
            return Ok(SelectedTransport {
                transport: self.factory.build(&credentials)?,
                from: FromAddress::new(&sender.email, sender.name.as_deref()),
            });
        }

        let credentials =
            SmtpCredentials::from_config(&self.fallback).ok_or(SendError::NoTransportConfigured)?;

        debug!(user_id = %user_id, host = %credentials.host, "Using fallback relay");

        Ok(SelectedTransport {
            transport: self.factory.build(&credentials)?,
            from: FromAddress::new(&self.fallback.from_address, self.fallback.from_name.as_deref()),
        })
    }
}
