//! Mailcast Core - campaign send pipeline
//!
//! Resolves a campaign's audience, renders per-recipient content, sends it
//! through the selected SMTP transport with open/click tracking, and keeps
//! campaign statistics. A scheduler dispatches campaigns whose time has come.

pub mod dispatcher;
pub mod interpolate;
pub mod metrics;
pub mod recipients;
pub mod scheduler;
pub mod send;
pub mod store;
pub mod tracking;
pub mod transport;
pub mod webhooks;

#[cfg(test)]
mod testing;

pub use dispatcher::{
    CampaignDispatcher, DispatchError, DispatchOutcome, PreparedCampaign, TestSend,
};
pub use interpolate::{interpolate, interpolate_scopes, MessageContent, Variables};
pub use metrics::Metrics;
pub use recipients::{resolve_recipients, RecipientSource};
pub use scheduler::{CampaignScheduler, TickOutcome};
pub use send::{SendError, SendRequest, SendUnit};
pub use store::{CampaignStore, EmailStore, PgCampaignStore, PgTrackingStore, TrackingStore};
pub use tracking::{TrackingError, TrackingRecorder, TrackingSigner};
pub use transport::{
    FromAddress, MailTransport, SelectedTransport, SmtpTransportFactory, TransportError, TransportFactory,
    TransportSelector,
};
pub use webhooks::{WebhookBroadcaster, WebhookDispatcher, WebhookTargetError};
