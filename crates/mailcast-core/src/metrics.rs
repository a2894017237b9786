//! Prometheus metrics for the send pipeline

use prometheus::{Encoder, IntCounter, Registry, TextEncoder};

/// Pipeline counters, registered in their own registry
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub emails_sent: IntCounter,
    pub emails_failed: IntCounter,
    pub campaigns_completed: IntCounter,
    pub campaigns_failed: IntCounter,
    pub scheduler_ticks_skipped: IntCounter,
}

impl Metrics {
    /// Create and register all counters
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> prometheus::Result<IntCounter> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        Ok(Self {
            emails_sent: counter("mailcast_emails_sent_total", "Emails accepted by a transport")?,
            emails_failed: counter("mailcast_emails_failed_total", "Emails that failed to send")?,
            campaigns_completed: counter(
                "mailcast_campaigns_completed_total",
                "Campaign dispatches that completed",
            )?,
            campaigns_failed: counter(
                "mailcast_campaigns_failed_total",
                "Campaigns moved to failed",
            )?,
            scheduler_ticks_skipped: counter(
                "mailcast_scheduler_ticks_skipped_total",
                "Scheduler ticks skipped because a previous tick was still running",
            )?,
            registry,
        })
    }

    /// Render in the Prometheus text format
    pub fn render(&self) -> prometheus::Result<String> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
