//! Campaign Scheduler - Periodically dispatches due campaigns

use chrono::{TimeDelta, Utc};
use mailcast_common::config::SchedulerConfig;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dispatcher::{CampaignDispatcher, DispatchError};
use crate::metrics::Metrics;
use crate::store::CampaignStore;

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A previous tick was still running
    Skipped,
    /// Due campaigns handled in this tick
    Ran { processed: usize },
}

/// Campaign scheduler
pub struct CampaignScheduler {
    campaigns: Arc<dyn CampaignStore>,
    dispatcher: Arc<CampaignDispatcher>,
    metrics: Metrics,
    config: SchedulerConfig,
    running: AtomicBool,
}

/// Clears the running flag when a tick ends, panics included
struct TickGuard<'a>(&'a AtomicBool);

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl CampaignScheduler {
    /// Create a new scheduler
    pub fn new(
        campaigns: Arc<dyn CampaignStore>,
        dispatcher: Arc<CampaignDispatcher>,
        metrics: Metrics,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            campaigns,
            dispatcher,
            metrics,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Run until cancelled.
    ///
    /// Ticks are spawned so a slow tick never delays the next interval; an
    /// overlapping tick is skipped instead.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let period = Duration::from_secs(self.config.interval_secs.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!(
            interval_secs = period.as_secs(),
            batch_size = self.config.batch_size,
            "Campaign scheduler started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Campaign scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.tick().await;
                    });
                }
            }
        }
    }

    /// Process one batch of due campaigns, unless a tick is already running
    pub async fn tick(&self) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Previous scheduler tick still running, skipping");
            self.metrics.scheduler_ticks_skipped.inc();
            return TickOutcome::Skipped;
        }
        let _guard = TickGuard(&self.running);

        self.sweep_stuck().await;

        let due = match self.campaigns.due_campaigns(self.config.batch_size).await {
            Ok(due) => due,
            Err(e) => {
                error!("Failed to load due campaigns: {}", e);
                return TickOutcome::Ran { processed: 0 };
            }
        };

        if !due.is_empty() {
            info!(count = due.len(), "Dispatching due campaigns");
        }

        let mut processed = 0;
        for campaign in due {
            let campaign_id = campaign.id;
            match self.dispatcher.dispatch_scheduled(campaign).await {
                Ok(outcome) => {
                    processed += 1;
                    debug!(
                        campaign_id = %campaign_id,
                        successful = outcome.successful,
                        failed = outcome.failed,
                        "Scheduled campaign dispatched"
                    );
                }
                Err(DispatchError::InvalidStatus(status)) => {
                    debug!(
                        campaign_id = %campaign_id,
                        status = %status,
                        "Campaign already picked up elsewhere"
                    );
                }
                Err(e) => {
                    processed += 1;
                    warn!(campaign_id = %campaign_id, "Scheduled campaign failed: {}", e);
                }
            }
        }

        TickOutcome::Ran { processed }
    }

    /// Report campaigns left in `sending` by an interrupted process.
    ///
    /// A threshold too large to subtract from now disables the sweep.
    async fn sweep_stuck(&self) {
        let Some(before) = i64::try_from(self.config.stuck_after_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .and_then(|threshold| Utc::now().checked_sub_signed(threshold))
        else {
            return;
        };

        let stuck = match self.campaigns.stuck_campaigns(before).await {
            Ok(stuck) => stuck,
            Err(e) => {
                error!("Failed to look up stuck campaigns: {}", e);
                return;
            }
        };

        for campaign in stuck {
            warn!(
                campaign_id = %campaign.id,
                since = %campaign.updated_at,
                "Campaign stuck in sending"
            );
            if !self.config.fail_stuck {
                continue;
            }
            // Re-checked in the update: a live run may have refreshed it since
            match self.campaigns.fail_stuck(campaign.id, before).await {
                Ok(true) => self.metrics.campaigns_failed.inc(),
                Ok(false) => debug!(campaign_id = %campaign.id, "Campaign made progress, not failing"),
                Err(e) => error!(campaign_id = %campaign.id, "Failed to fail stuck campaign: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::CampaignDispatcher;
    use crate::send::SendUnit;
    use crate::testing::{
        campaign, contact, FakeCampaignStore, FakeEmailStore, FakeRecipients, FakeSenders,
        FakeTransportFactory, RecordingBroadcaster,
    };
    use crate::transport::TransportSelector;
    use mailcast_common::config::SmtpConfig;
    use mailcast_storage::models::{Campaign, CampaignStatus};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn scheduler(
        store: Arc<FakeCampaignStore>,
        recipients: FakeRecipients,
        factory: Arc<FakeTransportFactory>,
        config: SchedulerConfig,
    ) -> (Arc<CampaignScheduler>, Metrics) {
        let metrics = Metrics::new().unwrap();
        let selector = Arc::new(TransportSelector::new(
            Arc::new(FakeSenders::new(vec![])),
            factory,
            SmtpConfig {
                host: Some("relay.test".to_string()),
                ..SmtpConfig::default()
            },
        ));
        let dispatcher = Arc::new(CampaignDispatcher::new(
            store.clone(),
            Arc::new(FakeEmailStore::default()),
            Arc::new(recipients),
            selector,
            Arc::new(SendUnit::new(
                None,
                "https://api.test",
                Arc::new(RecordingBroadcaster::default()),
            )),
            metrics.clone(),
            "https://app.test",
        ));
        (
            Arc::new(CampaignScheduler::new(store, dispatcher, metrics.clone(), config)),
            metrics,
        )
    }

    fn due(user: Uuid, group: Uuid, minutes_ago: i64) -> Campaign {
        let mut c = campaign(user, Some(group), CampaignStatus::Scheduled);
        c.scheduled_at = Some(Utc::now() - chrono::Duration::minutes(minutes_ago));
        c
    }

    #[tokio::test]
    async fn test_tick_dispatches_due_campaigns_only() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let past = due(user, group, 5);
        let mut future = campaign(user, Some(group), CampaignStatus::Scheduled);
        future.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));
        let draft = campaign(user, Some(group), CampaignStatus::Draft);

        let store = Arc::new(
            FakeCampaignStore::default()
                .with_campaign(past.clone())
                .with_campaign(future.clone())
                .with_campaign(draft.clone()),
        );
        let (scheduler, _) = scheduler(
            store.clone(),
            FakeRecipients::default().with_group(group, vec![contact("ann@example.com", "Ann")]),
            Arc::new(FakeTransportFactory::default()),
            SchedulerConfig::default(),
        );

        assert_eq!(scheduler.tick().await, TickOutcome::Ran { processed: 1 });
        assert_eq!(store.get(past.id).status, "completed");
        assert_eq!(store.get(future.id).status, "scheduled");
        assert_eq!(store.get(draft.id).status, "draft");
    }

    #[tokio::test]
    async fn test_batch_size_limits_tick() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let oldest = due(user, group, 30);
        let middle = due(user, group, 20);
        let newest = due(user, group, 10);

        let store = Arc::new(
            FakeCampaignStore::default()
                .with_campaign(newest.clone())
                .with_campaign(oldest.clone())
                .with_campaign(middle.clone()),
        );
        let (scheduler, _) = scheduler(
            store.clone(),
            FakeRecipients::default().with_group(group, vec![contact("ann@example.com", "Ann")]),
            Arc::new(FakeTransportFactory::default()),
            SchedulerConfig {
                batch_size: 2,
                ..SchedulerConfig::default()
            },
        );

        assert_eq!(scheduler.tick().await, TickOutcome::Ran { processed: 2 });
        assert_eq!(store.get(oldest.id).status, "completed");
        assert_eq!(store.get(middle.id).status, "completed");
        assert_eq!(store.get(newest.id).status, "scheduled");

        assert_eq!(scheduler.tick().await, TickOutcome::Ran { processed: 1 });
        assert_eq!(store.get(newest.id).status, "completed");
    }

    #[tokio::test]
    async fn test_failing_campaign_does_not_block_the_rest() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let empty_group = Uuid::now_v7();
        let broken = due(user, empty_group, 10);
        let ok = due(user, group, 5);

        let store = Arc::new(
            FakeCampaignStore::default()
                .with_campaign(broken.clone())
                .with_campaign(ok.clone()),
        );
        let (scheduler, metrics) = scheduler(
            store.clone(),
            FakeRecipients::default().with_group(group, vec![contact("ann@example.com", "Ann")]),
            Arc::new(FakeTransportFactory::default()),
            SchedulerConfig::default(),
        );

        assert_eq!(scheduler.tick().await, TickOutcome::Ran { processed: 2 });
        assert_eq!(store.get(broken.id).status, "failed");
        assert_eq!(store.get(ok.id).status, "completed");
        assert_eq!(metrics.campaigns_failed.get(), 1);
    }

    #[tokio::test]
    async fn test_overlapping_tick_is_skipped() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let c = due(user, group, 1);
        let store = Arc::new(FakeCampaignStore::default().with_campaign(c.clone()));
        let (factory, gate) = FakeTransportFactory::gated();
        let factory = Arc::new(factory);
        let (scheduler, metrics) = scheduler(
            store.clone(),
            FakeRecipients::default().with_group(group, vec![contact("ann@example.com", "Ann")]),
            factory.clone(),
            SchedulerConfig::default(),
        );

        let first = tokio::spawn({
            let scheduler = scheduler.clone();
            async move { scheduler.tick().await }
        });
        factory.send_started().await;

        assert_eq!(scheduler.tick().await, TickOutcome::Skipped);
        assert_eq!(metrics.scheduler_ticks_skipped.get(), 1);
        assert_eq!(store.get(c.id).status, "sending");

        gate.add_permits(1);
        assert_eq!(first.await.unwrap(), TickOutcome::Ran { processed: 1 });
        assert_eq!(store.get(c.id).status, "completed");

        // the flag is released once the tick ends
        assert_eq!(scheduler.tick().await, TickOutcome::Ran { processed: 0 });
    }

    #[tokio::test]
    async fn test_stuck_campaigns_reported_and_optionally_failed() {
        let user = Uuid::now_v7();
        let mut stuck = campaign(user, None, CampaignStatus::Sending);
        stuck.updated_at = Utc::now() - chrono::Duration::hours(3);
        let mut recent = campaign(user, None, CampaignStatus::Sending);
        recent.updated_at = Utc::now();

        let store = Arc::new(
            FakeCampaignStore::default()
                .with_campaign(stuck.clone())
                .with_campaign(recent.clone()),
        );
        let (report_only, _) = scheduler(
            store.clone(),
            FakeRecipients::default(),
            Arc::new(FakeTransportFactory::default()),
            SchedulerConfig::default(),
        );
        report_only.tick().await;
        assert_eq!(store.get(stuck.id).status, "sending");

        let (failing, _) = scheduler(
            store.clone(),
            FakeRecipients::default(),
            Arc::new(FakeTransportFactory::default()),
            SchedulerConfig {
                fail_stuck: true,
                ..SchedulerConfig::default()
            },
        );
        failing.tick().await;
        assert_eq!(store.get(stuck.id).status, "failed");
        assert_eq!(store.get(recent.id).status, "sending");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_cancel() {
        let store = Arc::new(FakeCampaignStore::default());
        let (scheduler, _) = scheduler(
            store,
            FakeRecipients::default(),
            Arc::new(FakeTransportFactory::default()),
            SchedulerConfig::default(),
        );
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(scheduler.run(shutdown.clone()));

        tokio::time::sleep(Duration::from_secs(130)).await;
        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_unbounded_stuck_threshold_disables_sweep() {
        let user = Uuid::now_v7();
        let group = Uuid::now_v7();
        let c = due(user, group, 5);
        let mut stuck = campaign(user, None, CampaignStatus::Sending);
        stuck.updated_at = Utc::now() - chrono::Duration::days(30);

        let store = Arc::new(
            FakeCampaignStore::default()
                .with_campaign(c.clone())
                .with_campaign(stuck.clone()),
        );
        let (scheduler, _) = scheduler(
            store.clone(),
            FakeRecipients::default().with_group(group, vec![contact("ann@example.com", "Ann")]),
            Arc::new(FakeTransportFactory::default()),
            SchedulerConfig {
                stuck_after_secs: u64::MAX,
                fail_stuck: true,
                ..SchedulerConfig::default()
            },
        );

        assert_eq!(scheduler.tick().await, TickOutcome::Ran { processed: 1 });
        assert_eq!(store.get(c.id).status, "completed");
        assert_eq!(store.get(stuck.id).status, "sending");
    }
}
