//! Recipient Resolver - Eligible contacts of a campaign's target group

use async_trait::async_trait;
use mailcast_common::types::GroupId;
use mailcast_storage::models::Recipient;
use mailcast_storage::repository::GroupRepository;

use crate::dispatcher::DispatchError;

/// Source of a group's eligible recipients
#[async_trait]
pub trait RecipientSource: Send + Sync {
    /// Members with `is_active` and no `unsubscribed_at`, in no particular order
    async fn eligible_recipients(&self, group_id: GroupId) -> Result<Vec<Recipient>, sqlx::Error>;
}

#[async_trait]
impl RecipientSource for GroupRepository {
    async fn eligible_recipients(&self, group_id: GroupId) -> Result<Vec<Recipient>, sqlx::Error> {
        GroupRepository::eligible_recipients(self, group_id).await
    }
}

/// Resolve a campaign's audience
pub async fn resolve_recipients(
    source: &dyn RecipientSource,
    group_id: Option<GroupId>,
) -> Result<Vec<Recipient>, DispatchError> {
    let group_id = group_id.ok_or(DispatchError::NoTargetGroup)?;
    let recipients = source.eligible_recipients(group_id).await?;

    if recipients.is_empty() {
        return Err(DispatchError::EmptyAudience);
    }

    Ok(recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{contact, FakeRecipients};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_no_group() {
        let source = FakeRecipients::default();
        assert!(matches!(
            resolve_recipients(&source, None).await,
            Err(DispatchError::NoTargetGroup)
        ));
    }

    #[tokio::test]
    async fn test_unsubscribed_and_inactive_never_returned() {
        let group = Uuid::now_v7();
        let mut unsubscribed = contact("gone@example.com", "Gone");
        unsubscribed.unsubscribed_at = Some(chrono::Utc::now());
        let mut inactive = contact("off@example.com", "Off");
        inactive.is_active = false;

        let source = FakeRecipients::default().with_group(
            group,
            vec![contact("a@example.com", "A"), unsubscribed, inactive],
        );

        let recipients = resolve_recipients(&source, Some(group)).await.unwrap();
        let emails: Vec<_> = recipients.iter().map(|r| r.email.as_str()).collect();
        assert_eq!(emails, vec!["a@example.com"]);
    }

    #[tokio::test]
    async fn test_empty_audience() {
        let group = Uuid::now_v7();
        let mut unsubscribed = contact("gone@example.com", "Gone");
        unsubscribed.unsubscribed_at = Some(chrono::Utc::now());
        let source = FakeRecipients::default().with_group(group, vec![unsubscribed]);

        assert!(matches!(
            resolve_recipients(&source, Some(group)).await,
            Err(DispatchError::EmptyAudience)
        ));
    }
}
