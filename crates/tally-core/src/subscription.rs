//! Provider-side subscription records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// A subscription as last reported by the billing provider.
///
/// Records are keyed by the provider's subscription id. Status changes are
/// applied in place and canceled records are retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRecord {
    /// Provider subscription id (`sub_...`).
    pub subscription_id: String,

    /// The user that owns the subscription.
    pub user_id: UserId,

    /// Provider customer id, when known.
    pub customer_id: Option<String>,

    /// Provider status.
    pub status: ProviderSubscriptionStatus,

    /// Price of the first subscription item.
    pub price_id: Option<String>,

    /// Start of the current billing period.
    pub current_period_start: Option<DateTime<Utc>>,

    /// End of the current billing period.
    pub current_period_end: Option<DateTime<Utc>>,

    /// Creation time of the provider event that last changed this record.
    pub last_event_at: Option<DateTime<Utc>>,

    /// When the record was first stored.
    pub created_at: DateTime<Utc>,

    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    /// Whether a change from an event created at `event_at` may overwrite
    /// this record.
    ///
    /// Events without a timestamp, and records that never saw one, always
    /// apply. Ties apply too, so a redelivered state is idempotent.
    #[must_use]
    pub fn accepts_event_at(&self, event_at: Option<DateTime<Utc>>) -> bool {
        match (self.last_event_at, event_at) {
            (Some(last), Some(at)) => at >= last,
            _ => true,
        }
    }

    /// Overwrite the provider-controlled fields with `incoming`.
    ///
    /// `created_at` of the stored record is preserved.
    pub fn overwrite_with(&mut self, incoming: Self) {
        let created_at = self.created_at;
        *self = incoming;
        self.created_at = created_at;
        self.updated_at = Utc::now();
    }

    /// Mark the subscription canceled.
    pub fn cancel(&mut self, event_at: Option<DateTime<Utc>>) {
        self.status = ProviderSubscriptionStatus::Canceled;
        if event_at.is_some() {
            self.last_event_at = event_at;
        }
        self.updated_at = Utc::now();
    }
}

/// Subscription status as reported by the billing provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSubscriptionStatus {
    /// Paid and current.
    Active,
    /// In a free trial.
    Trialing,
    /// Latest invoice is unpaid, retries pending.
    PastDue,
    /// Retries exhausted.
    Unpaid,
    /// First payment not yet completed.
    Incomplete,
    /// First payment never completed.
    IncompleteExpired,
    /// Collection paused.
    Paused,
    /// Canceled.
    Canceled,
    /// Any status this service does not know about.
    #[serde(other)]
    Unknown,
}

impl ProviderSubscriptionStatus {
    /// Whether the ledger should treat the subscription as active.
    ///
    /// Only the provider's `active` counts; everything else is inactive.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(last_event_at: Option<DateTime<Utc>>) -> SubscriptionRecord {
        let now = Utc::now();
        SubscriptionRecord {
            subscription_id: "sub_1".into(),
            user_id: UserId::generate(),
            customer_id: None,
            status: ProviderSubscriptionStatus::Active,
            price_id: None,
            current_period_start: None,
            current_period_end: None,
            last_event_at,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn older_events_are_rejected() {
        let t1 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let t2 = Utc.timestamp_opt(1_700_000_100, 0).unwrap();
        let rec = record(Some(t2));

        assert!(!rec.accepts_event_at(Some(t1)));
        assert!(rec.accepts_event_at(Some(t2)));
        assert!(rec.accepts_event_at(None));
        assert!(record(None).accepts_event_at(Some(t1)));
    }

    #[test]
    fn overwrite_keeps_creation_time() {
        let mut stored = record(None);
        let created = stored.created_at;
        let mut incoming = record(None);
        incoming.status = ProviderSubscriptionStatus::PastDue;
        incoming.created_at = created + chrono::Duration::days(3);

        stored.overwrite_with(incoming);
        assert_eq!(stored.status, ProviderSubscriptionStatus::PastDue);
        assert_eq!(stored.created_at, created);
    }

    #[test]
    fn unknown_status_deserializes() {
        let status: ProviderSubscriptionStatus = serde_json::from_str("\"something_new\"").unwrap();
        assert_eq!(status, ProviderSubscriptionStatus::Unknown);
        assert!(!status.is_active());

        let status: ProviderSubscriptionStatus = serde_json::from_str("\"past_due\"").unwrap();
        assert_eq!(status, ProviderSubscriptionStatus::PastDue);
    }
}
