//! Billing webhook processor.
//!
//! Turns a raw, signed provider delivery into ledger effects:
//!
//! 1. Verify the signature over the raw bytes.
//! 2. Parse into a [`BillingEvent`].
//! 3. Skip events whose id is already processed.
//! 4. Apply the event's effects and the processed-event marker in one
//!    per-user transaction, re-checking the marker inside it.
//!
//! Deliveries that can never succeed (malformed body, no usable user) are
//! acknowledged so the provider stops retrying. Provider lookups and storage
//! failures are errors so the provider retries.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use tally_core::{
    ApplyMode, CreditDelta, CreditPurchase, PricingTable, ProcessedEvent, SubscriptionRecord,
    TransactionType, UserId,
};
use tally_store::{LedgerTxn, Store, StoreError, StoreRead};

use crate::engine::CreditEngine;
use crate::stripe::{
    verify_signature, BillingEvent, CheckoutKind, CheckoutSession, EventEnvelope, SignatureError,
    StripeClient, Subscription,
};

/// How a delivery was handled. Every outcome is acknowledged with 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Effects applied and the event marked processed.
    Applied,
    /// The event id was already processed; nothing changed.
    Duplicate,
    /// The event can never be applied; marked processed when it has an id.
    Skipped {
        /// Why.
        reason: &'static str,
    },
    /// An event kind this service does not act on.
    Ignored {
        /// Provider event type.
        event_type: String,
    },
}

/// Processing failures. None of them leaves partial state behind.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// Signature verification failed; nothing was parsed or written.
    #[error("webhook authentication failed: {0}")]
    Authentication(#[from] SignatureError),

    /// The billing provider could not be reached or rejected a lookup.
    #[error("billing provider unavailable: {0}")]
    Upstream(String),

    /// The store failed.
    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),
}

/// Applies billing provider webhooks to the ledger.
#[derive(Clone)]
pub struct WebhookProcessor {
    store: Arc<dyn Store>,
    engine: CreditEngine,
    stripe: Option<Arc<StripeClient>>,
    pricing: PricingTable,
    signing_secret: Option<String>,
    tolerance_secs: u64,
}

impl WebhookProcessor {
    /// Create a processor.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        stripe: Option<Arc<StripeClient>>,
        pricing: PricingTable,
        signing_secret: Option<String>,
        tolerance_secs: u64,
    ) -> Self {
        Self {
            engine: CreditEngine::new(Arc::clone(&store)),
            store,
            stripe,
            pricing,
            signing_secret,
            tolerance_secs,
        }
    }

    /// Verify, parse and apply one delivery.
    ///
    /// # Errors
    ///
    /// - [`ProcessError::Authentication`] for a bad or missing signature.
    /// - [`ProcessError::Upstream`] if the provider lookup fails.
    /// - [`ProcessError::Storage`] if the store fails.
    pub async fn handle(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<Outcome, ProcessError> {
        if let Err(e) = verify_signature(
            payload,
            signature,
            self.signing_secret.as_deref(),
            self.tolerance_secs,
            Utc::now().timestamp(),
        ) {
            if e == SignatureError::MissingSecret {
                tracing::error!("Webhook signing secret not configured - rejecting delivery");
            } else {
                tracing::warn!(error = %e, "Rejected webhook delivery");
            }
            return Err(e.into());
        }

        let envelope = match EventEnvelope::parse(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Verified webhook body could not be parsed - acknowledging");
                return Ok(Outcome::Skipped {
                    reason: "malformed event",
                });
            }
        };

        tracing::info!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            "Received billing webhook"
        );

        if self.store.has_processed_event(&envelope.id)? {
            tracing::info!(event_id = %envelope.id, "Event already processed");
            return Ok(Outcome::Duplicate);
        }

        let outcome = match &envelope.event {
            BillingEvent::CheckoutCompleted(session) => {
                self.checkout_completed(&envelope, session).await?
            }
            BillingEvent::SubscriptionUpdated(subscription) => {
                self.subscription_updated(&envelope, subscription)?
            }
            BillingEvent::SubscriptionDeleted(subscription) => {
                self.subscription_deleted(&envelope, subscription)?
            }
            BillingEvent::Unrecognized { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled billing event");
                Outcome::Ignored {
                    event_type: event_type.clone(),
                }
            }
        };

        tracing::info!(event_id = %envelope.id, outcome = ?outcome, "Billing webhook handled");
        Ok(outcome)
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    async fn checkout_completed(
        &self,
        envelope: &EventEnvelope,
        session: &CheckoutSession,
    ) -> Result<Outcome, ProcessError> {
        let Some(user_id) = parse_user(session.user_id()) else {
            return self.skip(envelope, "checkout session has no valid user_id");
        };

        let kind = match session.kind().map(CheckoutKind::from_str) {
            None => CheckoutKind::Subscription,
            Some(Ok(kind)) => kind,
            Some(Err(e)) => {
                tracing::warn!(session_id = %session.id, error = %e, "Unknown checkout type");
                return self.skip(envelope, "unknown checkout type");
            }
        };

        match kind {
            CheckoutKind::Subscription => {
                self.subscription_checkout(envelope, session, user_id).await
            }
            CheckoutKind::Credits => self.credits_checkout(envelope, session, user_id),
        }
    }

    async fn subscription_checkout(
        &self,
        envelope: &EventEnvelope,
        session: &CheckoutSession,
        user_id: UserId,
    ) -> Result<Outcome, ProcessError> {
        let Some(subscription_id) = session.subscription.as_deref() else {
            return self.skip(envelope, "subscription checkout has no subscription");
        };

        let stripe = self.stripe.as_ref().ok_or_else(|| {
            tracing::error!("Stripe client not configured - cannot retrieve subscription");
            ProcessError::Upstream("Stripe client not configured".into())
        })?;

        let subscription = stripe
            .retrieve_subscription(subscription_id)
            .await
            .map_err(|e| {
                tracing::warn!(subscription_id = %subscription_id, error = %e, "Subscription lookup failed");
                ProcessError::Upstream(e.to_string())
            })?;

        let delta = self.pricing.subscription_delta(subscription.price_id());
        let transaction_type = match delta.mode {
            ApplyMode::Set => TransactionType::SubscriptionReset,
            ApplyMode::Add => TransactionType::SubscriptionGrant,
        };

        self.apply(user_id, envelope, |txn| {
            let incoming = subscription_record(&subscription, user_id, envelope.created);
            let record = match txn.subscription(&subscription.id)? {
                Some(mut existing) => {
                    let last_event_at = existing.last_event_at.max(envelope.created);
                    existing.overwrite_with(incoming);
                    existing.last_event_at = last_event_at;
                    existing
                }
                None => incoming,
            };
            txn.put_subscription(record);

            txn.ledger_or_provision()?
                .attach_subscription(&subscription.id);

            let balance = txn.apply_credits(
                delta,
                transaction_type,
                "Subscription credit allotment",
                json!({
                    "event_id": envelope.id,
                    "subscription_id": subscription.id,
                    "price_id": subscription.price_id(),
                }),
            )?;

            tracing::info!(
                user_id = %user_id,
                subscription_id = %subscription.id,
                balance,
                "Subscription activated"
            );
            Ok(())
        })
    }

    fn credits_checkout(
        &self,
        envelope: &EventEnvelope,
        session: &CheckoutSession,
        user_id: UserId,
    ) -> Result<Outcome, ProcessError> {
        let Some(payment_intent_id) = session.payment_intent.as_deref() else {
            return self.skip(envelope, "credit checkout has no payment intent");
        };

        let Some(amount_paid) = session.amount_total.filter(|amount| *amount > 0) else {
            tracing::warn!(session_id = %session.id, amount_total = ?session.amount_total, "Credit checkout has no positive amount");
            return self.skip(envelope, "invalid checkout amount");
        };
        let credits = match self.pricing.credits_for_payment(amount_paid) {
            Ok(credits) => credits,
            Err(e) => {
                tracing::warn!(session_id = %session.id, error = %e, "Unusable checkout amount");
                return self.skip(envelope, "invalid checkout amount");
            }
        };

        self.apply(user_id, envelope, |txn| {
            if txn.purchase_exists(payment_intent_id)? {
                tracing::info!(
                    payment_intent_id = %payment_intent_id,
                    "Purchase already recorded - no credits added"
                );
                return Ok(());
            }

            txn.ledger_or_provision()?;
            txn.put_purchase(CreditPurchase::completed(
                user_id,
                payment_intent_id,
                credits,
                amount_paid,
            ))?;
            let balance = txn.apply_credits(
                CreditDelta::add(credits),
                TransactionType::Purchase,
                format!("Purchased {credits} credits"),
                json!({
                    "event_id": envelope.id,
                    "payment_intent_id": payment_intent_id,
                    "amount_paid": amount_paid,
                }),
            )?;

            tracing::info!(user_id = %user_id, credits, balance, "Credits purchased");
            Ok(())
        })
    }

    // =========================================================================
    // Subscription lifecycle
    // =========================================================================

    fn subscription_updated(
        &self,
        envelope: &EventEnvelope,
        subscription: &Subscription,
    ) -> Result<Outcome, ProcessError> {
        let Some(user_id) = self.subscription_owner(subscription)? else {
            return self.skip(envelope, "subscription has no valid user_id");
        };

        self.apply(user_id, envelope, |txn| {
            let incoming = subscription_record(subscription, user_id, envelope.created);
            match txn.subscription(&subscription.id)? {
                Some(existing) if !existing.accepts_event_at(envelope.created) => {
                    tracing::info!(
                        subscription_id = %subscription.id,
                        "Ignoring out-of-order subscription update"
                    );
                    return Ok(());
                }
                Some(mut existing) => {
                    existing.overwrite_with(incoming);
                    txn.put_subscription(existing);
                }
                None => txn.put_subscription(incoming),
            }

            let active = subscription.status.is_active();
            if !txn
                .ledger_or_provision()?
                .mirror_subscription(&subscription.id, active)
            {
                tracing::debug!(
                    user_id = %user_id,
                    subscription_id = %subscription.id,
                    "Ledger follows another subscription - status not mirrored"
                );
            }
            Ok(())
        })
    }

    fn subscription_deleted(
        &self,
        envelope: &EventEnvelope,
        subscription: &Subscription,
    ) -> Result<Outcome, ProcessError> {
        let Some(user_id) = self.subscription_owner(subscription)? else {
            return self.skip(envelope, "subscription has no valid user_id");
        };

        self.apply(user_id, envelope, |txn| {
            let mut record = txn.subscription(&subscription.id)?.unwrap_or_else(|| {
                subscription_record(subscription, user_id, envelope.created)
            });
            record.cancel(envelope.created);
            txn.put_subscription(record);

            if txn.ledger()?.is_some() && txn.ledger_mut()?.detach_subscription(&subscription.id) {
                tracing::info!(
                    user_id = %user_id,
                    subscription_id = %subscription.id,
                    "Subscription canceled"
                );
            }
            Ok(())
        })
    }

    /// The subscription's user: `metadata.user_id`, else the stored record's owner.
    fn subscription_owner(&self, subscription: &Subscription) -> Result<Option<UserId>, ProcessError> {
        if let Some(user_id) = parse_user(subscription.user_id()) {
            return Ok(Some(user_id));
        }
        Ok(self
            .store
            .get_subscription(&subscription.id)?
            .map(|record| record.user_id))
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Run `effects` and the processed-event marker as one unit.
    fn apply(
        &self,
        user_id: UserId,
        envelope: &EventEnvelope,
        effects: impl FnOnce(&mut LedgerTxn<'_>) -> tally_store::Result<()>,
    ) -> Result<Outcome, ProcessError> {
        let marker = ProcessedEvent::now(&envelope.id, &envelope.event_type);

        let applied = self.engine.atomically(&user_id, |txn| {
            if txn.is_event_processed(&marker.event_id)? {
                return Ok(false);
            }
            effects(txn)?;
            txn.mark_event_processed(marker)?;
            Ok(true)
        })?;

        Ok(if applied {
            Outcome::Applied
        } else {
            Outcome::Duplicate
        })
    }

    /// Acknowledge an event that can never be applied.
    fn skip(&self, envelope: &EventEnvelope, reason: &'static str) -> Result<Outcome, ProcessError> {
        tracing::warn!(
            event_id = %envelope.id,
            event_type = %envelope.event_type,
            reason,
            "Skipping billing event"
        );
        let marker = ProcessedEvent::now(&envelope.id, &envelope.event_type);
        if !self.store.mark_event_processed(&marker)? {
            return Ok(Outcome::Duplicate);
        }
        Ok(Outcome::Skipped { reason })
    }
}

fn parse_user(raw: Option<&str>) -> Option<UserId> {
    raw.and_then(|value| match value.parse() {
        Ok(user_id) => Some(user_id),
        Err(_) => {
            tracing::warn!(user_id = %value, "Ignoring malformed user_id");
            None
        }
    })
}

fn subscription_record(
    subscription: &Subscription,
    user_id: UserId,
    event_at: Option<DateTime<Utc>>,
) -> SubscriptionRecord {
    let now = Utc::now();
    SubscriptionRecord {
        subscription_id: subscription.id.clone(),
        user_id,
        customer_id: subscription.customer.clone(),
        status: subscription.status,
        price_id: subscription.price_id().map(str::to_owned),
        current_period_start: subscription.period_start(),
        current_period_end: subscription.period_end(),
        last_event_at: event_at,
        created_at: now,
        updated_at: now,
    }
}
