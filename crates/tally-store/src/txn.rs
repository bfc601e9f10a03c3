//! Staged per-user transactions.
//!
//! A [`LedgerTxn`] is handed to the closure passed to
//! [`Store::transaction`](crate::Store::transaction). Reads go through the
//! staged writes first and then to the backend; writes are buffered and
//! committed by the backend in one atomic unit after the closure returns `Ok`.
//! If the closure returns an error nothing is written.

use std::collections::HashMap;

use tally_core::{
    Conversation, ConversationId, CreditDelta, CreditPurchase, CreditTransaction, ProcessedEvent,
    SubscriptionRecord, TransactionType, UserId, UserLedger,
};

use crate::error::{Result, StoreError};
use crate::StoreRead;

/// Writes buffered by a [`LedgerTxn`], applied by the backend on commit.
#[derive(Debug, Default)]
pub(crate) struct StagedWrites {
    pub ledger: Option<UserLedger>,
    pub subscriptions: Vec<SubscriptionRecord>,
    pub purchases: Vec<CreditPurchase>,
    pub conversations: Vec<Conversation>,
    pub transactions: Vec<CreditTransaction>,
    pub events: Vec<ProcessedEvent>,
}

impl StagedWrites {
    pub fn is_empty(&self) -> bool {
        self.ledger.is_none()
            && self.subscriptions.is_empty()
            && self.purchases.is_empty()
            && self.conversations.is_empty()
            && self.transactions.is_empty()
            && self.events.is_empty()
    }
}

/// A unit of work scoped to one user's ledger.
pub struct LedgerTxn<'a> {
    base: &'a dyn StoreRead,
    user_id: UserId,
    ledger: Option<UserLedger>,
    ledger_loaded: bool,
    ledger_dirty: bool,
    subscriptions: HashMap<String, SubscriptionRecord>,
    purchases: HashMap<String, CreditPurchase>,
    conversations: HashMap<ConversationId, Conversation>,
    transactions: Vec<CreditTransaction>,
    events: HashMap<String, ProcessedEvent>,
}

impl<'a> LedgerTxn<'a> {
    pub(crate) fn new(base: &'a dyn StoreRead, user_id: UserId) -> Self {
        Self {
            base,
            user_id,
            ledger: None,
            ledger_loaded: false,
            ledger_dirty: false,
            subscriptions: HashMap::new(),
            purchases: HashMap::new(),
            conversations: HashMap::new(),
            transactions: Vec::new(),
            events: HashMap::new(),
        }
    }

    /// The user this transaction is locked on.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.user_id
    }

    // =========================================================================
    // Ledger
    // =========================================================================

    fn load_ledger(&mut self) -> Result<()> {
        if !self.ledger_loaded {
            self.ledger = self.base.get_ledger(&self.user_id)?;
            self.ledger_loaded = true;
        }
        Ok(())
    }

    /// Read the ledger as staged so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn ledger(&mut self) -> Result<Option<&UserLedger>> {
        self.load_ledger()?;
        Ok(self.ledger.as_ref())
    }

    /// Mutable access to an existing ledger.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the user has no ledger.
    pub fn ledger_mut(&mut self) -> Result<&mut UserLedger> {
        self.load_ledger()?;
        let user_id = self.user_id;
        self.ledger_dirty = true;
        self.ledger
            .as_mut()
            .ok_or_else(|| StoreError::ledger_not_found(user_id))
    }

    /// Mutable access to the ledger, creating an empty one if it is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn ledger_or_provision(&mut self) -> Result<&mut UserLedger> {
        self.load_ledger()?;
        if self.ledger.is_none() {
            tracing::info!(user_id = %self.user_id, "Provisioning ledger inside transaction");
        }
        let user_id = self.user_id;
        self.ledger_dirty = true;
        Ok(self.ledger.get_or_insert_with(|| UserLedger::new(user_id)))
    }

    /// Apply a balance change and log it as a credit transaction.
    ///
    /// Returns the resulting balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user has no ledger.
    /// - `StoreError::InsufficientBalance` if a spend exceeds the balance.
    pub fn apply_credits(
        &mut self,
        delta: CreditDelta,
        transaction_type: TransactionType,
        description: impl Into<String>,
        metadata: serde_json::Value,
    ) -> Result<i64> {
        let ledger = self.ledger_mut()?;
        let before = ledger.apply_delta(delta, transaction_type)?;
        let after = ledger.credits;
        let user_id = ledger.user_id;

        self.transactions.push(
            CreditTransaction::record(user_id, transaction_type, before, after, description)
                .with_metadata(metadata),
        );
        Ok(after)
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Read a subscription record as staged so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionRecord>> {
        if let Some(record) = self.subscriptions.get(subscription_id) {
            return Ok(Some(record.clone()));
        }
        self.base.get_subscription(subscription_id)
    }

    /// Stage an insert or overwrite of a subscription record.
    pub fn put_subscription(&mut self, record: SubscriptionRecord) {
        self.subscriptions
            .insert(record.subscription_id.clone(), record);
    }

    // =========================================================================
    // Purchases
    // =========================================================================

    /// Whether a purchase with this payment intent exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn purchase_exists(&self, payment_intent_id: &str) -> Result<bool> {
        if self.purchases.contains_key(payment_intent_id) {
            return Ok(true);
        }
        Ok(self
            .base
            .get_purchase_by_payment_intent(payment_intent_id)?
            .is_some())
    }

    /// Stage a new purchase.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the payment intent is taken.
    pub fn put_purchase(&mut self, purchase: CreditPurchase) -> Result<()> {
        if self.purchase_exists(&purchase.payment_intent_id)? {
            return Err(StoreError::AlreadyExists {
                entity: "purchase",
                id: purchase.payment_intent_id,
            });
        }
        self.purchases
            .insert(purchase.payment_intent_id.clone(), purchase);
        Ok(())
    }

    // =========================================================================
    // Conversations
    // =========================================================================

    /// Read a conversation as staged so far.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        if let Some(conversation) = self.conversations.get(conversation_id) {
            return Ok(Some(conversation.clone()));
        }
        self.base.get_conversation(conversation_id)
    }

    /// Stage an insert or overwrite of a conversation.
    pub fn put_conversation(&mut self, conversation: Conversation) {
        self.conversations
            .insert(conversation.conversation_id, conversation);
    }

    // =========================================================================
    // Processed events
    // =========================================================================

    /// Whether the event id has been processed, including by this transaction.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend read fails.
    pub fn is_event_processed(&self, event_id: &str) -> Result<bool> {
        if self.events.contains_key(event_id) {
            return Ok(true);
        }
        self.base.has_processed_event(event_id)
    }

    /// Stage the processed-event marker.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::DuplicateEvent` if the event is already processed.
    pub fn mark_event_processed(&mut self, event: ProcessedEvent) -> Result<()> {
        if self.is_event_processed(&event.event_id)? {
            return Err(StoreError::DuplicateEvent {
                event_id: event.event_id,
            });
        }
        self.events.insert(event.event_id.clone(), event);
        Ok(())
    }

    pub(crate) fn into_writes(self) -> StagedWrites {
        StagedWrites {
            ledger: if self.ledger_dirty { self.ledger } else { None },
            subscriptions: self.subscriptions.into_values().collect(),
            purchases: self.purchases.into_values().collect(),
            conversations: self.conversations.into_values().collect(),
            transactions: self.transactions,
            events: self.events.into_values().collect(),
        }
    }
}
