//! In-memory storage implementation.
//!
//! Tables live behind one `RwLock`; per-user transactions additionally hold a
//! striped user lock so read-check-write sequences on a ledger never
//! interleave. Nothing survives a restart.

use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tally_core::{
    Conversation, ConversationId, CreditPurchase, CreditTransaction, DocumentId,
    GeneratedDocument, ProcessedEvent, SubscriptionRecord, TransactionId, UserId, UserLedger,
};

use crate::error::{Result, StoreError};
use crate::locks::KeyedLocks;
use crate::txn::{LedgerTxn, StagedWrites};
use crate::{Store, StoreRead};

#[derive(Debug, Default)]
struct Tables {
    ledgers: HashMap<UserId, UserLedger>,
    subscriptions: HashMap<String, SubscriptionRecord>,
    purchases: HashMap<String, CreditPurchase>,
    events: HashMap<String, ProcessedEvent>,
    conversations: HashMap<ConversationId, Conversation>,
    documents: HashMap<DocumentId, GeneratedDocument>,
    transactions: BTreeMap<TransactionId, CreditTransaction>,
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    locks: KeyedLocks,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn commit(&self, writes: StagedWrites) {
        if writes.is_empty() {
            return;
        }
        let mut tables = self.write();

        if let Some(ledger) = writes.ledger {
            tables.ledgers.insert(ledger.user_id, ledger);
        }
        for record in writes.subscriptions {
            tables
                .subscriptions
                .insert(record.subscription_id.clone(), record);
        }
        for purchase in writes.purchases {
            tables
                .purchases
                .entry(purchase.payment_intent_id.clone())
                .or_insert(purchase);
        }
        for conversation in writes.conversations {
            tables
                .conversations
                .insert(conversation.conversation_id, conversation);
        }
        for transaction in writes.transactions {
            tables.transactions.insert(transaction.id, transaction);
        }
        for event in writes.events {
            tables.events.entry(event.event_id.clone()).or_insert(event);
        }
    }
}

impl StoreRead for MemoryStore {
    fn get_ledger(&self, user_id: &UserId) -> Result<Option<UserLedger>> {
        Ok(self.read().ledgers.get(user_id).cloned())
    }

    fn get_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionRecord>> {
        Ok(self.read().subscriptions.get(subscription_id).cloned())
    }

    fn get_purchase_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CreditPurchase>> {
        Ok(self.read().purchases.get(payment_intent_id).cloned())
    }

    fn get_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>> {
        Ok(self.read().events.get(event_id).cloned())
    }

    fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        Ok(self.read().conversations.get(conversation_id).cloned())
    }

    fn list_documents_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<GeneratedDocument>> {
        let mut documents: Vec<_> = self
            .read()
            .documents
            .values()
            .filter(|doc| &doc.conversation_id == conversation_id)
            .cloned()
            .collect();
        documents.sort_by_key(|doc| doc.created_at);
        Ok(documents)
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        Ok(self
            .read()
            .transactions
            .values()
            .rev()
            .filter(|tx| &tx.user_id == user_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }
}

impl Store for MemoryStore {
    fn create_ledger(&self, ledger: &UserLedger) -> Result<()> {
        let mut tables = self.write();
        if tables.ledgers.contains_key(&ledger.user_id) {
            return Err(StoreError::AlreadyExists {
                entity: "ledger",
                id: ledger.user_id.to_string(),
            });
        }
        tables.ledgers.insert(ledger.user_id, ledger.clone());
        Ok(())
    }

    fn put_document(&self, document: &GeneratedDocument) -> Result<()> {
        self.write()
            .documents
            .insert(document.document_id, document.clone());
        Ok(())
    }

    fn mark_event_processed(&self, event: &ProcessedEvent) -> Result<bool> {
        let mut tables = self.write();
        if tables.events.contains_key(&event.event_id) {
            return Ok(false);
        }
        tables.events.insert(event.event_id.clone(), event.clone());
        Ok(true)
    }

    fn transaction(
        &self,
        user_id: &UserId,
        f: &mut dyn FnMut(&mut LedgerTxn<'_>) -> Result<()>,
    ) -> Result<()> {
        let _guard = self.locks.lock(user_id.as_bytes());
        let mut txn = LedgerTxn::new(self, *user_id);
        f(&mut txn)?;
        self.commit(txn.into_writes());
        Ok(())
    }
}
