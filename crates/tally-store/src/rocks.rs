//! `RocksDB` storage implementation.
//!
//! Values are CBOR-encoded. A committed [`LedgerTxn`] becomes a single
//! `WriteBatch`, so either every staged write lands or none does.

use std::path::Path;
use std::sync::Arc;

use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use tally_core::{
    Conversation, ConversationId, CreditPurchase, CreditTransaction, GeneratedDocument,
    ProcessedEvent, SubscriptionRecord, UserId, UserLedger,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::locks::KeyedLocks;
use crate::schema::{all_column_families, cf};
use crate::txn::{LedgerTxn, StagedWrites};
use crate::{Store, StoreRead};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    locks: KeyedLocks,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            locks: KeyedLocks::default(),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, family: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(family)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn contains(&self, family: &str, key: &[u8]) -> Result<bool> {
        let cf = self.cf(family)?;
        Ok(self
            .db
            .get_pinned_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some())
    }

    /// Keys and values under `prefix`, in key order.
    fn scan_prefix(&self, family: &str, prefix: &[u8]) -> Result<Vec<(Box<[u8]>, Box<[u8]>)>> {
        let cf = self.cf(family)?;
        let mut entries = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            entries.push((key, value));
        }
        Ok(entries)
    }

    fn commit(&self, writes: StagedWrites) -> Result<()> {
        if writes.is_empty() {
            return Ok(());
        }

        let cf_ledgers = self.cf(cf::LEDGERS)?;
        let cf_subscriptions = self.cf(cf::SUBSCRIPTIONS)?;
        let cf_purchases = self.cf(cf::PURCHASES)?;
        let cf_conversations = self.cf(cf::CONVERSATIONS)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_tx_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let cf_events = self.cf(cf::PROCESSED_EVENTS)?;

        let mut batch = WriteBatch::default();

        if let Some(ledger) = &writes.ledger {
            batch.put_cf(
                &cf_ledgers,
                keys::ledger_key(&ledger.user_id),
                Self::serialize(ledger)?,
            );
        }
        for record in &writes.subscriptions {
            batch.put_cf(
                &cf_subscriptions,
                keys::subscription_key(&record.subscription_id),
                Self::serialize(record)?,
            );
        }
        for purchase in &writes.purchases {
            batch.put_cf(
                &cf_purchases,
                keys::purchase_key(&purchase.payment_intent_id),
                Self::serialize(purchase)?,
            );
        }
        for conversation in &writes.conversations {
            batch.put_cf(
                &cf_conversations,
                keys::conversation_key(&conversation.conversation_id),
                Self::serialize(conversation)?,
            );
        }
        for transaction in &writes.transactions {
            batch.put_cf(
                &cf_tx,
                keys::transaction_key(&transaction.id),
                Self::serialize(transaction)?,
            );
            batch.put_cf(
                &cf_tx_by_user,
                keys::user_transaction_key(&transaction.user_id, &transaction.id),
                [],
            );
        }
        for event in &writes.events {
            batch.put_cf(
                &cf_events,
                keys::event_key(&event.event_id),
                Self::serialize(event)?,
            );
        }

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl StoreRead for RocksStore {
    fn get_ledger(&self, user_id: &UserId) -> Result<Option<UserLedger>> {
        self.get_value(cf::LEDGERS, &keys::ledger_key(user_id))
    }

    fn get_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionRecord>> {
        self.get_value(cf::SUBSCRIPTIONS, &keys::subscription_key(subscription_id))
    }

    fn get_purchase_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CreditPurchase>> {
        self.get_value(cf::PURCHASES, &keys::purchase_key(payment_intent_id))
    }

    fn get_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>> {
        self.get_value(cf::PROCESSED_EVENTS, &keys::event_key(event_id))
    }

    fn has_processed_event(&self, event_id: &str) -> Result<bool> {
        self.contains(cf::PROCESSED_EVENTS, &keys::event_key(event_id))
    }

    fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>> {
        self.get_value(cf::CONVERSATIONS, &keys::conversation_key(conversation_id))
    }

    fn list_documents_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<GeneratedDocument>> {
        let prefix = keys::conversation_key(conversation_id);
        let mut documents = self
            .scan_prefix(cf::DOCUMENTS, &prefix)?
            .into_iter()
            .map(|(_, value)| Self::deserialize::<GeneratedDocument>(&value))
            .collect::<Result<Vec<_>>>()?;
        documents.sort_by_key(|doc| doc.created_at);
        Ok(documents)
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>> {
        let prefix = keys::ledger_key(user_id);

        // ULIDs sort by time, so the index is oldest first; walk it backwards.
        let index = self.scan_prefix(cf::TRANSACTIONS_BY_USER, &prefix)?;

        let mut transactions = Vec::with_capacity(limit.min(index.len()));
        for (key, _) in index.iter().rev().skip(offset).take(limit) {
            let tx_id = keys::transaction_id_from_user_key(key)?;
            if let Some(tx) = self.get_value(cf::TRANSACTIONS, &keys::transaction_key(&tx_id))? {
                transactions.push(tx);
            }
        }
        Ok(transactions)
    }
}

impl Store for RocksStore {
    fn create_ledger(&self, ledger: &UserLedger) -> Result<()> {
        let key = keys::ledger_key(&ledger.user_id);
        let _guard = self.locks.lock(&key);

        if self.contains(cf::LEDGERS, &key)? {
            return Err(StoreError::AlreadyExists {
                entity: "ledger",
                id: ledger.user_id.to_string(),
            });
        }

        let cf = self.cf(cf::LEDGERS)?;
        self.db
            .put_cf(&cf, key, Self::serialize(ledger)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn put_document(&self, document: &GeneratedDocument) -> Result<()> {
        let cf = self.cf(cf::DOCUMENTS)?;
        let key = keys::document_key(&document.conversation_id, &document.document_id);
        self.db
            .put_cf(&cf, key, Self::serialize(document)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn mark_event_processed(&self, event: &ProcessedEvent) -> Result<bool> {
        let _guard = self.locks.lock(&keys::event_lock_key(&event.event_id));
        let key = keys::event_key(&event.event_id);

        if self.contains(cf::PROCESSED_EVENTS, &key)? {
            return Ok(false);
        }

        let cf = self.cf(cf::PROCESSED_EVENTS)?;
        self.db
            .put_cf(&cf, key, Self::serialize(event)?)
            .map_err(|e| StoreError::Database(e.to_string()))?;
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
        self.commit(txn.into_writes())
    }
}
