//! Storage layer for tally.
//!
//! This crate persists ledgers, provider subscription records, credit
//! purchases, processed-event markers, conversations, generated documents and
//! the credit transaction log.
//!
//! # Backends
//!
//! - [`MemoryStore`]: always available, used by tests and single-process runs.
//! - [`RocksStore`]: `RocksDB` with column families and CBOR values, behind the
//!   default `rocksdb-backend` feature.
//!
//! # Writing
//!
//! Ledger balances are never written directly. All effects that belong to a
//! user go through [`Store::transaction`], which runs a closure over a staged
//! [`LedgerTxn`] while holding that user's lock and commits the staged writes
//! atomically. [`transact`] is the generic convenience wrapper.
//!
//! # Example
//!
//! ```
//! use tally_core::{CreditDelta, TransactionType, UserId, UserLedger};
//! use tally_store::{transact, MemoryStore, Store, StoreRead};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! store.create_ledger(&UserLedger::new(user_id)).unwrap();
//!
//! let balance = transact(&store, &user_id, |txn| {
//!     txn.apply_credits(
//!         CreditDelta::add(50),
//!         TransactionType::Purchase,
//!         "Purchased 50 credits",
//!         serde_json::Value::Null,
//!     )
//! })
//! .unwrap();
//!
//! assert_eq!(balance, 50);
//! assert_eq!(store.get_ledger(&user_id).unwrap().unwrap().credits, 50);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod locks;
pub mod memory;
pub mod schema;
pub mod txn;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;

#[cfg(test)]
mod conformance;

pub use error::{Result, StoreError};
pub use locks::KeyedLocks;
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;
pub use txn::LedgerTxn;

use tally_core::{
    Conversation, ConversationId, CreditPurchase, CreditTransaction, GeneratedDocument,
    ProcessedEvent, SubscriptionRecord, UserId, UserLedger,
};

/// Read operations shared by every backend.
pub trait StoreRead: Send + Sync {
    // =========================================================================
    // Ledgers
    // =========================================================================

    /// Get a ledger by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_ledger(&self, user_id: &UserId) -> Result<Option<UserLedger>>;

    // =========================================================================
    // Billing records
    // =========================================================================

    /// Get a subscription record by provider subscription id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, subscription_id: &str) -> Result<Option<SubscriptionRecord>>;

    /// Get a credit purchase by its payment-intent id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_purchase_by_payment_intent(
        &self,
        payment_intent_id: &str,
    ) -> Result<Option<CreditPurchase>>;

    /// Get the processed-event marker for an event id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_processed_event(&self, event_id: &str) -> Result<Option<ProcessedEvent>>;

    /// Check if an event id has already been processed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn has_processed_event(&self, event_id: &str) -> Result<bool> {
        Ok(self.get_processed_event(event_id)?.is_some())
    }

    // =========================================================================
    // Assistant records
    // =========================================================================

    /// Get a conversation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_conversation(&self, conversation_id: &ConversationId) -> Result<Option<Conversation>>;

    /// List documents generated in a conversation.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_documents_by_conversation(
        &self,
        conversation_id: &ConversationId,
    ) -> Result<Vec<GeneratedDocument>>;

    // =========================================================================
    // Credit transactions
    // =========================================================================

    /// List transactions for a user, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<CreditTransaction>>;
}

/// The storage trait defining all write operations.
pub trait Store: StoreRead {
    /// Provision a new ledger.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the user already has a ledger.
    fn create_ledger(&self, ledger: &UserLedger) -> Result<()>;

    /// Record a generated document.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_document(&self, document: &GeneratedDocument) -> Result<()>;

    /// Mark an event processed outside any user transaction.
    ///
    /// Used for events that carry no usable user. Returns `false` if the event
    /// was already marked.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn mark_event_processed(&self, event: &ProcessedEvent) -> Result<bool>;

    /// Run `f` over a staged transaction on `user_id`'s ledger.
    ///
    /// The user's lock is held from the first read until the commit, so no
    /// other transaction on the same user can interleave. Staged writes are
    /// committed atomically only if `f` returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or an error if the commit fails.
    fn transaction(
        &self,
        user_id: &UserId,
        f: &mut dyn FnMut(&mut LedgerTxn<'_>) -> Result<()>,
    ) -> Result<()>;
}

/// Run a value-returning closure through [`Store::transaction`].
///
/// # Errors
///
/// Returns the closure's error, or an error if the commit fails.
pub fn transact<S, T, F>(store: &S, user_id: &UserId, f: F) -> Result<T>
where
    S: Store + ?Sized,
    F: FnOnce(&mut LedgerTxn<'_>) -> Result<T>,
{
    let mut f = Some(f);
    let mut output = None;
    store.transaction(user_id, &mut |txn| {
        let f = f
            .take()
            .ok_or_else(|| StoreError::Database("transaction body ran twice".into()))?;
        output = Some(f(txn)?);
        Ok(())
    })?;
    output.ok_or_else(|| StoreError::Database("transaction body did not run".into()))
}
