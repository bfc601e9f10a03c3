//! Credit transaction engine.
//!
//! The only writer of ledger balances. Every change runs inside the store's
//! per-user transaction, so a balance is read, checked and written without
//! any other change to the same user interleaving.

use std::sync::Arc;

use tally_core::{CreditDelta, TransactionType, UserId};
use tally_store::{transact, LedgerTxn, Result, Store};

/// Applies balance changes through the store's transactional entry point.
#[derive(Clone)]
pub struct CreditEngine {
    store: Arc<dyn Store>,
}

impl CreditEngine {
    /// Create an engine over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Apply a single balance change and return the new balance.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the user has no ledger.
    /// - `StoreError::InsufficientBalance` if an add would go below zero;
    ///   nothing is written in that case.
    pub fn apply_delta(
        &self,
        user_id: &UserId,
        delta: CreditDelta,
        transaction_type: TransactionType,
        description: &str,
    ) -> Result<i64> {
        let balance = self.atomically(user_id, |txn| {
            txn.apply_credits(delta, transaction_type, description, serde_json::Value::Null)
        })?;

        tracing::debug!(
            user_id = %user_id,
            mode = ?delta.mode,
            amount = delta.amount,
            balance,
            "Credit delta applied"
        );
        Ok(balance)
    }

    /// Run a composite unit of work on `user_id`'s ledger.
    ///
    /// Everything staged in `f` commits together, or not at all.
    ///
    /// # Errors
    ///
    /// Returns the closure's error, or an error if the commit fails.
    pub fn atomically<T>(
        &self,
        user_id: &UserId,
        f: impl FnOnce(&mut LedgerTxn<'_>) -> Result<T>,
    ) -> Result<T> {
        transact(self.store.as_ref(), user_id, f)
    }
}
