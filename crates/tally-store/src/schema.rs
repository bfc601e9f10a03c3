//! Column families of the `RocksDB` backend.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// User ledgers, keyed by `user_id`.
    pub const LEDGERS: &str = "ledgers";

    /// Provider subscription records, keyed by subscription id.
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Credit purchases, keyed by payment-intent id.
    pub const PURCHASES: &str = "purchases";

    /// Processed provider events, keyed by event id.
    pub const PROCESSED_EVENTS: &str = "processed_events";

    /// Assistant conversations, keyed by `conversation_id`.
    pub const CONVERSATIONS: &str = "conversations";

    /// Generated documents, keyed by `conversation_id || document_id`.
    pub const DOCUMENTS: &str = "documents";

    /// Credit transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::LEDGERS,
        cf::SUBSCRIPTIONS,
        cf::PURCHASES,
        cf::PROCESSED_EVENTS,
        cf::CONVERSATIONS,
        cf::DOCUMENTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
    ]
}
