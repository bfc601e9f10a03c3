//! Key encoding for the `RocksDB` column families.

use tally_core::{ConversationId, DocumentId, TransactionId, UserId};

use crate::error::{Result, StoreError};

/// Ledger key: the 16 user id bytes.
#[must_use]
pub fn ledger_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Subscription key: the provider subscription id.
#[must_use]
pub fn subscription_key(subscription_id: &str) -> Vec<u8> {
    subscription_id.as_bytes().to_vec()
}

/// Purchase key: the provider payment-intent id.
#[must_use]
pub fn purchase_key(payment_intent_id: &str) -> Vec<u8> {
    payment_intent_id.as_bytes().to_vec()
}

/// Processed-event key: the provider event id.
#[must_use]
pub fn event_key(event_id: &str) -> Vec<u8> {
    event_id.as_bytes().to_vec()
}

/// Lock key for standalone event markers.
#[must_use]
pub fn event_lock_key(event_id: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(4 + event_id.len());
    key.extend_from_slice(b"evt:");
    key.extend_from_slice(event_id.as_bytes());
    key
}

/// Conversation key: the 16 conversation id bytes.
#[must_use]
pub fn conversation_key(conversation_id: &ConversationId) -> Vec<u8> {
    conversation_id.as_bytes().to_vec()
}

/// Document key.
///
/// Format: `conversation_id (16 bytes) || document_id (16 bytes)`
#[must_use]
pub fn document_key(conversation_id: &ConversationId, document_id: &DocumentId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(conversation_id.as_bytes());
    key.extend_from_slice(document_id.as_bytes());
    key
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
///
/// Since ULIDs are time-ordered, transactions for a user will be sorted by time.
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Extract the transaction ID from a user-transaction index key.
///
/// # Errors
///
/// Returns `StoreError::Database` if the key is not 32 bytes long.
pub fn transaction_id_from_user_key(key: &[u8]) -> Result<TransactionId> {
    let bytes: [u8; 16] = key
        .get(16..32)
        .and_then(|tail| tail.try_into().ok())
        .ok_or_else(|| StoreError::Database(format!("malformed index key of {} bytes", key.len())))?;
    Ok(TransactionId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_transaction_key_format() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(transaction_id_from_user_key(&key).unwrap(), tx_id);
    }

    #[test]
    fn short_index_key_is_an_error() {
        assert!(transaction_id_from_user_key(&[0_u8; 20]).is_err());
    }

    #[test]
    fn document_keys_group_by_conversation() {
        let conversation_id = ConversationId::generate();
        let key = document_key(&conversation_id, &DocumentId::generate());
        assert!(key.starts_with(&conversation_key(&conversation_id)));
    }
}
