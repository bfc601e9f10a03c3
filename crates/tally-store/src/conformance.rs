//! Behaviour every backend must share. Each backend's test module calls these.

use std::sync::Arc;

use tally_core::{
    Conversation, ConversationId, CreditDelta, CreditPurchase, DocumentType, GeneratedDocument,
    ProcessedEvent, TransactionType, UserId, UserLedger,
};

use crate::{transact, Store, StoreError};

fn provisioned(store: &dyn Store) -> UserId {
    let user_id = UserId::generate();
    store.create_ledger(&UserLedger::new(user_id)).unwrap();
    user_id
}

fn add(store: &dyn Store, user_id: &UserId, amount: i64, description: &str) -> i64 {
    transact(store, user_id, |txn| {
        txn.apply_credits(
            CreditDelta::add(amount),
            TransactionType::Purchase,
            description,
            serde_json::Value::Null,
        )
    })
    .unwrap()
}

pub fn ledger_lifecycle(store: &dyn Store) {
    let user_id = provisioned(store);

    let err = store.create_ledger(&UserLedger::new(user_id)).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));

    assert_eq!(add(store, &user_id, 50, "first"), 50);
    let balance = transact(store, &user_id, |txn| {
        txn.apply_credits(
            CreditDelta::set(100),
            TransactionType::SubscriptionReset,
            "reset",
            serde_json::Value::Null,
        )
    })
    .unwrap();
    assert_eq!(balance, 100);

    let ledger = store.get_ledger(&user_id).unwrap().unwrap();
    assert_eq!(ledger.credits, 100);
    assert_eq!(ledger.lifetime_purchased, 50);
    assert_eq!(ledger.lifetime_granted, 100);

    let missing = UserId::generate();
    let err = transact(store, &missing, |txn| {
        txn.apply_credits(
            CreditDelta::add(1),
            TransactionType::Purchase,
            "nobody",
            serde_json::Value::Null,
        )
    })
    .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
    assert!(store.get_ledger(&missing).unwrap().is_none());
}

pub fn failed_transaction_writes_nothing(store: &dyn Store) {
    let user_id = provisioned(store);
    add(store, &user_id, 1, "seed");

    let err = transact(store, &user_id, |txn| {
        txn.mark_event_processed(ProcessedEvent::now("evt_fail", "test"))?;
        txn.apply_credits(
            CreditDelta::spend(1),
            TransactionType::Usage,
            "first",
            serde_json::Value::Null,
        )?;
        txn.apply_credits(
            CreditDelta::spend(1),
            TransactionType::Usage,
            "second",
            serde_json::Value::Null,
        )
    })
    .unwrap_err();

    assert!(matches!(
        err,
        StoreError::InsufficientBalance {
            balance: 0,
            requested: -1
        }
    ));
    assert_eq!(store.get_ledger(&user_id).unwrap().unwrap().credits, 1);
    assert!(!store.has_processed_event("evt_fail").unwrap());
    assert_eq!(
        store
            .list_transactions_by_user(&user_id, 10, 0)
            .unwrap()
            .len(),
        1
    );
}

pub fn transactions_are_listed_newest_first(store: &dyn Store) {
    let user_id = provisioned(store);
    let other = provisioned(store);

    add(store, &user_id, 10, "Purchase 1");
    std::thread::sleep(std::time::Duration::from_millis(2));
    add(store, &other, 10, "Other user");
    std::thread::sleep(std::time::Duration::from_millis(2));
    add(store, &user_id, 20, "Purchase 2");

    let transactions = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
    assert_eq!(transactions.len(), 2);
    assert_eq!(transactions[0].description, "Purchase 2");
    assert_eq!(transactions[0].balance_after, 30);
    assert_eq!(transactions[1].description, "Purchase 1");

    let page2 = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
    assert_eq!(page2.len(), 1);
    assert_eq!(page2[0].description, "Purchase 1");
}

pub fn event_markers_are_written_once(store: &dyn Store) {
    assert!(store
        .mark_event_processed(&ProcessedEvent::now("evt_orphan", "checkout.session.completed"))
        .unwrap());
    assert!(!store
        .mark_event_processed(&ProcessedEvent::now("evt_orphan", "checkout.session.completed"))
        .unwrap());

    let user_id = provisioned(store);
    transact(store, &user_id, |txn| {
        txn.mark_event_processed(ProcessedEvent::now("evt_1", "customer.subscription.updated"))
    })
    .unwrap();
    let err = transact(store, &user_id, |txn| {
        txn.mark_event_processed(ProcessedEvent::now("evt_1", "customer.subscription.updated"))
    })
    .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateEvent { .. }));

    let marker = store.get_processed_event("evt_1").unwrap().unwrap();
    assert_eq!(marker.event_type, "customer.subscription.updated");
}

pub fn purchases_are_unique_per_payment_intent(store: &dyn Store) {
    let user_id = provisioned(store);
    transact(store, &user_id, |txn| {
        txn.put_purchase(CreditPurchase::completed(user_id, "pi_1", 50, 500))
    })
    .unwrap();

    let err = transact(store, &user_id, |txn| {
        assert!(txn.purchase_exists("pi_1")?);
        txn.put_purchase(CreditPurchase::completed(user_id, "pi_1", 50, 500))
    })
    .unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists { .. }));

    let stored = store.get_purchase_by_payment_intent("pi_1").unwrap().unwrap();
    assert_eq!(stored.credits_amount, 50);
}

pub fn conversations_and_documents(store: &dyn Store) {
    let user_id = provisioned(store);
    let conversation_id = ConversationId::generate();

    transact(store, &user_id, |txn| {
        assert!(txn.conversation(&conversation_id)?.is_none());
        let mut conversation = Conversation::start(conversation_id, user_id, "hello");
        conversation.push_exchange("hello", "hi there");
        txn.put_conversation(conversation);
        assert!(txn.conversation(&conversation_id)?.is_some());
        Ok(())
    })
    .unwrap();

    let conversation = store.get_conversation(&conversation_id).unwrap().unwrap();
    assert_eq!(conversation.messages.len(), 2);
    assert_eq!(conversation.credits_used, 1);

    let document = GeneratedDocument::from_reply(
        user_id,
        conversation_id,
        DocumentType::Invoice,
        "invoice for client",
    );
    store.put_document(&document).unwrap();
    let documents = store
        .list_documents_by_conversation(&conversation_id)
        .unwrap();
    assert_eq!(documents, vec![document]);
    assert!(store
        .list_documents_by_conversation(&ConversationId::generate())
        .unwrap()
        .is_empty());
}

pub fn concurrent_spends_never_go_negative<S: Store + 'static>(store: Arc<S>) {
    let user_id = provisioned(store.as_ref());
    add(store.as_ref(), &user_id, 25, "seed");

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                (0..10)
                    .filter(|_| {
                        transact(store.as_ref(), &user_id, |txn| {
                            txn.apply_credits(
                                CreditDelta::spend(1),
                                TransactionType::Usage,
                                "spend",
                                serde_json::Value::Null,
                            )
                        })
                        .is_ok()
                    })
                    .count()
            })
        })
        .collect();

    let succeeded: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
    let ledger = store.get_ledger(&user_id).unwrap().unwrap();
    assert_eq!(succeeded, 25);
    assert_eq!(ledger.credits, 0);
    assert_eq!(ledger.lifetime_used, 25);
}
