//! Billing webhook integration tests.

mod common;

use chrono::Utc;
use serde_json::json;

use common::{
    credit_checkout, event, subscription_checkout, subscription_object, TestHarness,
};
use tally_core::{PricingTable, ProviderSubscriptionStatus, RenewalPolicy, SubscriptionStatus, UserId};
use tally_service::stripe::sign_payload;
use tally_store::StoreRead;

// ============================================================================
// Signatures
// ============================================================================

#[tokio::test]
async fn bad_signature_is_rejected_without_effects() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(0);
    let payload = credit_checkout("evt_forged", &user_id, "pi_forged", 500).to_string();
    let forged = sign_payload(payload.as_bytes(), "whsec_wrong", Utc::now().timestamp());

    let response = harness.deliver_raw(payload, Some(forged)).await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "authentication_failed");
    assert_eq!(harness.credits(&user_id), 0);
    assert!(!harness.store.has_processed_event("evt_forged").unwrap());
}

#[tokio::test]
async fn missing_signature_is_rejected() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(0);
    let payload = credit_checkout("evt_unsigned", &user_id, "pi_unsigned", 500).to_string();

    harness
        .deliver_raw(payload, None)
        .await
        .assert_status_bad_request();
    assert_eq!(harness.credits(&user_id), 0);
}

#[tokio::test]
async fn stale_signature_is_rejected() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(0);
    let payload = credit_checkout("evt_old", &user_id, "pi_old", 500).to_string();
    let old = sign_payload(payload.as_bytes(), common::WEBHOOK_SECRET, Utc::now().timestamp() - 3600);

    harness
        .deliver_raw(payload, Some(old))
        .await
        .assert_status_bad_request();
    assert!(!harness.store.has_processed_event("evt_old").unwrap());
}

// ============================================================================
// Credit purchases
// ============================================================================

#[tokio::test]
async fn credit_purchase_adds_credits() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(3);

    let response = harness
        .deliver(&credit_checkout("evt_buy", &user_id, "pi_1", 500))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body, json!({ "received": true }));

    let ledger = harness.ledger(&user_id);
    assert_eq!(ledger.credits, 53);
    assert_eq!(ledger.lifetime_purchased, 50);
    assert!(harness.store.get_purchase_by_payment_intent("pi_1").unwrap().is_some());
}

#[tokio::test]
async fn replayed_event_is_applied_once() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(0);
    let event = credit_checkout("evt_replay", &user_id, "pi_replay", 1000);

    for _ in 0..5 {
        harness.deliver(&event).await.assert_status_ok();
    }

    assert_eq!(harness.credits(&user_id), 100);
    let transactions = harness
        .store
        .list_transactions_by_user(&user_id, 50, 0)
        .unwrap();
    assert_eq!(transactions.len(), 1);
}

#[tokio::test]
async fn same_payment_intent_under_new_event_id_is_not_double_counted() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(0);

    harness
        .deliver(&credit_checkout("evt_a", &user_id, "pi_shared", 500))
        .await
        .assert_status_ok();
    harness
        .deliver(&credit_checkout("evt_b", &user_id, "pi_shared", 500))
        .await
        .assert_status_ok();

    assert_eq!(harness.credits(&user_id), 50);
    assert!(harness.store.has_processed_event("evt_b").unwrap());
}

#[tokio::test]
async fn purchases_commute() {
    let first = TestHarness::new().await;
    let user_a = first.provision(7);
    first
        .deliver(&credit_checkout("evt_5", &user_a, "pi_5", 500))
        .await
        .assert_status_ok();
    first
        .deliver(&credit_checkout("evt_10", &user_a, "pi_10", 1000))
        .await
        .assert_status_ok();

    let second = TestHarness::new().await;
    let user_b = second.provision(7);
    second
        .deliver(&credit_checkout("evt_10", &user_b, "pi_10", 1000))
        .await
        .assert_status_ok();
    second
        .deliver(&credit_checkout("evt_5", &user_b, "pi_5", 500))
        .await
        .assert_status_ok();

    assert_eq!(first.credits(&user_a), 157);
    assert_eq!(second.credits(&user_b), 157);
}

#[tokio::test]
async fn purchase_for_unknown_user_provisions_a_ledger() {
    let harness = TestHarness::new().await;
    let user_id = UserId::generate();

    harness
        .deliver(&credit_checkout("evt_new", &user_id, "pi_new", 200))
        .await
        .assert_status_ok();

    assert_eq!(harness.credits(&user_id), 20);
}

#[tokio::test]
async fn credit_checkout_without_positive_amount_is_skipped() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(3);

    harness
        .deliver(&event(
            "evt_noamount",
            "checkout.session.completed",
            Utc::now().timestamp(),
            json!({
                "id": "cs_noamount",
                "mode": "payment",
                "payment_intent": "pi_noamount",
                "metadata": { "user_id": user_id.to_string(), "type": "credits" }
            }),
        ))
        .await
        .assert_status_ok();
    harness
        .deliver(&credit_checkout("evt_zero", &user_id, "pi_zero", 0))
        .await
        .assert_status_ok();

    assert!(harness.store.has_processed_event("evt_noamount").unwrap());
    assert!(harness.store.has_processed_event("evt_zero").unwrap());
    assert!(harness
        .store
        .get_purchase_by_payment_intent("pi_noamount")
        .unwrap()
        .is_none());
    assert!(harness
        .store
        .get_purchase_by_payment_intent("pi_zero")
        .unwrap()
        .is_none());
    assert_eq!(harness.credits(&user_id), 3);
    assert!(harness
        .store
        .list_transactions_by_user(&user_id, 10, 0)
        .unwrap()
        .is_empty());
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn subscription_checkout_resets_to_allotment() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(37);
    harness
        .mock_subscription(subscription_object("sub_1", &user_id, "active", "price_basic"))
        .await;

    harness
        .deliver(&subscription_checkout("evt_sub", &user_id, "sub_1"))
        .await
        .assert_status_ok();

    let ledger = harness.ledger(&user_id);
    assert_eq!(ledger.credits, 100);
    assert_eq!(ledger.subscription_status, SubscriptionStatus::Active);
    assert_eq!(ledger.subscription_id.as_deref(), Some("sub_1"));

    let record = harness.store.get_subscription("sub_1").unwrap().unwrap();
    assert_eq!(record.user_id, user_id);
    assert_eq!(record.status, ProviderSubscriptionStatus::Active);
    assert_eq!(record.price_id.as_deref(), Some("price_basic"));
}

#[tokio::test]
async fn carry_over_policy_adds_plan_allotment() {
    let mut pricing = PricingTable::default().with_plan("price_pro", 500);
    pricing.renewal = RenewalPolicy::CarryOver;
    let harness = TestHarness::with_pricing(pricing).await;
    let user_id = harness.provision(20);
    harness
        .mock_subscription(subscription_object("sub_pro", &user_id, "active", "price_pro"))
        .await;

    harness
        .deliver(&subscription_checkout("evt_pro", &user_id, "sub_pro"))
        .await
        .assert_status_ok();

    assert_eq!(harness.credits(&user_id), 520);
}

#[tokio::test]
async fn provider_outage_is_retryable() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(5);

    // No subscription mock mounted: Stripe answers 404.
    let response = harness
        .deliver(&subscription_checkout("evt_outage", &user_id, "sub_missing"))
        .await;

    assert!(response.status_code().is_server_error());
    assert_eq!(harness.credits(&user_id), 5);
    assert!(!harness.store.has_processed_event("evt_outage").unwrap());
}

#[tokio::test]
async fn stale_subscription_update_is_ignored() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(0);
    let now = Utc::now().timestamp();

    harness
        .deliver(&event(
            "evt_newer",
            "customer.subscription.updated",
            now,
            subscription_object("sub_2", &user_id, "past_due", "price_basic"),
        ))
        .await
        .assert_status_ok();
    harness
        .deliver(&event(
            "evt_older",
            "customer.subscription.updated",
            now - 60,
            subscription_object("sub_2", &user_id, "active", "price_basic"),
        ))
        .await
        .assert_status_ok();

    let record = harness.store.get_subscription("sub_2").unwrap().unwrap();
    assert_eq!(record.status, ProviderSubscriptionStatus::PastDue);
    assert_eq!(
        harness.ledger(&user_id).subscription_status,
        SubscriptionStatus::Inactive
    );
    assert!(harness.store.has_processed_event("evt_older").unwrap());
}

#[tokio::test]
async fn subscription_deletion_detaches_the_ledger() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(0);
    harness
        .mock_subscription(subscription_object("sub_3", &user_id, "active", "price_basic"))
        .await;
    harness
        .deliver(&subscription_checkout("evt_start", &user_id, "sub_3"))
        .await
        .assert_status_ok();

    harness
        .deliver(&event(
            "evt_end",
            "customer.subscription.deleted",
            Utc::now().timestamp(),
            subscription_object("sub_3", &user_id, "canceled", "price_basic"),
        ))
        .await
        .assert_status_ok();

    let ledger = harness.ledger(&user_id);
    assert_eq!(ledger.subscription_status, SubscriptionStatus::Inactive);
    assert_eq!(ledger.subscription_id, None);
    assert_eq!(ledger.credits, 100);

    let record = harness.store.get_subscription("sub_3").unwrap().unwrap();
    assert_eq!(record.status, ProviderSubscriptionStatus::Canceled);
}

// ============================================================================
// Acknowledged without effects
// ============================================================================

#[tokio::test]
async fn unknown_event_kind_is_acknowledged() {
    let harness = TestHarness::new().await;
    let user_id = harness.provision(9);

    let response = harness
        .deliver(&event(
            "evt_invoice",
            "invoice.paid",
            Utc::now().timestamp(),
            json!({ "id": "in_1", "metadata": { "user_id": user_id.to_string() } }),
        ))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["received"], true);
    assert_eq!(harness.credits(&user_id), 9);
    assert!(harness
        .store
        .list_transactions_by_user(&user_id, 10, 0)
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn checkout_without_user_is_acknowledged_and_recorded() {
    let harness = TestHarness::new().await;

    harness
        .deliver(&event(
            "evt_orphan",
            "checkout.session.completed",
            Utc::now().timestamp(),
            json!({
                "id": "cs_orphan",
                "mode": "payment",
                "amount_total": 500,
                "payment_intent": "pi_orphan",
                "metadata": { "type": "credits" }
            }),
        ))
        .await
        .assert_status_ok();

    assert!(harness.store.has_processed_event("evt_orphan").unwrap());
    assert!(harness
        .store
        .get_purchase_by_payment_intent("pi_orphan")
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn malformed_verified_body_is_acknowledged() {
    let harness = TestHarness::new().await;
    let body = json!({
        "id": "evt_bad",
        "type": "checkout.session.completed",
        "data": { "object": { "amount_total": "lots" } }
    });

    harness.deliver(&body).await.assert_status_ok();
}
