//! Stripe webhook signatures and event parsing.
//!
//! The `stripe-signature` header has the form `t=<unix>,v1=<hex>[,v1=<hex>...]`.
//! The expected signature is `hex(HMAC-SHA256(secret, "<t>." || raw body))`.
//! Verification always runs over the raw bytes, before any parsing.

use chrono::{DateTime, Utc};

use super::types::{CheckoutSession, Subscription, WebhookEvent};
use crate::crypto::{constant_time_eq, hmac_sha256_hex};

/// Signature verification failures. All of them reject the delivery.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// No signing secret is configured.
    #[error("webhook signing secret not configured")]
    MissingSecret,

    /// The request has no signature header.
    #[error("missing stripe-signature header")]
    MissingHeader,

    /// The header has no timestamp or no `v1` signature.
    #[error("malformed stripe-signature header")]
    MalformedHeader,

    /// The timestamp is outside the accepted window.
    #[error("signature timestamp outside tolerance")]
    TimestampOutOfTolerance,

    /// No `v1` signature matches.
    #[error("webhook signature mismatch")]
    Mismatch,
}

/// Verify a delivery against `secret`.
///
/// `now` is the current Unix time; `tolerance_secs` bounds the distance
/// between `now` and the signed timestamp in either direction.
///
/// # Errors
///
/// Returns the first [`SignatureError`] that applies.
pub fn verify_signature(
    payload: &[u8],
    header: Option<&str>,
    secret: Option<&str>,
    tolerance_secs: u64,
    now: i64,
) -> Result<(), SignatureError> {
    let secret = secret
        .filter(|s| !s.is_empty())
        .ok_or(SignatureError::MissingSecret)?;
    let header = header.ok_or(SignatureError::MissingHeader)?;

    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", ts)) => timestamp = Some(ts),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    let signed_at: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::MalformedHeader)?;
    if signatures.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }

    if now.abs_diff(signed_at) > tolerance_secs {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    let expected = hmac_sha256_hex(
        secret.as_bytes(),
        &[timestamp.as_bytes(), b".", payload],
    );

    if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}

/// Build a valid `stripe-signature` header for `payload`.
///
/// Used by tests and local tooling that replay events.
#[must_use]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let ts = timestamp.to_string();
    let signature = hmac_sha256_hex(secret.as_bytes(), &[ts.as_bytes(), b".", payload]);
    format!("t={ts},v1={signature}")
}

/// The event kinds this service acts on.
#[derive(Debug, Clone)]
pub enum BillingEvent {
    /// `checkout.session.completed`
    CheckoutCompleted(CheckoutSession),
    /// `customer.subscription.updated`
    SubscriptionUpdated(Subscription),
    /// `customer.subscription.deleted`
    SubscriptionDeleted(Subscription),
    /// Anything else. Acknowledged without effects.
    Unrecognized {
        /// Provider event type.
        event_type: String,
    },
}

/// A verified, parsed event with its envelope fields.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// Provider event id, the idempotency key.
    pub id: String,
    /// Provider event type.
    pub event_type: String,
    /// Provider creation time.
    pub created: Option<DateTime<Utc>>,
    /// The typed payload.
    pub event: BillingEvent,
}

impl EventEnvelope {
    /// Parse a verified payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the envelope or a recognised object is malformed.
    pub fn parse(payload: &[u8]) -> Result<Self, serde_json::Error> {
        let raw: WebhookEvent = serde_json::from_slice(payload)?;
        let object = raw.data.object;

        let event = match raw.event_type.as_str() {
            "checkout.session.completed" => {
                BillingEvent::CheckoutCompleted(serde_json::from_value(object)?)
            }
            "customer.subscription.updated" => {
                BillingEvent::SubscriptionUpdated(serde_json::from_value(object)?)
            }
            "customer.subscription.deleted" => {
                BillingEvent::SubscriptionDeleted(serde_json::from_value(object)?)
            }
            other => BillingEvent::Unrecognized {
                event_type: other.to_string(),
            },
        };

        Ok(Self {
            id: raw.id,
            event_type: raw.event_type,
            created: raw.created.and_then(|t| DateTime::from_timestamp(t, 0)),
            event,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test";
    const NOW: i64 = 1_700_000_000;

    #[test]
    fn valid_signature_is_accepted() {
        let body = br#"{"id":"evt_1"}"#;
        let header = sign_payload(body, SECRET, NOW);
        assert_eq!(
            verify_signature(body, Some(&header), Some(SECRET), 300, NOW + 10),
            Ok(())
        );
    }

    #[test]
    fn any_matching_v1_is_enough() {
        let body = b"{}";
        let good = sign_payload(body, SECRET, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={NOW},v1=deadbeef,v1={good_sig}");
        assert!(verify_signature(body, Some(&header), Some(SECRET), 300, NOW).is_ok());
    }

    #[test]
    fn tampered_body_is_rejected() {
        let header = sign_payload(b"{\"amount\":1}", SECRET, NOW);
        assert_eq!(
            verify_signature(b"{\"amount\":9}", Some(&header), Some(SECRET), 300, NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let header = sign_payload(b"{}", SECRET, NOW);
        assert_eq!(
            verify_signature(b"{}", Some(&header), Some(SECRET), 300, NOW + 301),
            Err(SignatureError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn missing_pieces_are_rejected() {
        assert_eq!(
            verify_signature(b"{}", Some("t=1,v1=aa"), None, 300, NOW),
            Err(SignatureError::MissingSecret)
        );
        assert_eq!(
            verify_signature(b"{}", None, Some(SECRET), 300, NOW),
            Err(SignatureError::MissingHeader)
        );
        assert_eq!(
            verify_signature(b"{}", Some("v1=aa"), Some(SECRET), 300, NOW),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verify_signature(b"{}", Some(&format!("t={NOW}")), Some(SECRET), 300, NOW),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn events_parse_into_variants() {
        let body = json!({
            "id": "evt_1",
            "type": "customer.subscription.deleted",
            "created": NOW,
            "data": {"object": {"id": "sub_1", "status": "canceled"}}
        });
        let envelope = EventEnvelope::parse(body.to_string().as_bytes()).unwrap();
        assert_eq!(envelope.id, "evt_1");
        assert_eq!(envelope.created.unwrap().timestamp(), NOW);
        assert!(matches!(envelope.event, BillingEvent::SubscriptionDeleted(ref s) if s.id == "sub_1"));

        let body = json!({
            "id": "evt_2",
            "type": "invoice.paid",
            "data": {"object": {}}
        });
        let envelope = EventEnvelope::parse(body.to_string().as_bytes()).unwrap();
        assert!(matches!(
            envelope.event,
            BillingEvent::Unrecognized { ref event_type } if event_type == "invoice.paid"
        ));
    }

    #[test]
    fn malformed_recognised_object_is_an_error() {
        let body = json!({
            "id": "evt_3",
            "type": "checkout.session.completed",
            "data": {"object": {"no_id": true}}
        });
        assert!(EventEnvelope::parse(body.to_string().as_bytes()).is_err());
    }
}
