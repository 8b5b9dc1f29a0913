//! # Stripe Event Decoding
//!
//! Turns a verified payload into a [`TypedEvent`].
//! Unknown event types decode to [`TypedEvent::Ignored`]; Stripe adds new
//! types over time and an endpoint subscribed to them must keep answering 200.

use crate::signature::VerifiedEvent;
use entitle_core::{DecodeError, Money, TypedEvent};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

const CHECKOUT_COMPLETED: &str = "checkout.session.completed";
const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Events that should be enabled on the Stripe webhook endpoint
pub const REQUIRED_WEBHOOK_EVENTS: &[&str] = &[CHECKOUT_COMPLETED, SUBSCRIPTION_DELETED];

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Map<String, Value>,
}

/// Decode a verified Stripe event
pub fn decode(event: &VerifiedEvent) -> Result<TypedEvent, DecodeError> {
    let envelope: StripeWebhookEvent = serde_json::from_slice(event.payload())
        .map_err(|e| DecodeError::Malformed(e.to_string()))?;

    debug!(event_type = %envelope.event_type, event_id = %envelope.id, "Decoding Stripe event");

    let obj = &envelope.data.object;

    match envelope.event_type.as_str() {
        CHECKOUT_COMPLETED => {
            let correlation_id = string_field(obj, "client_reference_id")
                .ok_or(missing(CHECKOUT_COMPLETED, "client_reference_id"))?;
            let customer_ref =
                expandable_id(obj, "customer").ok_or(missing(CHECKOUT_COMPLETED, "customer"))?;
            let subscription_ref = expandable_id(obj, "subscription")
                .ok_or(missing(CHECKOUT_COMPLETED, "subscription"))?;

            let amount = obj
                .get("amount_total")
                .and_then(Value::as_i64)
                .zip(string_field(obj, "currency"))
                .map(|(total, currency)| Money::new(total, &currency));

            Ok(TypedEvent::ActivationCompleted {
                event_id: envelope.id,
                correlation_id,
                customer_ref,
                subscription_ref,
                amount,
            })
        }

        SUBSCRIPTION_DELETED => {
            let customer_ref =
                expandable_id(obj, "customer").ok_or(missing(SUBSCRIPTION_DELETED, "customer"))?;

            Ok(TypedEvent::SubscriptionCancelled {
                subscription_ref: string_field(obj, "id"),
                event_id: envelope.id,
                customer_ref,
            })
        }

        other => Ok(TypedEvent::Ignored {
            kind: other.to_string(),
            event_id: envelope.id,
        }),
    }
}

fn missing(kind: &'static str, field: &'static str) -> DecodeError {
    DecodeError::MissingField { kind, field }
}

fn string_field(obj: &Map<String, Value>, key: &str) -> Option<String> {
    obj.get(key).and_then(Value::as_str).map(String::from)
}

/// Stripe sends related objects either as an id or, when expanded, as the
/// full object carrying that id.
fn expandable_id(obj: &Map<String, Value>, key: &str) -> Option<String> {
    match obj.get(key)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Object(inner) => string_field(inner, "id").filter(|id| !id.is_empty()),
        _ => None,
    }
}
