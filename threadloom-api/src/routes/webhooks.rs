//! Payment provider webhook.
//!
//! A verified paid order or subscription payment grants premium access to
//! the identity carried in the checkout's custom data. The provider's
//! object id is the grant id, so redeliveries are absorbed as duplicates.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use threadloom_core::{Identity, Timestamp};
use threadloom_governance::GrantOutcome;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use crate::telemetry::with_metrics;

/// Header carrying the hex HMAC-SHA256 of the raw body.
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Events that represent a completed payment.
const GRANTING_EVENTS: &[&str] = &["order_created", "subscription_payment_success"];

const PAID_STATUS: &str = "paid";

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentWebhook {
    pub event: String,
    pub data: PaymentData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentData {
    pub id: String,
    pub attributes: PaymentAttributes,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentAttributes {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub custom_data: Option<CustomData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomData {
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookAction {
    Granted,
    Duplicate,
    Ignored,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub action: WebhookAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<Timestamp>,
}

impl WebhookAck {
    fn new(action: WebhookAction, expires_at: Option<Timestamp>) -> Self {
        Self {
            received: true,
            action,
            expires_at,
        }
    }
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/v1/webhooks/payment
pub async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let secret = state
        .config
        .webhook_secret
        .as_deref()
        .ok_or_else(|| ApiError::service_unavailable("Payment webhook is not configured"))?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized("Missing webhook signature"))?;

    if !verify_webhook_signature(&body, signature, secret) {
        tracing::warn!("Rejected payment webhook with invalid signature");
        return Err(ApiError::invalid_signature());
    }

    let webhook: PaymentWebhook = serde_json::from_slice(&body)
        .map_err(|e| ApiError::invalid_input(format!("Invalid webhook payload: {}", e)))?;

    tracing::info!(event = %webhook.event, id = %webhook.data.id, "Received payment webhook");

    if !is_paid_event(&webhook) {
        tracing::debug!(event = %webhook.event, "Ignoring webhook event");
        return Ok(Json(WebhookAck::new(WebhookAction::Ignored, None)));
    }

    let identity = webhook
        .data
        .attributes
        .custom_data
        .as_ref()
        .and_then(|c| c.identity.as_deref())
        .ok_or_else(|| ApiError::missing_field("data.attributes.custom_data.identity"))
        .and_then(|raw| Identity::new(raw).map_err(ApiError::from))?;

    let duration = state.facade.config().entitlement_duration;
    match state.facade.grant(&identity, &webhook.data.id, duration).await {
        Ok(GrantOutcome::Applied { expires_at }) => {
            with_metrics(|m| m.record_grant("applied"));
            Ok(Json(WebhookAck::new(WebhookAction::Granted, Some(expires_at))))
        }
        Ok(GrantOutcome::Duplicate) => {
            with_metrics(|m| m.record_grant("duplicate"));
            Ok(Json(WebhookAck::new(WebhookAction::Duplicate, None)))
        }
        Err(e) => {
            with_metrics(|m| m.record_grant("failed"));
            Err(e.into())
        }
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn is_paid_event(webhook: &PaymentWebhook) -> bool {
    GRANTING_EVENTS.contains(&webhook.event.as_str())
        && webhook.data.attributes.status.as_deref() == Some(PAID_STATUS)
}

/// Verify a hex HMAC-SHA256 signature over `payload`.
///
/// The comparison runs in constant time.
pub fn verify_webhook_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    type HmacSha256 = Hmac<Sha256>;

    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };

    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router() -> Router<AppState> {
    Router::new().route("/webhooks/payment", post(handle_payment_webhook))
}
