//! Mercado Pago notification intake.
//!
//! The gateway sends `payment` events with the reference either in a JSON
//! body or in query parameters, sometimes with no body at all, and it
//! redelivers until it sees a success. Everything that is not a payment
//! event for one of our payments is acknowledged and ignored so
//! business-level outcomes never turn into retry storms; only genuine
//! upstream or persistence failures surface as errors, which are exactly
//! the cases worth redelivering.

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::services::metrics::{record_error, record_webhook_event};
use crate::services::ReconcileError;
use crate::startup::AppState;

use super::SyncResponse;

#[derive(Debug, Default, Deserialize)]
pub struct WebhookParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub topic: Option<String>,
    #[serde(rename = "data.id")]
    pub data_id: Option<String>,
    pub id: Option<String>,
    pub resource: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookBody {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<WebhookBodyData>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookBodyData {
    id: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ignored: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<SyncResponse>,
}

impl WebhookAck {
    fn ignored() -> Self {
        Self {
            ok: true,
            ignored: Some(true),
            result: None,
        }
    }
}

/// Handle a gateway notification.
pub async fn webhook(
    State(state): State<AppState>,
    Query(params): Query<WebhookParams>,
    body: String,
) -> Result<Json<WebhookAck>, AppError> {
    // Notifications arrive with a JSON body, an empty body, or only query
    // parameters; body values take precedence.
    let parsed: WebhookBody = serde_json::from_str(&body).unwrap_or_default();

    let kind = parsed.kind.or(params.kind).or(params.topic);
    let payment_id = parsed
        .data
        .and_then(|d| d.id)
        .map(|id| match id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
        .or(params.data_id)
        .or(params.id)
        .or(params.resource);

    let (kind, payment_id) = match (kind, payment_id) {
        (Some(kind), Some(payment_id)) if kind == "payment" => (kind, payment_id),
        (kind, _) => {
            tracing::debug!(kind = ?kind, "ignoring non-payment notification");
            record_webhook_event("ignored");
            return Ok(Json(WebhookAck::ignored()));
        }
    };

    tracing::info!(kind = %kind, provider_payment_id = %payment_id, "Processing Mercado Pago notification");

    match state.reconciliation.sync_payment(&payment_id, None).await {
        Ok(outcome) => {
            record_webhook_event("processed");
            Ok(Json(WebhookAck {
                ok: true,
                ignored: None,
                result: Some(outcome.into()),
            }))
        }
        // Events for payments outside this system's records are
        // acknowledged so the gateway stops retrying them.
        Err(err @ (ReconcileError::CorrelationMissing | ReconcileError::PaymentNotFound(_))) => {
            tracing::info!(provider_payment_id = %payment_id, reason = %err, "notification ignored");
            record_webhook_event("ignored");
            Ok(Json(WebhookAck::ignored()))
        }
        Err(err) => {
            tracing::error!(provider_payment_id = %payment_id, error = %err, "notification processing failed");
            record_webhook_event("failed");
            record_error("reconciliation", "webhook");
            Err(err.into())
        }
    }
}
