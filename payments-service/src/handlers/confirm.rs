//! User-initiated payment confirmation.
//!
//! After checkout the gateway redirects the user back before its
//! asynchronous notification necessarily lands; this endpoint lets the
//! client force a reconciliation right away. It may race the webhook for
//! the same payment, which is why the grant itself is idempotent.

use axum::extract::State;
use axum::Json;
use serde::Deserialize;
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::startup::AppState;

use super::SyncResponse;

#[derive(Debug, Deserialize, Validate)]
pub struct ConfirmPaymentRequest {
    /// Provider payment id from the checkout redirect.
    #[serde(rename = "paymentId")]
    #[validate(length(min = 1))]
    pub payment_id: String,
}

/// Reconcile a payment on behalf of its owner.
///
/// Unlike the webhook path, unknown references surface as 404 and a
/// payment owned by someone else as 403 — the caller needs to know their
/// confirmation did not match.
pub async fn confirm_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<ConfirmPaymentRequest>,
) -> Result<Json<SyncResponse>, AppError> {
    payload.validate()?;

    let payment_id = payload.payment_id.trim();
    if payment_id.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Missing paymentId")));
    }

    tracing::info!(
        user_id = %user.user_id,
        provider_payment_id = %payment_id,
        "Confirming payment"
    );

    let outcome = state
        .reconciliation
        .sync_payment(payment_id, Some(user.user_id))
        .await?;

    Ok(Json(outcome.into()))
}
