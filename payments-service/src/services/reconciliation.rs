//! Payment reconciliation: bring a local payment in line with gateway
//! truth and grant the purchased entitlement at most once.
//!
//! Both entry points (gateway notification and user confirmation) funnel
//! into [`ReconciliationService::sync_payment`]; they may run concurrently
//! for the same payment, and the gateway redelivers notifications, so the
//! grant is gated by the store's conditional write on `processed_at`.

use std::sync::Arc;

use chrono::Utc;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::models::PaymentStatus;
use crate::services::mercadopago::{GatewayError, GatewayPayment, PaymentGateway};
use crate::services::metrics::{record_entitlement_granted, record_payment_synced};
use crate::services::store::{GatewaySync, GrantOutcome, PaymentStore};

/// Provider tag stamped on payment rows.
pub const PROVIDER: &str = "mercadopago";

#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The gateway payment carries no usable local reference.
    #[error("gateway payment carries no local payment reference")]
    CorrelationMissing,

    /// The reference does not match any payment this system created. The
    /// gateway account may be shared with other integrations, so this is
    /// expected traffic, not corruption.
    #[error("no local payment matches reference '{0}'")]
    PaymentNotFound(String),

    /// The payment exists but belongs to a different user.
    #[error("payment belongs to a different user")]
    Forbidden,

    #[error("gateway fetch failed: {0}")]
    Upstream(#[from] GatewayError),

    #[error(transparent)]
    Persistence(#[from] AppError),
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::CorrelationMissing => {
                AppError::NotFound(anyhow::anyhow!("Payment reference not recognized"))
            }
            ReconcileError::PaymentNotFound(reference) => {
                AppError::NotFound(anyhow::anyhow!("No payment matches '{}'", reference))
            }
            ReconcileError::Forbidden => {
                AppError::Forbidden(anyhow::anyhow!("Payment belongs to a different user"))
            }
            ReconcileError::Upstream(err) => err.into(),
            ReconcileError::Persistence(err) => err,
        }
    }
}

/// What a successful sync did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// First observed approval: credits added, subscription rotated.
    Granted { classes_added: i32 },
    /// Approval seen again after the grant already ran; surface fields
    /// were refreshed, nothing else changed.
    AlreadyProcessed,
    /// Non-approved status recorded; no entitlement side effects.
    StatusRecorded(PaymentStatus),
}

impl SyncOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            SyncOutcome::Granted { .. } | SyncOutcome::AlreadyProcessed => PaymentStatus::Approved,
            SyncOutcome::StatusRecorded(status) => *status,
        }
    }
}

/// Extract the local payment id echoed back by the gateway: the
/// `external_reference` set at checkout wins, the metadata copy is the
/// fallback. Whitespace-only values do not count.
fn local_reference(payment: &GatewayPayment) -> Option<String> {
    if let Some(reference) = payment.external_reference.as_deref() {
        let trimmed = reference.trim();
        if !trimmed.is_empty() {
            return Some(trimmed.to_string());
        }
    }

    payment
        .metadata
        .as_ref()
        .and_then(|m| m.local_payment_id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct ReconciliationService {
    store: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl ReconciliationService {
    pub fn new(store: Arc<dyn PaymentStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Fetch authoritative status for `provider_payment_id` and apply it to
    /// the matching local payment.
    ///
    /// `expected_owner` is set on the user-confirmation path; a payment
    /// owned by anyone else is rejected before any state changes.
    #[tracing::instrument(skip(self), fields(provider_payment_id = %provider_payment_id))]
    pub async fn sync_payment(
        &self,
        provider_payment_id: &str,
        expected_owner: Option<Uuid>,
    ) -> Result<SyncOutcome, ReconcileError> {
        let gateway_payment = self.gateway.fetch_payment(provider_payment_id).await?;

        let reference =
            local_reference(&gateway_payment).ok_or(ReconcileError::CorrelationMissing)?;
        let payment_id = Uuid::parse_str(&reference)
            .map_err(|_| ReconcileError::PaymentNotFound(reference.clone()))?;
        let payment = self
            .store
            .payment_by_id(payment_id)
            .await?
            .ok_or_else(|| ReconcileError::PaymentNotFound(reference.clone()))?;

        if let Some(owner) = expected_owner {
            if payment.user_id != owner {
                tracing::warn!(
                    payment_id = %payment.id,
                    "confirmation rejected: caller does not own this payment"
                );
                return Err(ReconcileError::Forbidden);
            }
        }

        let status = PaymentStatus::from_gateway(&gateway_payment.status);
        let sync = GatewaySync {
            provider: PROVIDER.to_string(),
            provider_payment_id: gateway_payment.id.clone(),
            payment_method: gateway_payment.payment_method_id.clone(),
            status_detail: gateway_payment.status_detail.clone(),
        };

        if status != PaymentStatus::Approved {
            self.store
                .record_gateway_sync(payment.id, status, &sync)
                .await?;
            record_payment_synced(status.as_str());
            return Ok(SyncOutcome::StatusRecorded(status));
        }

        // The conditional write on processed_at decides who grants; a prior
        // read of the field is never the gate.
        match self
            .store
            .grant_entitlement(&payment, &sync, Utc::now())
            .await?
        {
            GrantOutcome::Granted { classes_added } => {
                record_entitlement_granted(&payment.plan_id);
                record_payment_synced(PaymentStatus::Approved.as_str());
                tracing::info!(
                    payment_id = %payment.id,
                    user_id = %payment.user_id,
                    plan_id = %payment.plan_id,
                    classes_added,
                    "entitlement granted"
                );
                Ok(SyncOutcome::Granted { classes_added })
            }
            GrantOutcome::AlreadyProcessed => {
                // Keep method/detail/provider ids fresh for observability.
                self.store
                    .record_gateway_sync(payment.id, PaymentStatus::Approved, &sync)
                    .await?;
                record_payment_synced(PaymentStatus::Approved.as_str());
                tracing::debug!(
                    payment_id = %payment.id,
                    "duplicate approval observed; entitlement already granted"
                );
                Ok(SyncOutcome::AlreadyProcessed)
            }
        }
    }
}
