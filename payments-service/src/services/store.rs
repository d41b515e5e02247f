//! Store seam for the reconciliation and checkout flows.
//!
//! The reconciliation service takes this handle as a constructor parameter
//! instead of reaching for an ambient database client, which is also what
//! lets the flows run against an in-memory store in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

use crate::models::{CreatePayment, Payment, PaymentStatus, Plan, Profile};

/// Gateway-side facts recorded on the local payment whenever it is synced.
#[derive(Debug, Clone)]
pub struct GatewaySync {
    pub provider: String,
    pub provider_payment_id: String,
    pub payment_method: Option<String>,
    pub status_detail: Option<String>,
}

/// Result of an entitlement grant attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// This call won the `processed_at` gate and applied the full grant.
    Granted { classes_added: i32 },
    /// The payment had already been processed; nothing was granted.
    AlreadyProcessed,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn health_check(&self) -> Result<(), AppError>;

    async fn payment_by_id(&self, id: Uuid) -> Result<Option<Payment>, AppError>;

    async fn plan_by_id(&self, id: &str) -> Result<Option<Plan>, AppError>;

    async fn list_active_plans(&self) -> Result<Vec<Plan>, AppError>;

    async fn profile_by_id(&self, id: Uuid) -> Result<Option<Profile>, AppError>;

    /// Insert a `pending` payment row for a checkout that is being opened.
    async fn create_pending_payment(&self, input: &CreatePayment) -> Result<Payment, AppError>;

    /// Attach the gateway preference id to a payment and stamp the row id
    /// into `external_reference`, the correlation value notifications echo
    /// back.
    async fn record_preference(&self, payment_id: Uuid, preference_id: &str)
        -> Result<(), AppError>;

    /// Refresh status and gateway surface fields. No entitlement side
    /// effects; safe to call any number of times.
    async fn record_gateway_sync(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        sync: &GatewaySync,
    ) -> Result<(), AppError>;

    /// Attempt the first-approval grant for `payment`.
    ///
    /// Implementations must gate the grant on an atomic conditional write
    /// that sets `processed_at` only where it is still null, and must apply
    /// the whole grant (credits, subscription rotation, payment finalize)
    /// as one unit of work: under concurrent calls exactly one returns
    /// `Granted`, and a failure leaves no partial state behind.
    async fn grant_entitlement(
        &self,
        payment: &Payment,
        sync: &GatewaySync,
        now: DateTime<Utc>,
    ) -> Result<GrantOutcome, AppError>;
}
