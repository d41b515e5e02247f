//! HTTP handlers for the payments API.

pub mod checkout;
pub mod confirm;
pub mod plans;
pub mod webhook;

use serde::Serialize;

use crate::models::PaymentStatus;
use crate::services::SyncOutcome;

/// Outcome of a reconciliation, as reported to callers of either entry
/// path.
#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub status: PaymentStatus,
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classes_added: Option<i32>,
}

impl From<SyncOutcome> for SyncResponse {
    fn from(outcome: SyncOutcome) -> Self {
        match outcome {
            SyncOutcome::Granted { classes_added } => SyncResponse {
                status: PaymentStatus::Approved,
                granted: true,
                classes_added: Some(classes_added),
            },
            SyncOutcome::AlreadyProcessed => SyncResponse {
                status: PaymentStatus::Approved,
                granted: false,
                classes_added: None,
            },
            SyncOutcome::StatusRecorded(status) => SyncResponse {
                status,
                granted: false,
                classes_added: None,
            },
        }
    }
}
