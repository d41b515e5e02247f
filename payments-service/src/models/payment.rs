//! Payment model and gateway status normalization.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Lifecycle status of a local payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

/// Gateway statuses treated as terminal rejections.
const REJECTED_GATEWAY_STATUSES: [&str; 4] =
    ["rejected", "cancelled", "charged_back", "refunded"];

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "approved" => PaymentStatus::Approved,
            "rejected" => PaymentStatus::Rejected,
            _ => PaymentStatus::Pending,
        }
    }

    /// Normalize a raw gateway status into the three-state model.
    ///
    /// The gateway's vocabulary is an open set from our point of view, so
    /// anything unrecognized stays `Pending`: an unknown status must never
    /// grant an entitlement, and must not strand the payment in a terminal
    /// rejection either.
    pub fn from_gateway(raw: &str) -> Self {
        if raw == "approved" {
            return PaymentStatus::Approved;
        }
        if REJECTED_GATEWAY_STATUSES.contains(&raw) {
            return PaymentStatus::Rejected;
        }
        PaymentStatus::Pending
    }
}

/// Local payment record. The row id doubles as the gateway
/// `external_reference`, which is how notifications correlate back to us.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: String,
    pub provider: Option<String>,
    pub provider_preference_id: Option<String>,
    pub provider_payment_id: Option<String>,
    pub payment_method: Option<String>,
    pub external_reference: Option<String>,
    pub external_id: Option<String>,
    pub status_detail: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a pending payment at checkout time.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub user_id: Uuid,
    pub plan_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub provider: String,
}
