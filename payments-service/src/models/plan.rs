//! Plan model.
//!
//! Plans are immutable reference data seeded by migration; the slug id is
//! what checkout requests and payment rows carry.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub classes_per_month: i32,
    pub features: Vec<String>,
    pub popular: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
