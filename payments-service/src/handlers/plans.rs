//! Plan catalog.

use axum::extract::State;
use axum::Json;
use rust_decimal::Decimal;
use serde::Serialize;
use service_core::error::AppError;

use crate::models::Plan;
use crate::startup::AppState;

/// Plan as exposed to the pricing page.
#[derive(Debug, Serialize)]
pub struct PlanResponse {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: Decimal,
    pub currency: String,
    pub classes_per_month: i32,
    pub features: Vec<String>,
    pub popular: bool,
}

impl From<Plan> for PlanResponse {
    fn from(plan: Plan) -> Self {
        Self {
            id: plan.id,
            name: plan.name,
            description: plan.description,
            price: plan.price,
            currency: plan.currency,
            classes_per_month: plan.classes_per_month,
            features: plan.features,
            popular: plan.popular,
        }
    }
}

/// List the active plans.
pub async fn list_plans(
    State(state): State<AppState>,
) -> Result<Json<Vec<PlanResponse>>, AppError> {
    let plans = state.store.list_active_plans().await?;
    Ok(Json(plans.into_iter().map(PlanResponse::from).collect()))
}
