//! Checkout preference creation.
//!
//! Opens a Mercado Pago checkout session for a plan purchase and records
//! the pending local payment the reconciliation flow will later resolve.
//! The local payment id travels as the preference's `external_reference`
//! (and a metadata copy), which is the correlation the webhook relies on.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use service_core::error::AppError;
use validator::Validate;

use crate::middleware::AuthUser;
use crate::models::CreatePayment;
use crate::services::mercadopago::{
    PreferenceBackUrls, PreferenceItem, PreferencePayer, PreferenceRequest,
};
use crate::services::metrics::record_checkout_created;
use crate::services::reconciliation::PROVIDER;
use crate::startup::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct CheckoutRequest {
    #[serde(rename = "planId")]
    #[validate(length(min = 1))]
    pub plan_id: String,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    #[serde(rename = "checkoutUrl")]
    pub checkout_url: String,
}

/// Create a checkout preference for the authenticated user.
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, AppError> {
    payload.validate()?;

    let plan_id = payload.plan_id.trim();
    if plan_id.is_empty() {
        return Err(AppError::BadRequest(anyhow::anyhow!("Missing planId")));
    }

    let profile = state
        .store
        .profile_by_id(user.user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Profile not found")))?;

    let plan = state
        .store
        .plan_by_id(plan_id)
        .await?
        .filter(|plan| plan.active)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan not available")))?;

    let payment = state
        .store
        .create_pending_payment(&CreatePayment {
            user_id: profile.id,
            plan_id: plan.id.clone(),
            amount: plan.price,
            currency: plan.currency.clone(),
            provider: PROVIDER.to_string(),
        })
        .await?;

    let site = state.config.site.base_url.trim_end_matches('/');
    let request = PreferenceRequest {
        items: vec![PreferenceItem {
            id: plan.id.clone(),
            title: format!("Plan {} - Ulises Fairlie", plan.name),
            quantity: 1,
            currency_id: plan.currency.clone(),
            unit_price: plan.price,
        }],
        payer: PreferencePayer {
            email: profile.email.clone(),
            name: profile.full_name.clone(),
        },
        external_reference: payment.id.to_string(),
        metadata: json!({
            "local_payment_id": payment.id,
            "user_id": profile.id,
            "plan_id": plan.id,
        }),
        back_urls: PreferenceBackUrls {
            success: format!("{site}/dashboard?payment_status=approved"),
            pending: format!("{site}/dashboard?payment_status=pending"),
            failure: format!("{site}/dashboard?payment_status=failure"),
        },
        auto_return: "approved".to_string(),
        notification_url: format!("{site}/webhooks/mercadopago"),
    };

    let preference = state.gateway.create_preference(&request).await?;

    state
        .store
        .record_preference(payment.id, &preference.preference_id)
        .await?;

    record_checkout_created(&plan.id);
    tracing::info!(
        payment_id = %payment.id,
        plan_id = %plan.id,
        preference_id = %preference.preference_id,
        "Checkout preference created"
    );

    Ok(Json(CheckoutResponse {
        checkout_url: preference.checkout_url,
    }))
}
