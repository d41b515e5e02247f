//! Mercado Pago payment gateway client.
//!
//! The gateway is the authority for payment truth: notification contents
//! are never trusted, every sync re-fetches the payment from this API.

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use service_core::observability::TracedClientExt;
use thiserror::Error;

use crate::config::MercadoPagoConfig;

/// Error type for gateway operations.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Mercado Pago credentials not configured")]
    NotConfigured,

    #[error("request to Mercado Pago failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Mercado Pago returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("failed to decode Mercado Pago response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Mercado Pago returned no checkout URL")]
    MissingCheckoutUrl,
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotConfigured => AppError::InternalError(anyhow::anyhow!(
                "Mercado Pago is not configured for this environment"
            )),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

/// Payment record as returned by `GET /v1/payments/{id}`.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayPayment {
    /// Numeric in the API, stringly everywhere else.
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub status_detail: Option<String>,
    #[serde(default)]
    pub payment_method_id: Option<String>,
    #[serde(default)]
    pub external_reference: Option<String>,
    #[serde(default)]
    pub metadata: Option<GatewayPaymentMetadata>,
}

/// Metadata we attach at preference-creation time and get echoed back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GatewayPaymentMetadata {
    #[serde(default)]
    pub local_payment_id: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber {
        String(String),
        Number(i64),
    }

    Ok(match StringOrNumber::deserialize(deserializer)? {
        StringOrNumber::String(s) => s,
        StringOrNumber::Number(n) => n.to_string(),
    })
}

/// Checkout preference request, `POST /checkout/preferences`.
#[derive(Debug, Clone, Serialize)]
pub struct PreferenceRequest {
    pub items: Vec<PreferenceItem>,
    pub payer: PreferencePayer,
    pub external_reference: String,
    pub metadata: serde_json::Value,
    pub back_urls: PreferenceBackUrls,
    pub auto_return: String,
    pub notification_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: u32,
    pub currency_id: String,
    pub unit_price: Decimal,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferencePayer {
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreferenceBackUrls {
    pub success: String,
    pub pending: String,
    pub failure: String,
}

#[derive(Debug, Deserialize)]
struct PreferenceResponse {
    id: String,
    #[serde(default)]
    init_point: Option<String>,
    #[serde(default)]
    sandbox_init_point: Option<String>,
}

/// Checkout session opened at the gateway.
#[derive(Debug, Clone)]
pub struct CheckoutPreference {
    pub preference_id: String,
    pub checkout_url: String,
}

/// Seam the reconciliation and checkout flows depend on; the production
/// implementation is [`MercadoPagoClient`], tests substitute a stub.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetch the authoritative payment record.
    async fn fetch_payment(&self, provider_payment_id: &str)
        -> Result<GatewayPayment, GatewayError>;

    /// Open a checkout session for a plan purchase.
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<CheckoutPreference, GatewayError>;
}

/// Mercado Pago client for interacting with the payments API.
#[derive(Clone)]
pub struct MercadoPagoClient {
    client: Client,
    config: MercadoPagoConfig,
}

impl MercadoPagoClient {
    pub fn new(config: MercadoPagoConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Check if Mercado Pago is configured (access token is set).
    pub fn is_configured(&self) -> bool {
        !self.config.access_token.expose_secret().is_empty()
    }
}

#[async_trait]
impl PaymentGateway for MercadoPagoClient {
    async fn fetch_payment(
        &self,
        provider_payment_id: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = format!(
            "{}/v1/payments/{}",
            self.config.api_base_url, provider_payment_id
        );

        let response = self
            .client
            .traced_get(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        tracing::debug!(status = %status, "Mercado Pago payment fetch response");

        if !status.is_success() {
            return Err(GatewayError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let payment: GatewayPayment = serde_json::from_str(&body)?;
        Ok(payment)
    }

    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<CheckoutPreference, GatewayError> {
        if !self.is_configured() {
            return Err(GatewayError::NotConfigured);
        }

        let url = format!("{}/checkout/preferences", self.config.api_base_url);

        let response = self
            .client
            .traced_post(&url)
            .bearer_auth(self.config.access_token.expose_secret())
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Mercado Pago preference creation failed");
            return Err(GatewayError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let preference: PreferenceResponse = serde_json::from_str(&body)?;
        let checkout_url = preference
            .init_point
            .or(preference.sandbox_init_point)
            .ok_or(GatewayError::MissingCheckoutUrl)?;

        tracing::info!(
            preference_id = %preference.id,
            "Mercado Pago checkout preference created"
        );

        Ok(CheckoutPreference {
            preference_id: preference.id,
            checkout_url,
        })
    }
}
