//! Shared fakes and fixtures for payments-service integration tests.
//!
//! The store and the gateway sit behind trait seams, so these tests run
//! the real reconciliation and routing logic against in-memory fakes
//! instead of live Postgres and Mercado Pago.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use jsonwebtoken::{encode, EncodingKey, Header};
use rust_decimal::Decimal;
use secrecy::Secret;
use uuid::Uuid;

use payments_service::config::{
    AuthConfig, DatabaseConfig, MercadoPagoConfig, PaymentsConfig, SiteConfig,
};
use payments_service::middleware::auth::Claims;
use payments_service::models::{
    CreatePayment, Payment, PaymentStatus, Plan, Profile, Subscription, SubscriptionStatus,
};
use payments_service::services::mercadopago::{
    CheckoutPreference, GatewayError, GatewayPayment, GatewayPaymentMetadata, PaymentGateway,
    PreferenceRequest,
};
use payments_service::services::store::{GatewaySync, GrantOutcome, PaymentStore};
use payments_service::services::ReconciliationService;
use payments_service::startup::AppState;
use service_core::error::AppError;

pub const JWT_SECRET: &str = "test-jwt-secret";

static INIT: Once = Once::new();

/// Initialize tracing for tests (only once).
pub fn init_test_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter("info,payments_service=debug")
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// In-memory store. The payments mutex plays the role of the row gate:
/// the processed_at check-and-set happens under one lock acquisition, so
/// concurrent grants serialize exactly like the conditional update does.
#[derive(Default)]
pub struct InMemoryStore {
    pub plans: Mutex<HashMap<String, Plan>>,
    pub profiles: Mutex<HashMap<Uuid, Profile>>,
    pub payments: Mutex<HashMap<Uuid, Payment>>,
    pub subscriptions: Mutex<Vec<Subscription>>,
    pub fail_grants: AtomicBool,
}

impl InMemoryStore {
    pub fn insert_plan(&self, id: &str, name: &str, classes_per_month: i32) -> Plan {
        let plan = Plan {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            price: Decimal::new(80_000, 0),
            currency: "CLP".to_string(),
            classes_per_month,
            features: vec![],
            popular: false,
            active: true,
            created_at: Utc::now(),
        };
        self.plans
            .lock()
            .unwrap()
            .insert(plan.id.clone(), plan.clone());
        plan
    }

    pub fn insert_profile(&self, user_id: Uuid) -> Profile {
        let now = Utc::now();
        let profile = Profile {
            id: user_id,
            email: "student@example.com".to_string(),
            full_name: Some("Test Student".to_string()),
            is_admin: false,
            free_class_used: false,
            classes_remaining: 0,
            current_plan: None,
            created_at: now,
            updated_at: now,
        };
        self.profiles.lock().unwrap().insert(user_id, profile.clone());
        profile
    }

    pub fn insert_pending_payment(&self, user_id: Uuid, plan_id: &str) -> Payment {
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id,
            plan_id: plan_id.to_string(),
            amount: Decimal::new(80_000, 0),
            currency: "CLP".to_string(),
            status: "pending".to_string(),
            provider: Some("mercadopago".to_string()),
            provider_preference_id: None,
            provider_payment_id: None,
            payment_method: None,
            external_reference: None,
            external_id: None,
            status_detail: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id, payment.clone());
        payment
    }

    pub fn profile(&self, user_id: Uuid) -> Profile {
        self.profiles.lock().unwrap().get(&user_id).unwrap().clone()
    }

    pub fn payment(&self, id: Uuid) -> Payment {
        self.payments.lock().unwrap().get(&id).unwrap().clone()
    }

    pub fn subscriptions_of(&self, user_id: Uuid) -> Vec<Subscription> {
        self.subscriptions
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect()
    }

    pub fn active_subscriptions(&self, user_id: Uuid) -> Vec<Subscription> {
        self.subscriptions_of(user_id)
            .into_iter()
            .filter(|s| s.status == SubscriptionStatus::Active.as_str())
            .collect()
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn payment_by_id(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        Ok(self.payments.lock().unwrap().get(&id).cloned())
    }

    async fn plan_by_id(&self, id: &str) -> Result<Option<Plan>, AppError> {
        Ok(self.plans.lock().unwrap().get(id).cloned())
    }

    async fn list_active_plans(&self) -> Result<Vec<Plan>, AppError> {
        let mut plans: Vec<Plan> = self
            .plans
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.active)
            .cloned()
            .collect();
        plans.sort_by(|a, b| a.price.cmp(&b.price));
        Ok(plans)
    }

    async fn profile_by_id(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        Ok(self.profiles.lock().unwrap().get(&id).cloned())
    }

    async fn create_pending_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let payment = Payment {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            plan_id: input.plan_id.clone(),
            amount: input.amount,
            currency: input.currency.clone(),
            status: "pending".to_string(),
            provider: Some(input.provider.clone()),
            provider_preference_id: None,
            provider_payment_id: None,
            payment_method: None,
            external_reference: None,
            external_id: None,
            status_detail: None,
            processed_at: None,
            created_at: Utc::now(),
        };
        self.payments
            .lock()
            .unwrap()
            .insert(payment.id, payment.clone());
        Ok(payment)
    }

    async fn record_preference(
        &self,
        payment_id: Uuid,
        preference_id: &str,
    ) -> Result<(), AppError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(&payment_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;
        payment.provider_preference_id = Some(preference_id.to_string());
        payment.external_reference = Some(payment_id.to_string());
        Ok(())
    }

    async fn record_gateway_sync(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        sync: &GatewaySync,
    ) -> Result<(), AppError> {
        let mut payments = self.payments.lock().unwrap();
        let payment = payments
            .get_mut(&payment_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;
        payment.status = status.as_str().to_string();
        payment.provider = Some(sync.provider.clone());
        payment.provider_payment_id = Some(sync.provider_payment_id.clone());
        payment.external_id = Some(sync.provider_payment_id.clone());
        payment.payment_method = sync.payment_method.clone();
        payment.status_detail = sync.status_detail.clone();
        Ok(())
    }

    async fn grant_entitlement(
        &self,
        payment: &Payment,
        sync: &GatewaySync,
        now: DateTime<Utc>,
    ) -> Result<GrantOutcome, AppError> {
        if self.fail_grants.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseError(anyhow::anyhow!(
                "injected grant failure"
            )));
        }

        let mut payments = self.payments.lock().unwrap();
        let stored = payments
            .get_mut(&payment.id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("payment not found")))?;

        if stored.processed_at.is_some() {
            return Ok(GrantOutcome::AlreadyProcessed);
        }

        let plan = self
            .plans
            .lock()
            .unwrap()
            .get(&payment.plan_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("plan not found")))?;

        stored.processed_at = Some(now);
        stored.status = PaymentStatus::Approved.as_str().to_string();
        stored.provider = Some(sync.provider.clone());
        stored.provider_payment_id = Some(sync.provider_payment_id.clone());
        stored.external_id = Some(sync.provider_payment_id.clone());
        stored.payment_method = sync.payment_method.clone();
        stored.status_detail = sync.status_detail.clone();

        {
            let mut profiles = self.profiles.lock().unwrap();
            let profile = profiles
                .get_mut(&payment.user_id)
                .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("profile not found")))?;
            profile.classes_remaining += plan.classes_per_month;
            profile.current_plan = Some(plan.name.clone());
            profile.free_class_used = true;
            profile.updated_at = now;
        }

        let mut subscriptions = self.subscriptions.lock().unwrap();
        for sub in subscriptions
            .iter_mut()
            .filter(|s| s.user_id == payment.user_id && s.status == SubscriptionStatus::Active.as_str())
        {
            sub.status = SubscriptionStatus::Expired.as_str().to_string();
        }
        subscriptions.push(Subscription {
            id: Uuid::new_v4(),
            user_id: payment.user_id,
            plan_id: plan.id.clone(),
            status: SubscriptionStatus::Active.as_str().to_string(),
            current_period_start: now,
            current_period_end: now + Months::new(1),
            created_at: now,
        });

        Ok(GrantOutcome::Granted {
            classes_added: plan.classes_per_month,
        })
    }
}

/// Programmable gateway stub.
#[derive(Default)]
pub struct StubGateway {
    pub payments: Mutex<HashMap<String, GatewayPayment>>,
    pub preference: Mutex<Option<CheckoutPreference>>,
    pub preference_requests: Mutex<Vec<PreferenceRequest>>,
    pub fail_fetch: AtomicBool,
    pub fetch_calls: AtomicUsize,
}

impl StubGateway {
    pub fn register_payment(
        &self,
        provider_id: &str,
        status: &str,
        external_reference: Option<String>,
        metadata_local_id: Option<String>,
    ) {
        self.payments.lock().unwrap().insert(
            provider_id.to_string(),
            GatewayPayment {
                id: provider_id.to_string(),
                status: status.to_string(),
                status_detail: Some("stubbed".to_string()),
                payment_method_id: Some("webpay".to_string()),
                external_reference,
                metadata: metadata_local_id.map(|id| GatewayPaymentMetadata {
                    local_payment_id: Some(id),
                }),
            },
        );
    }

    pub fn set_preference(&self, preference_id: &str, checkout_url: &str) {
        *self.preference.lock().unwrap() = Some(CheckoutPreference {
            preference_id: preference_id.to_string(),
            checkout_url: checkout_url.to_string(),
        });
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn fetch_payment(
        &self,
        provider_payment_id: &str,
    ) -> Result<GatewayPayment, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(GatewayError::UpstreamStatus {
                status: 502,
                body: "gateway down".to_string(),
            });
        }

        self.payments
            .lock()
            .unwrap()
            .get(provider_payment_id)
            .cloned()
            .ok_or(GatewayError::UpstreamStatus {
                status: 404,
                body: "payment not found".to_string(),
            })
    }

    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<CheckoutPreference, GatewayError> {
        self.preference_requests.lock().unwrap().push(request.clone());

        Ok(self
            .preference
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(CheckoutPreference {
                preference_id: "pref-1".to_string(),
                checkout_url: "https://mp.example/checkout/pref-1".to_string(),
            }))
    }
}

pub fn test_config() -> PaymentsConfig {
    PaymentsConfig {
        common: service_core::config::Config { port: 0 },
        service_name: "payments-service-test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        database: DatabaseConfig {
            url: Secret::new("postgres://unused".to_string()),
            max_connections: 2,
            min_connections: 1,
        },
        auth: AuthConfig {
            jwt_secret: Secret::new(JWT_SECRET.to_string()),
        },
        mercadopago: MercadoPagoConfig {
            access_token: Secret::new("test-token".to_string()),
            api_base_url: "https://api.mercadopago.com".to_string(),
        },
        site: SiteConfig {
            base_url: "https://english.example".to_string(),
        },
    }
}

pub fn reconciliation(
    store: &Arc<InMemoryStore>,
    gateway: &Arc<StubGateway>,
) -> ReconciliationService {
    ReconciliationService::new(store.clone(), gateway.clone())
}

pub fn test_state(store: &Arc<InMemoryStore>, gateway: &Arc<StubGateway>) -> AppState {
    AppState {
        config: test_config(),
        store: store.clone(),
        gateway: gateway.clone(),
        reconciliation: reconciliation(store, gateway),
    }
}

/// Mint a session token the auth extractor accepts.
pub fn bearer_token(user_id: Uuid) -> String {
    let claims = Claims {
        sub: user_id.to_string(),
        email: Some("student@example.com".to_string()),
        exp: (Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("failed to sign test token")
}
