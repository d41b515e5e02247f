//! Database service for payments-service.

use async_trait::async_trait;
use chrono::{DateTime, Months, Utc};
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{CreatePayment, Payment, PaymentStatus, Plan, Profile, SubscriptionStatus};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::store::{GatewaySync, GrantOutcome, PaymentStore};

const PAYMENT_COLUMNS: &str = "id, user_id, plan_id, amount, currency, status, provider, provider_preference_id, provider_payment_id, payment_method, external_reference, external_id, status_detail, processed_at, created_at";

const PLAN_COLUMNS: &str =
    "id, name, description, price, currency, classes_per_month, features, popular, active, created_at";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "payments-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["health_check"])
            .start_timer();

        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;

        timer.observe_duration();
        Ok(())
    }

    #[instrument(skip(self), fields(payment_id = %id))]
    async fn payment_by_id(&self, id: Uuid) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["payment_by_id"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get payment: {}", e)))?;

        timer.observe_duration();

        Ok(payment)
    }

    #[instrument(skip(self), fields(plan_id = %id))]
    async fn plan_by_id(&self, id: &str) -> Result<Option<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["plan_by_id"])
            .start_timer();

        let plan =
            sqlx::query_as::<_, Plan>(&format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(anyhow::anyhow!("Failed to get plan: {}", e))
                })?;

        timer.observe_duration();

        Ok(plan)
    }

    #[instrument(skip(self))]
    async fn list_active_plans(&self) -> Result<Vec<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_active_plans"])
            .start_timer();

        let plans = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE active = TRUE ORDER BY price"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list plans: {}", e)))?;

        timer.observe_duration();

        Ok(plans)
    }

    #[instrument(skip(self), fields(user_id = %id))]
    async fn profile_by_id(&self, id: Uuid) -> Result<Option<Profile>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["profile_by_id"])
            .start_timer();

        let profile = sqlx::query_as::<_, Profile>(
            r#"
            SELECT id, email, full_name, is_admin, free_class_used, classes_remaining, current_plan, created_at, updated_at
            FROM profiles
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get profile: {}", e)))?;

        timer.observe_duration();

        Ok(profile)
    }

    #[instrument(skip(self, input), fields(user_id = %input.user_id, plan_id = %input.plan_id))]
    async fn create_pending_payment(&self, input: &CreatePayment) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_pending_payment"])
            .start_timer();

        let payment_id = Uuid::new_v4();
        let payment = sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (id, user_id, plan_id, amount, currency, status, provider)
            VALUES ($1, $2, $3, $4, $5, 'pending', $6)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(payment_id)
        .bind(input.user_id)
        .bind(&input.plan_id)
        .bind(input.amount)
        .bind(&input.currency)
        .bind(&input.provider)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create payment: {}", e)))?;

        timer.observe_duration();
        info!(payment_id = %payment.id, "Pending payment created");

        Ok(payment)
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn record_preference(
        &self,
        payment_id: Uuid,
        preference_id: &str,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_preference"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE payments
            SET provider_preference_id = $2, external_reference = $3
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(preference_id)
        .bind(payment_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record preference: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self, sync), fields(payment_id = %payment_id, status = %status.as_str()))]
    async fn record_gateway_sync(
        &self,
        payment_id: Uuid,
        status: PaymentStatus,
        sync: &GatewaySync,
    ) -> Result<(), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_gateway_sync"])
            .start_timer();

        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, provider = $3, provider_payment_id = $4, external_id = $4,
                payment_method = $5, status_detail = $6
            WHERE id = $1
            "#,
        )
        .bind(payment_id)
        .bind(status.as_str())
        .bind(&sync.provider)
        .bind(&sync.provider_payment_id)
        .bind(&sync.payment_method)
        .bind(&sync.status_detail)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to record gateway sync: {}", e))
        })?;

        timer.observe_duration();

        Ok(())
    }

    /// The whole grant runs in one transaction, opened by the conditional
    /// update on `processed_at`. Under concurrent syncs of the same payment
    /// exactly one caller sees an affected row and continues; everyone else
    /// takes the duplicate path. Any later failure rolls the gate back too,
    /// so a failed attempt can be retried in full.
    #[instrument(skip(self, payment, sync), fields(payment_id = %payment.id, user_id = %payment.user_id))]
    async fn grant_entitlement(
        &self,
        payment: &Payment,
        sync: &GatewaySync,
        now: DateTime<Utc>,
    ) -> Result<GrantOutcome, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["grant_entitlement"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let gated = sqlx::query(
            r#"
            UPDATE payments
            SET status = $7, provider = $2, provider_payment_id = $3, external_id = $3,
                payment_method = $4, status_detail = $5, processed_at = $6
            WHERE id = $1 AND processed_at IS NULL
            "#,
        )
        .bind(payment.id)
        .bind(&sync.provider)
        .bind(&sync.provider_payment_id)
        .bind(&sync.payment_method)
        .bind(&sync.status_detail)
        .bind(now)
        .bind(PaymentStatus::Approved.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to gate grant: {}", e)))?;

        if gated.rows_affected() == 0 {
            tx.rollback().await.map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to rollback: {}", e))
            })?;
            timer.observe_duration();
            return Ok(GrantOutcome::AlreadyProcessed);
        }

        let plan = sqlx::query_as::<_, Plan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM plans WHERE id = $1"
        ))
        .bind(&payment.plan_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to load plan: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Plan '{}' not found", payment.plan_id)))?;

        // A paid plan always consumes the free-trial flag, used or not.
        let credited = sqlx::query(
            r#"
            UPDATE profiles
            SET classes_remaining = classes_remaining + $2, current_plan = $3,
                free_class_used = TRUE, updated_at = $4
            WHERE id = $1
            "#,
        )
        .bind(payment.user_id)
        .bind(plan.classes_per_month)
        .bind(&plan.name)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to credit profile: {}", e)))?;

        if credited.rows_affected() == 0 {
            return Err(AppError::NotFound(anyhow::anyhow!(
                "Profile '{}' not found",
                payment.user_id
            )));
        }

        // Expire before insert: a brief window with zero active subscriptions
        // is acceptable, a window with two is not.
        sqlx::query(
            r#"
            UPDATE subscriptions
            SET status = $2
            WHERE user_id = $1 AND status = $3
            "#,
        )
        .bind(payment.user_id)
        .bind(SubscriptionStatus::Expired.as_str())
        .bind(SubscriptionStatus::Active.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to expire subscriptions: {}", e))
        })?;

        sqlx::query(
            r#"
            INSERT INTO subscriptions (id, user_id, plan_id, status, current_period_start, current_period_end)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(payment.user_id)
        .bind(&plan.id)
        .bind(SubscriptionStatus::Active.as_str())
        .bind(now)
        .bind(now + Months::new(1))
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to insert subscription: {}", e))
        })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit grant: {}", e))
        })?;

        timer.observe_duration();
        info!(
            payment_id = %payment.id,
            plan_id = %plan.id,
            classes_added = plan.classes_per_month,
            "Entitlement granted"
        );

        Ok(GrantOutcome::Granted {
            classes_added: plan.classes_per_month,
        })
    }
}
