//! Configuration module for payments-service.

use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

#[derive(Debug, Clone)]
pub struct PaymentsConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub mercadopago: MercadoPagoConfig,
    pub site: SiteConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Secret shared with the managed auth provider; its session JWTs are
/// verified against it.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: Secret<String>,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoConfig {
    pub access_token: Secret<String>,
    pub api_base_url: String,
}

/// Public base URL of the site, used for checkout back URLs and the
/// webhook notification URL.
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub base_url: String,
}

impl PaymentsConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME").unwrap_or_else(|_| "payments-service".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: Secret::new(env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?),
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            auth: AuthConfig {
                jwt_secret: Secret::new(env::var("AUTH_JWT_SECRET").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("AUTH_JWT_SECRET is required"))
                })?),
            },
            mercadopago: MercadoPagoConfig {
                access_token: Secret::new(
                    env::var("MERCADOPAGO_ACCESS_TOKEN").unwrap_or_default(),
                ),
                api_base_url: env::var("MERCADOPAGO_API_BASE_URL")
                    .unwrap_or_else(|_| "https://api.mercadopago.com".to_string()),
            },
            site: SiteConfig {
                base_url: env::var("SITE_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
        })
    }
}
