//! Services module for payments-service.

pub mod database;
pub mod mercadopago;
pub mod metrics;
pub mod reconciliation;
pub mod store;

pub use database::Database;
pub use mercadopago::{MercadoPagoClient, PaymentGateway};
pub use metrics::{
    get_metrics, init_metrics, record_checkout_created, record_entitlement_granted, record_error,
    record_payment_synced, record_webhook_event,
};
pub use reconciliation::{ReconcileError, ReconciliationService, SyncOutcome};
pub use store::{GatewaySync, GrantOutcome, PaymentStore};
