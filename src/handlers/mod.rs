pub mod checkout;
pub mod health;
pub mod products;
pub mod purchases;

use crate::{
    config::AppConfig,
    db::DbPool,
    payment_provider::PaymentGateway,
    services::{CatalogService, CheckoutService, PurchaseService},
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub checkout: Arc<CheckoutService>,
    pub purchases: Arc<PurchaseService>,
    pub catalog: Arc<CatalogService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, payments: Arc<dyn PaymentGateway>, config: &AppConfig) -> Self {
        Self {
            checkout: Arc::new(CheckoutService::new(
                db_pool.clone(),
                payments.clone(),
                config,
            )),
            purchases: Arc::new(PurchaseService::new(db_pool.clone(), payments)),
            catalog: Arc::new(CatalogService::new(db_pool)),
        }
    }
}
