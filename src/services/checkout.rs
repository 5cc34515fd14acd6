use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    config::AppConfig,
    db::DbPool,
    entities::purchase::PurchaseType,
    errors::ServiceError,
    payment_provider::{to_minor_units, CreateCheckoutRequest, PaymentGateway, SessionMetadata},
    repositories::ProductRepository,
};

/// Opens hosted checkout sessions for marketplace products
#[derive(Clone)]
pub struct CheckoutService {
    products: ProductRepository,
    payments: Arc<dyn PaymentGateway>,
    currency: String,
    app_base_url: String,
}

impl CheckoutService {
    pub fn new(db_pool: Arc<DbPool>, payments: Arc<dyn PaymentGateway>, config: &AppConfig) -> Self {
        Self {
            products: ProductRepository::new(db_pool),
            payments,
            currency: config.currency.to_lowercase(),
            app_base_url: config.app_base_url.trim_end_matches('/').to_string(),
        }
    }

    fn success_url(&self) -> String {
        format!(
            "{}/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
            self.app_base_url
        )
    }

    fn cancel_url(&self) -> String {
        format!("{}/marketplace", self.app_base_url)
    }

    /// Creates a checkout session and returns the provider's redirect URL
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn start_checkout(
        &self,
        user: &AuthUser,
        product_id: Uuid,
        purchase_type: PurchaseType,
    ) -> Result<String, ServiceError> {
        let product = self
            .products
            .find_by_id(product_id)
            .await?
            .filter(|p| p.is_purchasable())
            .ok_or_else(|| {
                warn!(
                    %product_id,
                    user_id = %user.user_id,
                    %purchase_type,
                    "checkout requested for a product that is not available"
                );
                ServiceError::ProductUnavailable(product_id.to_string())
            })?;

        let amount_minor = to_minor_units(product.price_for(purchase_type))
            .filter(|amount| *amount > 0)
            .ok_or_else(|| {
                warn!(%product_id, %purchase_type, "product has no chargeable price for tier");
                ServiceError::ProductUnavailable(product_id.to_string())
            })?;

        let session = self
            .payments
            .create_checkout_session(CreateCheckoutRequest {
                product_name: product.name.clone(),
                amount_minor,
                currency: self.currency.clone(),
                metadata: SessionMetadata {
                    product_id,
                    purchase_type,
                    user_id: user.user_id,
                },
                success_url: self.success_url(),
                cancel_url: self.cancel_url(),
            })
            .await
            .map_err(|e| {
                warn!(%product_id, error = %e, "checkout session creation failed");
                ServiceError::from(e)
            })?;

        let url = session.url.ok_or_else(|| {
            ServiceError::PaymentProviderError(format!(
                "checkout session {} has no redirect url",
                session.id
            ))
        })?;

        info!(
            session_id = %session.id,
            %product_id,
            %purchase_type,
            amount_minor,
            "checkout session created"
        );
        Ok(url)
    }
}
