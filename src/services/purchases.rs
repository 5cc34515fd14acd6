use metrics::counter;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::purchase::{self, PurchaseType},
    errors::ServiceError,
    payment_provider::{to_minor_units, CheckoutSession, PaymentGateway, SessionMetadata},
    repositories::{
        purchase_repository::NewPurchase, InsertOutcome, ProductRepository, PurchaseRepository,
    },
};

/// Where the `(product, tier, owner)` claim of a paid session comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimSource {
    /// Read from the metadata written at checkout
    SessionMetadata,
    /// Supplied by the client; the charged amount is checked against the tier price
    Explicit {
        product_id: Uuid,
        purchase_type: PurchaseType,
    },
}

impl ClaimSource {
    fn label(&self) -> &'static str {
        match self {
            ClaimSource::SessionMetadata => "metadata",
            ClaimSource::Explicit { .. } => "explicit",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPurchase {
    pub purchase: purchase::Model,
    /// False when the session had already been recorded
    pub newly_created: bool,
}

/// Verifies paid checkout sessions and records exactly one purchase per session
#[derive(Clone)]
pub struct PurchaseService {
    products: ProductRepository,
    purchases: PurchaseRepository,
    payments: Arc<dyn PaymentGateway>,
}

impl PurchaseService {
    pub fn new(db_pool: Arc<DbPool>, payments: Arc<dyn PaymentGateway>) -> Self {
        Self {
            products: ProductRepository::new(db_pool.clone()),
            purchases: PurchaseRepository::new(db_pool),
            payments,
        }
    }

    /// Records the purchase described by the session's own metadata
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn verify_payment(
        &self,
        user: &AuthUser,
        session_id: &str,
    ) -> Result<RecordedPurchase, ServiceError> {
        self.record(user, session_id, ClaimSource::SessionMetadata)
            .await
    }

    /// Records a purchase for a client-named product and tier
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn record_purchase(
        &self,
        user: &AuthUser,
        product_id: Uuid,
        purchase_type: PurchaseType,
        session_id: &str,
    ) -> Result<RecordedPurchase, ServiceError> {
        self.record(
            user,
            session_id,
            ClaimSource::Explicit {
                product_id,
                purchase_type,
            },
        )
        .await
    }

    /// Returns the stored purchase for this session, if any, after checking its owner
    async fn already_recorded(
        &self,
        session: &CheckoutSession,
        user: &AuthUser,
        source: ClaimSource,
    ) -> Result<Option<RecordedPurchase>, ServiceError> {
        let Some(existing) = self.purchases.find_by_payment_id(&session.id).await? else {
            return Ok(None);
        };
        ensure_owner(&existing, user)?;
        info!(
            session_id = %session.id,
            purchase_id = %existing.id,
            "purchase already recorded"
        );
        counter!("mercuryhub.purchases.duplicate", 1, "path" => source.label());
        Ok(Some(RecordedPurchase {
            purchase: existing,
            newly_created: false,
        }))
    }

    async fn record(
        &self,
        user: &AuthUser,
        session_id: &str,
        source: ClaimSource,
    ) -> Result<RecordedPurchase, ServiceError> {
        let session = self
            .payments
            .retrieve_checkout_session(session_id)
            .await
            .map_err(|e| {
                warn!(session_id, error = %e, "checkout session lookup failed");
                ServiceError::from(e)
            })?
            .ok_or_else(|| {
                warn!(session_id, "checkout session not found");
                ServiceError::SessionNotFound(session_id.to_string())
            })?;

        if !session.is_paid() {
            info!(
                session_id = %session.id,
                payment_status = ?session.payment_status,
                "checkout session not paid yet"
            );
            return Err(ServiceError::PaymentNotCompleted);
        }

        // A recorded session replays as-is on the metadata path, even when it
        // was recorded by the explicit path and carries no metadata.
        if source == ClaimSource::SessionMetadata {
            if let Some(recorded) = self.already_recorded(&session, user, source).await? {
                return Ok(recorded);
            }
        }

        let claim = resolve_claim(&session, source, user)?;

        if let ClaimSource::Explicit { .. } = source {
            if let Some(recorded) = self.already_recorded(&session, user, source).await? {
                return Ok(recorded);
            }
        }

        let product = self
            .products
            .find_by_id(claim.product_id)
            .await?
            .filter(|p| p.is_purchasable())
            .ok_or_else(|| {
                warn!(
                    session_id = %session.id,
                    product_id = %claim.product_id,
                    "paid session references a product that is not available"
                );
                ServiceError::ProductUnavailable(claim.product_id.to_string())
            })?;

        if let ClaimSource::Explicit { .. } = source {
            let expected = to_minor_units(product.price_for(claim.purchase_type)).ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "price of product {} does not fit in minor units",
                    product.id
                ))
            })?;
            let actual = session.amount_total.ok_or_else(|| {
                ServiceError::MalformedSession("session has no amount_total".to_string())
            })?;
            if expected != actual {
                warn!(
                    session_id = %session.id,
                    product_id = %product.id,
                    purchase_type = %claim.purchase_type,
                    expected,
                    actual,
                    "charged amount does not match tier price"
                );
                return Err(ServiceError::AmountMismatch { expected, actual });
            }
        }

        let outcome = self
            .purchases
            .insert_if_absent(NewPurchase {
                user_id: user.user_id,
                product_id: product.id,
                purchase_type: claim.purchase_type,
                stripe_payment_id: session.id.clone(),
            })
            .await?;

        match outcome {
            InsertOutcome::Inserted(purchase) => {
                info!(
                    session_id = %session.id,
                    purchase_id = %purchase.id,
                    product_id = %purchase.product_id,
                    purchase_type = %purchase.purchase_type,
                    "purchase recorded"
                );
                counter!("mercuryhub.purchases.recorded", 1, "path" => source.label());
                Ok(RecordedPurchase {
                    purchase,
                    newly_created: true,
                })
            }
            InsertOutcome::Existing(purchase) => {
                ensure_owner(&purchase, user)?;
                info!(
                    session_id = %session.id,
                    purchase_id = %purchase.id,
                    "lost insert race; returning recorded purchase"
                );
                counter!("mercuryhub.purchases.duplicate", 1, "path" => source.label());
                Ok(RecordedPurchase {
                    purchase,
                    newly_created: false,
                })
            }
        }
    }
}

fn ensure_owner(purchase: &purchase::Model, user: &AuthUser) -> Result<(), ServiceError> {
    if purchase.user_id != user.user_id {
        warn!(
            purchase_id = %purchase.id,
            session_id = %purchase.stripe_payment_id,
            owner = %purchase.user_id,
            caller = %user.user_id,
            "session already recorded for another user"
        );
        return Err(ServiceError::UserMismatch);
    }
    Ok(())
}

/// Works out what a paid session bought and for whom
fn resolve_claim(
    session: &CheckoutSession,
    source: ClaimSource,
    user: &AuthUser,
) -> Result<SessionMetadata, ServiceError> {
    let malformed = |e: crate::payment_provider::MetadataError| {
        warn!(session_id = %session.id, error = %e, "unusable session metadata");
        ServiceError::MalformedSession(e.to_string())
    };

    let claim = match source {
        ClaimSource::SessionMetadata => session.purchase_metadata().map_err(malformed)?,
        ClaimSource::Explicit {
            product_id,
            purchase_type,
        } if session.has_no_purchase_metadata() => SessionMetadata {
            product_id,
            purchase_type,
            user_id: user.user_id,
        },
        ClaimSource::Explicit {
            product_id,
            purchase_type,
        } => {
            let meta = session.purchase_metadata().map_err(malformed)?;
            if meta.user_id == user.user_id
                && (meta.product_id != product_id || meta.purchase_type != purchase_type)
            {
                warn!(
                    session_id = %session.id,
                    requested_product = %product_id,
                    requested_type = %purchase_type,
                    session_product = %meta.product_id,
                    session_type = %meta.purchase_type,
                    "requested purchase disagrees with session metadata"
                );
                return Err(ServiceError::MalformedSession(
                    "requested product or tier does not match the checkout session".to_string(),
                ));
            }
            meta
        }
    };

    if claim.user_id != user.user_id {
        warn!(
            session_id = %session.id,
            session_user = %claim.user_id,
            caller = %user.user_id,
            "session belongs to another user"
        );
        return Err(ServiceError::UserMismatch);
    }

    Ok(claim)
}
