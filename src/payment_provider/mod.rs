//! Payment provider port.
//!
//! The service talks to the card processor only through [`PaymentGateway`],
//! so tests can swap Stripe for an in-process fake.

pub mod stripe;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::entities::PurchaseType;

pub use stripe::StripeGateway;

pub const METADATA_PRODUCT_ID: &str = "product_id";
pub const METADATA_PURCHASE_TYPE: &str = "purchase_type";
pub const METADATA_USER_ID: &str = "user_id";

/// What a checkout session was opened for; round-trips through session metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMetadata {
    pub product_id: Uuid,
    pub purchase_type: PurchaseType,
    pub user_id: Uuid,
}

impl SessionMetadata {
    pub fn to_pairs(&self) -> [(&'static str, String); 3] {
        [
            (METADATA_PRODUCT_ID, self.product_id.to_string()),
            (METADATA_PURCHASE_TYPE, self.purchase_type.to_string()),
            (METADATA_USER_ID, self.user_id.to_string()),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct CreateCheckoutRequest {
    pub product_name: String,
    /// Charge in minor currency units
    pub amount_minor: i64,
    pub currency: String,
    pub metadata: SessionMetadata,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    #[serde(other)]
    Unknown,
}

/// Provider-side view of a checkout session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// True when the session carries none of the purchase metadata keys
    pub fn has_no_purchase_metadata(&self) -> bool {
        [METADATA_PRODUCT_ID, METADATA_PURCHASE_TYPE, METADATA_USER_ID]
            .iter()
            .all(|key| self.metadata_value(key).is_none())
    }

    fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// Parses the purchase metadata written at checkout; every key must be present and valid
    pub fn purchase_metadata(&self) -> Result<SessionMetadata, MetadataError> {
        let product_id = self
            .metadata_value(METADATA_PRODUCT_ID)
            .ok_or(MetadataError::Missing(METADATA_PRODUCT_ID))?;
        let purchase_type = self
            .metadata_value(METADATA_PURCHASE_TYPE)
            .ok_or(MetadataError::Missing(METADATA_PURCHASE_TYPE))?;
        let user_id = self
            .metadata_value(METADATA_USER_ID)
            .ok_or(MetadataError::Missing(METADATA_USER_ID))?;

        Ok(SessionMetadata {
            product_id: Uuid::parse_str(product_id)
                .map_err(|_| MetadataError::Invalid(METADATA_PRODUCT_ID))?,
            purchase_type: purchase_type
                .parse()
                .map_err(|_| MetadataError::Invalid(METADATA_PURCHASE_TYPE))?,
            user_id: Uuid::parse_str(user_id)
                .map_err(|_| MetadataError::Invalid(METADATA_USER_ID))?,
        })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    #[error("session metadata is missing `{0}`")]
    Missing(&'static str),
    #[error("session metadata has an invalid `{0}`")]
    Invalid(&'static str),
}

#[derive(Debug, Error)]
pub enum PaymentGatewayError {
    #[error("payment provider request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("unexpected payment provider response: {0}")]
    Decode(String),

    #[error("invalid payment provider base url: {0}")]
    BaseUrl(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentGatewayError>;

    /// `Ok(None)` when the provider does not know the session id
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, PaymentGatewayError>;
}

/// Converts a decimal price to minor currency units, rounding half away from zero
pub fn to_minor_units(price: Decimal) -> Option<i64> {
    (price.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
        * Decimal::ONE_HUNDRED)
        .to_i64()
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    fn session(metadata: &[(&str, &str)]) -> CheckoutSession {
        CheckoutSession {
            id: "cs_test_1".into(),
            url: None,
            payment_status: PaymentStatus::Paid,
            amount_total: Some(29900),
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn minor_units_round_half_away_from_zero() {
        assert_eq!(to_minor_units(dec!(299)), Some(29900));
        assert_eq!(to_minor_units(dec!(19.99)), Some(1999));
        assert_eq!(to_minor_units(dec!(0.105)), Some(11));
        assert_eq!(to_minor_units(dec!(0.104)), Some(10));
    }

    #[test]
    fn unknown_payment_status_deserializes() {
        let s: CheckoutSession = serde_json::from_str(
            r#"{"id":"cs_1","payment_status":"processing","metadata":{}}"#,
        )
        .unwrap();
        assert_eq!(s.payment_status, PaymentStatus::Unknown);
        assert!(!s.is_paid());
        assert_eq!(s.amount_total, None);
    }

    #[test]
    fn purchase_metadata_requires_every_key() {
        let product = Uuid::new_v4();
        let user = Uuid::new_v4();

        let full = session(&[
            ("product_id", &product.to_string()),
            ("purchase_type", "premium"),
            ("user_id", &user.to_string()),
        ]);
        let meta = full.purchase_metadata().unwrap();
        assert_eq!(meta.product_id, product);
        assert_eq!(meta.purchase_type, PurchaseType::Premium);
        assert_eq!(meta.user_id, user);

        let partial = session(&[("product_id", &product.to_string()), ("purchase_type", "basic")]);
        assert_matches!(
            partial.purchase_metadata(),
            Err(MetadataError::Missing("user_id"))
        );
        assert!(!partial.has_no_purchase_metadata());

        let bad_tier = session(&[
            ("product_id", &product.to_string()),
            ("purchase_type", "gold"),
            ("user_id", &user.to_string()),
        ]);
        assert_matches!(
            bad_tier.purchase_metadata(),
            Err(MetadataError::Invalid("purchase_type"))
        );

        assert!(session(&[]).has_no_purchase_metadata());
    }
}
