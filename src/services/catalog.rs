use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{product, ProductCategory, PurchaseType},
    errors::ServiceError,
    repositories::{ProductRepository, PurchaseRepository},
};

/// Public marketplace listing entry; download links are reserved for buyers
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductSummary {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub price_basic: Decimal,
    pub price_premium: Decimal,
    pub category: ProductCategory,
    pub tags: Vec<String>,
    pub creator_id: Uuid,
    pub sales_count: i32,
    pub rating: Option<Decimal>,
    pub created_at: DateTime<Utc>,
}

impl From<product::Model> for ProductSummary {
    fn from(p: product::Model) -> Self {
        let tags = p.tag_list();
        Self {
            id: p.id,
            name: p.name,
            description: p.description,
            price_basic: p.price_basic,
            price_premium: p.price_premium,
            category: p.category,
            tags,
            creator_id: p.creator_id,
            sales_count: p.sales_count,
            rating: p.rating,
            created_at: p.created_at,
        }
    }
}

/// A purchase in the buyer's library
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LibraryEntry {
    pub purchase_id: Uuid,
    pub product_id: Uuid,
    pub purchase_type: PurchaseType,
    pub purchased_at: DateTime<Utc>,
    pub name: String,
    pub description: Option<String>,
    pub json_file_url: Option<String>,
    pub instructions_url: Option<String>,
    /// Premium buyers can book a guided setup
    pub includes_guided_setup: bool,
}

#[derive(Clone)]
pub struct CatalogService {
    products: ProductRepository,
    purchases: PurchaseRepository,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self {
            products: ProductRepository::new(db_pool.clone()),
            purchases: PurchaseRepository::new(db_pool),
        }
    }

    #[instrument(skip(self))]
    pub async fn marketplace(&self) -> Result<Vec<ProductSummary>, ServiceError> {
        let products = self.products.list_approved().await?;
        Ok(products.into_iter().map(ProductSummary::from).collect())
    }

    /// Completed purchases of the caller, newest first
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn library(&self, user: &AuthUser) -> Result<Vec<LibraryEntry>, ServiceError> {
        let rows = self.purchases.list_completed_for_user(user.user_id).await?;

        Ok(rows
            .into_iter()
            .filter_map(|(purchase, product)| {
                let product = product?;
                Some(LibraryEntry {
                    purchase_id: purchase.id,
                    product_id: product.id,
                    purchase_type: purchase.purchase_type,
                    purchased_at: purchase.created_at,
                    name: product.name,
                    description: product.description,
                    json_file_url: product.json_file_url,
                    instructions_url: product.instructions_url,
                    includes_guided_setup: purchase.purchase_type == PurchaseType::Premium,
                })
            })
            .collect())
    }
}
