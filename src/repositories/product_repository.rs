use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use std::sync::Arc;
use uuid::Uuid;

use crate::entities::product::{Column, Entity as Product, Model as ProductModel, ProductStatus};
use crate::errors::ServiceError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Read-only access to the product catalog
#[derive(Debug, Clone)]
pub struct ProductRepository {
    base: BaseRepository,
}

impl ProductRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find a product by ID
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<ProductModel>, ServiceError> {
        Ok(Product::find_by_id(id).one(self.base.get_db()).await?)
    }

    /// Approved products, best sellers first
    pub async fn list_approved(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(Product::find()
            .filter(Column::Status.eq(ProductStatus::Approved))
            .order_by_desc(Column::SalesCount)
            .order_by_desc(Column::CreatedAt)
            .all(self.base.get_db())
            .await?)
    }
}
