use chrono::Utc;
use sea_orm::{
    sea_query::OnConflict, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, SqlErr,
};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::entities::product::{Entity as Product, Model as ProductModel};
use crate::entities::purchase::{
    ActiveModel as PurchaseActiveModel, Column, Entity as Purchase, Model as PurchaseModel,
    PurchaseStatus, PurchaseType,
};
use crate::errors::ServiceError;
use crate::repositories::Repository;

use super::BaseRepository;

/// Result of an insert that tolerates an existing row for the same session
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(PurchaseModel),
    /// Another writer recorded this session first; carries the stored row
    Existing(PurchaseModel),
}

#[derive(Debug, Clone)]
pub struct NewPurchase {
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub purchase_type: PurchaseType,
    pub stripe_payment_id: String,
}

/// Repository for purchase records
#[derive(Debug, Clone)]
pub struct PurchaseRepository {
    base: BaseRepository,
}

fn is_duplicate(err: &DbErr) -> bool {
    matches!(err, DbErr::RecordNotInserted)
        || matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

impl PurchaseRepository {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            base: BaseRepository::new(db),
        }
    }

    /// Find the purchase recorded for a checkout session
    pub async fn find_by_payment_id(
        &self,
        stripe_payment_id: &str,
    ) -> Result<Option<PurchaseModel>, ServiceError> {
        Ok(Purchase::find()
            .filter(Column::StripePaymentId.eq(stripe_payment_id))
            .one(self.base.get_db())
            .await?)
    }

    /// Inserts a completed purchase unless the session already has one.
    ///
    /// The unique index on `stripe_payment_id` decides the winner; the loser
    /// reads back whatever row is stored.
    pub async fn insert_if_absent(&self, new: NewPurchase) -> Result<InsertOutcome, ServiceError> {
        let model = PurchaseModel {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            product_id: new.product_id,
            purchase_type: new.purchase_type,
            stripe_payment_id: new.stripe_payment_id,
            status: PurchaseStatus::Completed,
            created_at: Utc::now(),
        };

        let active = PurchaseActiveModel {
            id: Set(model.id),
            user_id: Set(model.user_id),
            product_id: Set(model.product_id),
            purchase_type: Set(model.purchase_type),
            stripe_payment_id: Set(model.stripe_payment_id.clone()),
            status: Set(model.status),
            created_at: Set(model.created_at),
        };

        let inserted = Purchase::insert(active)
            .on_conflict(
                OnConflict::column(Column::StripePaymentId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.base.get_db())
            .await;

        match inserted {
            Ok(rows) if rows > 0 => return Ok(InsertOutcome::Inserted(model)),
            Ok(_) => {}
            Err(e) if is_duplicate(&e) => {}
            Err(e) => return Err(e.into()),
        }

        debug!(stripe_payment_id = %model.stripe_payment_id, "purchase already recorded by a concurrent writer");
        let existing = self
            .find_by_payment_id(&model.stripe_payment_id)
            .await?
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "purchase for session {} conflicted but could not be read back",
                    model.stripe_payment_id
                ))
            })?;
        Ok(InsertOutcome::Existing(existing))
    }

    /// Completed purchases of a user with their products, newest first
    pub async fn list_completed_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<(PurchaseModel, Option<ProductModel>)>, ServiceError> {
        Ok(Purchase::find()
            .filter(Column::UserId.eq(user_id))
            .filter(Column::Status.eq(PurchaseStatus::Completed))
            .find_also_related(Product)
            .order_by_desc(Column::CreatedAt)
            .all(self.base.get_db())
            .await?)
    }

    pub async fn count_for_session(&self, stripe_payment_id: &str) -> Result<u64, ServiceError> {
        Ok(Purchase::find()
            .filter(Column::StripePaymentId.eq(stripe_payment_id))
            .count(self.base.get_db())
            .await?)
    }
}
