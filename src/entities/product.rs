use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::purchase::PurchaseType;

/// Marketplace product listed by a developer
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    /// Price of the basic tier (file download only)
    pub price_basic: Decimal,

    /// Price of the premium tier (download plus guided setup)
    pub price_premium: Decimal,

    pub category: ProductCategory,

    /// Tags for the product (comma-separated)
    #[sea_orm(column_type = "Text", nullable)]
    pub tags: Option<String>,

    /// Moderation status; only approved products can be bought
    pub status: ProductStatus,

    /// Owning developer
    pub creator_id: Uuid,

    pub sales_count: i32,

    pub rating: Option<Decimal>,

    pub json_file_url: Option<String>,

    pub instructions_url: Option<String>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// Price charged for the given tier
    pub fn price_for(&self, tier: PurchaseType) -> Decimal {
        match tier {
            PurchaseType::Basic => self.price_basic,
            PurchaseType::Premium => self.price_premium,
        }
    }

    pub fn is_purchasable(&self) -> bool {
        self.status == ProductStatus::Approved
    }

    /// Splits the stored comma-separated tags, dropping blanks and duplicates
    pub fn tag_list(&self) -> Vec<String> {
        let mut tags: Vec<String> = Vec::new();
        for tag in self.tags.as_deref().unwrap_or_default().split(',') {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        tags
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase::Entity")]
    Purchases,
}

impl Related<super::purchase::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Purchases.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Product moderation status
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter, DeriveActiveEnum, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "lowercase")]
pub enum ProductCategory {
    #[sea_orm(string_value = "crm")]
    Crm,
    #[sea_orm(string_value = "marketing")]
    Marketing,
    #[sea_orm(string_value = "sales")]
    Sales,
    #[sea_orm(string_value = "hr")]
    Hr,
    #[sea_orm(string_value = "other")]
    Other,
}
