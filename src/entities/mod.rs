pub mod product;
pub mod purchase;

pub use product::{Entity as Product, ProductCategory, ProductStatus};
pub use purchase::{Entity as Purchase, PurchaseStatus, PurchaseType};
