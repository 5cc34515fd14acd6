// Checkout and purchase recording
pub mod checkout;
pub mod purchases;

// Marketplace listing and buyer library
pub mod catalog;

pub use catalog::CatalogService;
pub use checkout::CheckoutService;
pub use purchases::{ClaimSource, PurchaseService, RecordedPurchase};
