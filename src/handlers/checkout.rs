use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::entities::PurchaseType;
use crate::errors::ServiceError;
use crate::handlers::AppState;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "product_id": "550e8400-e29b-41d4-a716-446655440000",
    "purchase_type": "basic"
}))]
pub struct CheckoutRequest {
    /// Product to buy
    pub product_id: Uuid,
    /// Tier to buy (basic or premium)
    pub purchase_type: PurchaseType,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CheckoutResponse {
    /// Hosted checkout page to redirect the buyer to
    #[schema(example = "https://checkout.stripe.com/c/pay/cs_test_a1b2c3")]
    pub url: String,
}

/// Start a hosted checkout for a product tier
#[utoipa::path(
    post,
    path = "/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Checkout session created", body = CheckoutResponse),
        (status = 400, description = "Invalid request body", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not available", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Checkout"
)]
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutResponse>, ServiceError> {
    let Json(request) = payload?;

    let url = state
        .services
        .checkout
        .start_checkout(&user, request.product_id, request.purchase_type)
        .await?;

    Ok(Json(CheckoutResponse { url }))
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/checkout", post(create_checkout))
}
