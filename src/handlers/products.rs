use axum::{extract::State, routing::get, Json, Router};

use crate::handlers::AppState;
use crate::services::catalog::ProductSummary;
use crate::{ApiResponse, ApiResult};

/// Approved products, best sellers first
#[utoipa::path(
    get,
    path = "/products",
    responses(
        (status = 200, description = "Marketplace listing", body = crate::ApiResponse<Vec<ProductSummary>>)
    ),
    tag = "Products"
)]
pub async fn list_products(
    State(state): State<AppState>,
) -> ApiResult<Vec<ProductSummary>> {
    let products = state.services.catalog.marketplace().await?;
    Ok(Json(ApiResponse::success(products)))
}

pub fn product_routes() -> Router<AppState> {
    Router::new().route("/products", get(list_products))
}
