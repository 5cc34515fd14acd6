use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

use crate::auth::AuthUser;
use crate::entities::PurchaseType;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::{catalog::LibraryEntry, RecordedPurchase};
use crate::{ApiResponse, ApiResult};

const ALREADY_RECORDED: &str = "Purchase already recorded";

fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    if session_id.trim().is_empty() {
        let mut err = ValidationError::new("session_id");
        err.message = Some("Missing session_id".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({"session_id": "cs_test_a1b2c3"}))]
pub struct VerifyPaymentRequest {
    /// Checkout session id returned to the success page
    #[validate(length(max = 255), custom = "validate_session_id")]
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub purchase_id: Uuid,
    /// Present when the session had already been recorded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "product_id": "550e8400-e29b-41d4-a716-446655440000",
    "purchase_type": "premium",
    "stripe_session_id": "cs_test_a1b2c3"
}))]
pub struct CreatePurchaseRequest {
    pub product_id: Uuid,
    pub purchase_type: PurchaseType,
    #[validate(length(max = 255), custom = "validate_session_id")]
    pub stripe_session_id: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct CreatePurchaseResponse {
    pub success: bool,
    pub purchase_id: Uuid,
    pub product_id: Uuid,
    pub purchase_type: PurchaseType,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "Purchase already recorded")]
    pub message: Option<String>,
}

fn replay_message(recorded: &RecordedPurchase) -> Option<String> {
    (!recorded.newly_created).then(|| ALREADY_RECORDED.to_string())
}

/// Confirm a paid checkout session and record the purchase it carries
#[utoipa::path(
    post,
    path = "/verify-payment",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Purchase recorded (or already recorded)", body = VerifyPaymentResponse),
        (status = 400, description = "Invalid request body", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment not completed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Session belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown session or unavailable product", body = crate::errors::ErrorResponse),
        (status = 422, description = "Session metadata unusable", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Purchases"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<VerifyPaymentRequest>, JsonRejection>,
) -> Result<Json<VerifyPaymentResponse>, ServiceError> {
    let Json(request) = payload?;
    request.validate()?;

    let recorded = state
        .services
        .purchases
        .verify_payment(&user, request.session_id.trim())
        .await?;

    Ok(Json(VerifyPaymentResponse {
        success: true,
        purchase_id: recorded.purchase.id,
        message: replay_message(&recorded),
    }))
}

/// Record a purchase for an explicit product and tier, checking the charged amount
#[utoipa::path(
    post,
    path = "/create-purchase",
    request_body = CreatePurchaseRequest,
    responses(
        (status = 200, description = "Purchase recorded (or already recorded)", body = CreatePurchaseResponse),
        (status = 400, description = "Invalid request body", body = crate::errors::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse),
        (status = 402, description = "Payment not completed", body = crate::errors::ErrorResponse),
        (status = 403, description = "Session belongs to another user", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown session or unavailable product", body = crate::errors::ErrorResponse),
        (status = 409, description = "Charged amount does not match the tier price", body = crate::errors::ErrorResponse),
        (status = 422, description = "Session disagrees with the request", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment provider failure", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Purchases"
)]
pub async fn create_purchase(
    State(state): State<AppState>,
    user: AuthUser,
    payload: Result<Json<CreatePurchaseRequest>, JsonRejection>,
) -> Result<Json<CreatePurchaseResponse>, ServiceError> {
    let Json(request) = payload?;
    request.validate()?;

    let recorded = state
        .services
        .purchases
        .record_purchase(
            &user,
            request.product_id,
            request.purchase_type,
            request.stripe_session_id.trim(),
        )
        .await?;

    Ok(Json(CreatePurchaseResponse {
        success: true,
        purchase_id: recorded.purchase.id,
        product_id: recorded.purchase.product_id,
        purchase_type: recorded.purchase.purchase_type,
        message: replay_message(&recorded),
    }))
}

/// The caller's purchased products, newest first
#[utoipa::path(
    get,
    path = "/purchases",
    responses(
        (status = 200, description = "Purchase library", body = crate::ApiResponse<Vec<LibraryEntry>>),
        (status = 401, description = "Not authenticated", body = crate::errors::ErrorResponse)
    ),
    security(("bearer_auth" = [])),
    tag = "Purchases"
)]
pub async fn list_purchases(
    State(state): State<AppState>,
    user: AuthUser,
) -> ApiResult<Vec<LibraryEntry>> {
    let library = state.services.catalog.library(&user).await?;
    Ok(Json(ApiResponse::success(library)))
}

pub fn purchase_routes() -> Router<AppState> {
    Router::new()
        .route("/verify-payment", post(verify_payment))
        .route("/create-purchase", post(create_purchase))
        .route("/purchases", get(list_purchases))
}
