use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "MercuryHub API",
        version = "0.1.0",
        description = r#"
# MercuryHub Marketplace API

Checkout and purchase recording for the MercuryHub automation marketplace.

## Flow

1. `POST /checkout` opens a hosted checkout session for a product tier and returns its URL.
2. The buyer pays on the provider's page and lands on `/payment-success?session_id=...`.
3. `POST /verify-payment` confirms the session is paid and records the purchase once.
   Calling it again for the same session returns the same purchase.

## Authentication

Every endpoint except `/products` and `/health` needs an access token from the auth
provider in `Authorization: Bearer <token>`.

## Error Handling

Failures share one body shape:

```json
{
  "error": "Payment not completed",
  "code": "payment_not_completed",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-12-09T10:30:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Checkout", description = "Hosted checkout sessions"),
        (name = "Purchases", description = "Payment verification and buyer library"),
        (name = "Products", description = "Marketplace listing"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::handlers::checkout::create_checkout,
        crate::handlers::purchases::verify_payment,
        crate::handlers::purchases::create_purchase,
        crate::handlers::purchases::list_purchases,
        crate::handlers::products::list_products,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            crate::handlers::checkout::CheckoutRequest,
            crate::handlers::checkout::CheckoutResponse,
            crate::handlers::purchases::VerifyPaymentRequest,
            crate::handlers::purchases::VerifyPaymentResponse,
            crate::handlers::purchases::CreatePurchaseRequest,
            crate::handlers::purchases::CreatePurchaseResponse,
            crate::services::catalog::ProductSummary,
            crate::services::catalog::LibraryEntry,
            crate::entities::PurchaseType,
            crate::entities::ProductCategory,
            crate::handlers::health::HealthResponse,
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

/// Registers the `bearer_auth` scheme referenced by protected paths
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
