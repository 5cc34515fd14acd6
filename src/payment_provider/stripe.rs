use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

use super::{CheckoutSession, CreateCheckoutRequest, PaymentGateway, PaymentGatewayError};
use crate::config::AppConfig;

const RESOURCE_MISSING: &str = "resource_missing";

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeApiError,
}

#[derive(Debug, Deserialize)]
struct StripeApiError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Stripe Checkout over the REST API
#[derive(Clone)]
pub struct StripeGateway {
    client: Client,
    api_base: Url,
    secret_key: String,
}

impl std::fmt::Debug for StripeGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeGateway")
            .field("api_base", &self.api_base.as_str())
            .finish_non_exhaustive()
    }
}

impl StripeGateway {
    pub fn new(
        secret_key: impl Into<String>,
        api_base: &str,
        timeout: Duration,
    ) -> Result<Self, PaymentGatewayError> {
        let api_base =
            Url::parse(api_base).map_err(|e| PaymentGatewayError::BaseUrl(e.to_string()))?;
        if api_base.cannot_be_a_base() {
            return Err(PaymentGatewayError::BaseUrl(api_base.to_string()));
        }

        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            api_base,
            secret_key: secret_key.into(),
        })
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, PaymentGatewayError> {
        Self::new(
            cfg.stripe_secret_key.clone(),
            &cfg.stripe_api_base,
            cfg.stripe_timeout(),
        )
    }

    /// `{api_base}/v1/checkout/sessions[/{id}]`, with the id percent-encoded as one segment
    fn sessions_url(&self, session_id: Option<&str>) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["v1", "checkout", "sessions"]);
            if let Some(id) = session_id {
                segments.push(id);
            }
        }
        url
    }

    async fn api_error(response: reqwest::Response) -> (u16, Option<StripeApiError>) {
        let status = response.status().as_u16();
        let body = response.json::<StripeErrorBody>().await.ok().map(|b| b.error);
        (status, body)
    }

    async fn decode_session(
        response: reqwest::Response,
    ) -> Result<CheckoutSession, PaymentGatewayError> {
        response
            .json::<CheckoutSession>()
            .await
            .map_err(|e| PaymentGatewayError::Decode(e.to_string()))
    }
}

fn checkout_form(request: &CreateCheckoutRequest) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        (
            "line_items[0][price_data][currency]".to_string(),
            request.currency.to_lowercase(),
        ),
        (
            "line_items[0][price_data][unit_amount]".to_string(),
            request.amount_minor.to_string(),
        ),
        (
            "line_items[0][price_data][product_data][name]".to_string(),
            request.product_name.clone(),
        ),
        ("line_items[0][quantity]".to_string(), "1".to_string()),
        (
            "client_reference_id".to_string(),
            request.metadata.user_id.to_string(),
        ),
        ("success_url".to_string(), request.success_url.clone()),
        ("cancel_url".to_string(), request.cancel_url.clone()),
    ];
    form.extend(
        request
            .metadata
            .to_pairs()
            .into_iter()
            .map(|(key, value)| (format!("metadata[{key}]"), value)),
    );
    form
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    #[instrument(skip(self, request), fields(product_id = %request.metadata.product_id, amount = request.amount_minor))]
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentGatewayError> {
        let response = self
            .client
            .post(self.sessions_url(None))
            .bearer_auth(&self.secret_key)
            .form(&checkout_form(&request))
            .send()
            .await?;

        if !response.status().is_success() {
            let (status, err) = Self::api_error(response).await;
            let message = err
                .and_then(|e| e.message)
                .unwrap_or_else(|| "checkout session creation failed".to_string());
            warn!(status, %message, "Stripe rejected checkout session creation");
            return Err(PaymentGatewayError::Api { status, message });
        }

        let session = Self::decode_session(response).await?;
        debug!(session_id = %session.id, "checkout session created");
        Ok(session)
    }

    #[instrument(skip(self))]
    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, PaymentGatewayError> {
        let response = self
            .client
            .get(self.sessions_url(Some(session_id)))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            let (status, err) = Self::api_error(response).await;
            if err
                .as_ref()
                .and_then(|e| e.code.as_deref())
                .is_some_and(|code| code == RESOURCE_MISSING)
            {
                return Ok(None);
            }
            let message = err
                .and_then(|e| e.message)
                .unwrap_or_else(|| "checkout session lookup failed".to_string());
            warn!(status, %message, "Stripe rejected checkout session lookup");
            return Err(PaymentGatewayError::Api { status, message });
        }

        Self::decode_session(response).await.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::PurchaseType;
    use crate::payment_provider::{PaymentStatus, SessionMetadata};
    use assert_matches::assert_matches;
    use serde_json::json;
    use uuid::Uuid;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "sk_test_4eC39HqLyjWDarjtT1zdp7dc";

    fn gateway(server: &MockServer) -> StripeGateway {
        StripeGateway::new(KEY, &server.uri(), Duration::from_secs(2)).unwrap()
    }

    #[tokio::test]
    async fn create_posts_form_with_metadata() {
        let server = MockServer::start().await;
        let product_id = Uuid::new_v4();
        let user_id = Uuid::new_v4();

        Mock::given(method("POST"))
            .and(path("/v1/checkout/sessions"))
            .and(header("authorization", format!("Bearer {KEY}").as_str()))
            .and(body_string_contains("mode=payment"))
            .and(body_string_contains("unit_amount%5D=29900"))
            .and(body_string_contains(format!(
                "metadata%5Bproduct_id%5D={product_id}"
            )))
            .and(body_string_contains("metadata%5Bpurchase_type%5D=basic"))
            .and(body_string_contains(format!("client_reference_id={user_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_a1",
                "url": "https://checkout.stripe.com/c/pay/cs_test_a1",
                "payment_status": "unpaid",
                "amount_total": 29900,
                "metadata": {}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = gateway(&server)
            .create_checkout_session(CreateCheckoutRequest {
                product_name: "Lead scoring workflow".into(),
                amount_minor: 29900,
                currency: "PLN".into(),
                metadata: SessionMetadata {
                    product_id,
                    purchase_type: PurchaseType::Basic,
                    user_id,
                },
                success_url: "http://localhost:5173/payment-success?session_id={CHECKOUT_SESSION_ID}"
                    .into(),
                cancel_url: "http://localhost:5173/marketplace".into(),
            })
            .await
            .unwrap();

        assert_eq!(session.id, "cs_test_a1");
        assert_eq!(session.payment_status, PaymentStatus::Unpaid);
        assert!(session.url.is_some());
    }

    #[tokio::test]
    async fn retrieve_parses_paid_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_test_paid"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "cs_test_paid",
                "object": "checkout.session",
                "payment_status": "paid",
                "amount_total": 1999,
                "metadata": {"purchase_type": "premium"}
            })))
            .mount(&server)
            .await;

        let session = gateway(&server)
            .retrieve_checkout_session("cs_test_paid")
            .await
            .unwrap()
            .unwrap();
        assert!(session.is_paid());
        assert_eq!(session.amount_total, Some(1999));
        assert_eq!(session.metadata["purchase_type"], "premium");
    }

    #[tokio::test]
    async fn retrieve_maps_missing_resource_to_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/checkout/sessions/cs_gone"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": {"code": "resource_missing", "message": "No such checkout.session"}
            })))
            .mount(&server)
            .await;

        let found = gateway(&server)
            .retrieve_checkout_session("cs_gone")
            .await
            .unwrap();
        assert!(found.is_none());
        // unmatched paths fall through to wiremock's 404
        let found = gateway(&server)
            .retrieve_checkout_session("cs_unknown")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn provider_failure_is_an_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_json(json!({
                "error": {"message": "Something went wrong"}
            })))
            .mount(&server)
            .await;

        let err = gateway(&server)
            .retrieve_checkout_session("cs_test_1")
            .await
            .unwrap_err();
        assert_matches!(err, PaymentGatewayError::Api { status: 500, .. });
    }

    #[test]
    fn session_id_is_a_single_path_segment() {
        let gw = StripeGateway::new(KEY, "https://api.stripe.com/", Duration::from_secs(1))
            .unwrap();
        assert_eq!(
            gw.sessions_url(Some("cs/../../v1/charges")).as_str(),
            "https://api.stripe.com/v1/checkout/sessions/cs%2F..%2F..%2Fv1%2Fcharges"
        );
        assert!(StripeGateway::new(KEY, "not a url", Duration::from_secs(1)).is_err());
    }
}
