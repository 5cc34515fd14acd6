#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use serde_json::Value;
use tower::ServiceExt;
use uuid::Uuid;

use mercuryhub_api::{
    auth::Claims,
    config::AppConfig,
    db,
    entities::{product, ProductCategory, ProductStatus, PurchaseType},
    payment_provider::{
        CheckoutSession, CreateCheckoutRequest, PaymentGateway, PaymentGatewayError,
        PaymentStatus,
    },
    repositories::PurchaseRepository,
    AppState,
};

pub const JWT_SECRET: &str = "test_secret_key_for_testing_purposes_only_32chars";

/// In-process stand-in for the card processor
#[derive(Default)]
pub struct FakeGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    created: Mutex<Vec<CreateCheckoutRequest>>,
    counter: AtomicUsize,
    failing: AtomicBool,
}

impl FakeGateway {
    /// Make every call fail as if the provider were down
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn put_session(&self, session: CheckoutSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    /// Simulates the buyer completing payment on the hosted page
    pub fn mark_paid(&self, session_id: &str) {
        if let Some(s) = self.sessions.lock().unwrap().get_mut(session_id) {
            s.payment_status = PaymentStatus::Paid;
        }
    }

    /// Registers an already-paid session with arbitrary metadata
    pub fn paid_session(&self, id: &str, amount_total: Option<i64>, metadata: &[(&str, String)]) {
        self.put_session(CheckoutSession {
            id: id.to_string(),
            url: None,
            payment_status: PaymentStatus::Paid,
            amount_total,
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        });
    }

    pub fn created_requests(&self) -> Vec<CreateCheckoutRequest> {
        self.created.lock().unwrap().clone()
    }

    fn check_up(&self) -> Result<(), PaymentGatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PaymentGatewayError::Api {
                status: 500,
                message: "api_key sk_test_secret rejected".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentGatewayError> {
        self.check_up()?;
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{n}");
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.stripe.com/c/pay/{id}")),
            payment_status: PaymentStatus::Unpaid,
            amount_total: Some(request.amount_minor),
            metadata: request
                .metadata
                .to_pairs()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        };
        self.put_session(session.clone());
        self.created.lock().unwrap().push(request);
        Ok(session)
    }

    async fn retrieve_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSession>, PaymentGatewayError> {
        self.check_up()?;
        Ok(self.sessions.lock().unwrap().get(session_id).cloned())
    }
}

/// Helper harness for spinning up the application backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "sk_test_fake".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );
        // A single connection keeps every query on the same in-memory database
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.app_base_url = "https://mercuryhub.example".to_string();

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let gateway = Arc::new(FakeGateway::default());
        let state = AppState::new(Arc::new(pool), cfg, gateway.clone());
        let router = mercuryhub_api::build_router(state.clone()).expect("router builds");

        Self {
            router,
            state,
            gateway,
        }
    }

    /// Mints an access token the way the auth provider would
    pub fn token_for(&self, user_id: Uuid) -> String {
        let now = Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            aud: "authenticated".to_string(),
            exp: now + 3600,
            iat: Some(now),
            iss: None,
            email: Some(format!("{user_id}@example.com")),
            role: Some("authenticated".to_string()),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
        )
        .expect("token encodes")
    }

    pub async fn seed_product(&self, basic: Decimal, premium: Decimal, status: ProductStatus) -> Uuid {
        self.seed_product_with_sales(basic, premium, status, 0).await
    }

    pub async fn seed_product_with_sales(
        &self,
        basic: Decimal,
        premium: Decimal,
        status: ProductStatus,
        sales_count: i32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        product::ActiveModel {
            id: Set(id),
            name: Set(format!("Automation {}", &id.to_string()[..8])),
            description: Set(Some("n8n workflow with setup guide".into())),
            price_basic: Set(basic),
            price_premium: Set(premium),
            category: Set(ProductCategory::Crm),
            tags: Set(Some("crm,leads".into())),
            status: Set(status),
            creator_id: Set(Uuid::new_v4()),
            sales_count: Set(sales_count),
            rating: Set(None),
            json_file_url: Set(Some(format!("https://files.example/{id}.json"))),
            instructions_url: Set(Some(format!("https://files.example/{id}.pdf"))),
            created_at: Set(Utc::now()),
            updated_at: Set(Utc::now()),
        }
        .insert(self.state.db.as_ref())
        .await
        .expect("seed product");
        id
    }

    pub async fn set_product_status(&self, id: Uuid, status: ProductStatus) {
        let existing = product::Entity::find_by_id(id)
            .one(self.state.db.as_ref())
            .await
            .expect("query product")
            .expect("product exists");
        let mut active: product::ActiveModel = existing.into();
        active.status = Set(status);
        active
            .update(self.state.db.as_ref())
            .await
            .expect("update product");
    }

    pub async fn purchase_count(&self, session_id: &str) -> u64 {
        PurchaseRepository::new(self.state.db.clone())
            .count_for_session(session_id)
            .await
            .expect("count purchases")
    }

    /// Metadata pairs as the checkout step writes them
    pub fn metadata(product_id: Uuid, tier: PurchaseType, user_id: Uuid) -> Vec<(&'static str, String)> {
        vec![
            ("product_id", product_id.to_string()),
            ("purchase_type", tier.to_string()),
            ("user_id", user_id.to_string()),
        ]
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let (status, _, body) = self.request_raw(method, path, token, body).await;
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, axum::http::HeaderMap, axum::body::Bytes) {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request builds");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router responds");
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        (status, headers, bytes)
    }

    pub async fn post(&self, path: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, path, token, Some(body)).await
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, path, token, None).await
    }
}
