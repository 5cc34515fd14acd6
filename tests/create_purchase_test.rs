mod common;

use axum::http::StatusCode;
use common::TestApp;
use mercuryhub_api::entities::{ProductStatus, PurchaseType};
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

fn body(product: Uuid, tier: &str, session: &str) -> serde_json::Value {
    json!({
        "product_id": product,
        "purchase_type": tier,
        "stripe_session_id": session,
    })
}

#[tokio::test]
async fn records_purchase_when_amount_matches() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Approved)
        .await;
    app.gateway.paid_session("cs_plain", Some(29900), &[]);

    let (status, resp) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(user)),
            body(product, "basic", "cs_plain"),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{resp}");
    assert_eq!(resp["success"], true);
    assert_eq!(resp["product_id"], product.to_string());
    assert_eq!(resp["purchase_type"], "basic");
    assert!(resp.get("message").is_none());
    assert_eq!(app.purchase_count("cs_plain").await, 1);

    let (status, replay) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(user)),
            body(product, "basic", "cs_plain"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay["purchase_id"], resp["purchase_id"]);
    assert_eq!(replay["message"], "Purchase already recorded");
    assert_eq!(app.purchase_count("cs_plain").await, 1);
}

#[tokio::test]
async fn charged_amount_must_match_claimed_tier() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Approved)
        .await;
    // paid the basic price but claims premium
    app.gateway.paid_session("cs_cheap", Some(29900), &[]);

    let (status, err) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(Uuid::new_v4())),
            body(product, "premium", "cs_cheap"),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(err["code"], "amount_mismatch");
    assert_eq!(
        err["error"],
        "Payment amount mismatch: expected 49900, charged 29900"
    );
    assert_eq!(app.purchase_count("cs_cheap").await, 0);
}

#[tokio::test]
async fn session_without_amount_is_malformed() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Approved)
        .await;
    app.gateway.paid_session("cs_no_total", None, &[]);

    let (status, err) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(Uuid::new_v4())),
            body(product, "basic", "cs_no_total"),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "malformed_session");
}

#[tokio::test]
async fn unapproved_product_cannot_be_recorded() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Pending)
        .await;
    app.gateway.paid_session("cs_pending", Some(29900), &[]);

    let (status, err) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(Uuid::new_v4())),
            body(product, "basic", "cs_pending"),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(err["code"], "product_unavailable");
    assert_eq!(app.purchase_count("cs_pending").await, 0);
}

#[tokio::test]
async fn both_paths_share_one_record_per_session() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let token = app.token_for(user);
    let product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Approved)
        .await;
    app.post(
        "/checkout",
        Some(&token),
        json!({"product_id": product, "purchase_type": "basic"}),
    )
    .await;
    app.gateway.mark_paid("cs_test_1");

    let (status, verified) = app
        .post("/verify-payment", Some(&token), json!({"session_id": "cs_test_1"}))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, created) = app
        .post(
            "/create-purchase",
            Some(&token),
            body(product, "basic", "cs_test_1"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["purchase_id"], verified["purchase_id"]);
    assert_eq!(created["message"], "Purchase already recorded");
    assert_eq!(app.purchase_count("cs_test_1").await, 1);
}

#[tokio::test]
async fn claim_that_contradicts_session_metadata_is_rejected() {
    let app = TestApp::new().await;
    let user = Uuid::new_v4();
    let product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Approved)
        .await;
    let other_product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Approved)
        .await;
    app.gateway.paid_session(
        "cs_meta",
        Some(29900),
        &TestApp::metadata(product, PurchaseType::Basic, user),
    );

    let (status, err) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(user)),
            body(other_product, "basic", "cs_meta"),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "malformed_session");

    let (status, err) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(user)),
            body(product, "premium", "cs_meta"),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(err["code"], "malformed_session");
    assert_eq!(app.purchase_count("cs_meta").await, 0);
}

#[tokio::test]
async fn session_paid_by_someone_else_is_forbidden() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Approved)
        .await;
    app.gateway.paid_session(
        "cs_owned",
        Some(29900),
        &TestApp::metadata(product, PurchaseType::Basic, owner),
    );

    let (status, err) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(Uuid::new_v4())),
            body(product, "basic", "cs_owned"),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["code"], "user_mismatch");
    assert_eq!(app.purchase_count("cs_owned").await, 0);
}

#[tokio::test]
async fn replay_by_another_user_is_forbidden() {
    let app = TestApp::new().await;
    let product = app
        .seed_product(dec!(299), dec!(499), ProductStatus::Approved)
        .await;
    app.gateway.paid_session("cs_first", Some(29900), &[]);

    let (status, _) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(Uuid::new_v4())),
            body(product, "basic", "cs_first"),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, err) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(Uuid::new_v4())),
            body(product, "basic", "cs_first"),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(err["code"], "user_mismatch");
    assert_eq!(app.purchase_count("cs_first").await, 1);
}

#[tokio::test]
async fn malformed_body_is_a_bad_request() {
    let app = TestApp::new().await;
    let (status, err) = app
        .post(
            "/create-purchase",
            Some(&app.token_for(Uuid::new_v4())),
            json!({"product_id": "not-a-uuid", "purchase_type": "basic", "stripe_session_id": "cs_x"}),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], "validation_error");
}
