mod common;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::*;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use unlock_engine::domain::ports::UnlockStore;
use unlock_engine::domain::unlock::{PaymentMethod, StatusKind};
use unlock_engine::interfaces::http::{AppState, build_router};

fn app(h: &Harness) -> Router {
    build_router(AppState::new(h.orchestrator.clone()))
}

fn get(uri: &str, user: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, user: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let h = harness().await;
    let response = app(&h).oneshot(get("/health", None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_guest_routes_require_caller() {
    let h = harness().await;

    let (status, body) = send(app(&h), get("/unlocks", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_initiate_then_resume() {
    let h = harness().await;
    let body = json!({
        "property_id": STUDIO,
        "payment_method": "non_refundable_fee",
        "payment_provider": "MTN_RW",
        "phone_number": PHONE,
    });

    let (created, first) = send(app(&h), post("/unlocks/initiate", Some(GUEST), body.clone())).await;
    assert_eq!(created, StatusCode::CREATED);
    assert_eq!(first["data"]["resumed"], false);
    assert_eq!(first["data"]["unlock"]["status"], "SUBMITTED");
    assert_eq!(first["data"]["unlock"]["payment"]["currency"], "RWF");

    let (resumed, second) = send(app(&h), post("/unlocks/initiate", Some(GUEST), body)).await;
    assert_eq!(resumed, StatusCode::OK);
    assert_eq!(second["data"]["resumed"], true);
    assert_eq!(
        second["data"]["unlock"]["unlock_id"],
        first["data"]["unlock"]["unlock_id"]
    );

    let (_, listed) = send(app(&h), get("/unlocks", Some(GUEST))).await;
    assert_eq!(listed["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_domain_errors_map_to_status_codes() {
    let h = harness().await;

    let (status, body) = send(
        app(&h),
        post(
            "/unlocks/initiate",
            Some(GUEST),
            json!({
                "property_id": STUDIO,
                "payment_method": "non_refundable_fee",
                "payment_provider": "MTN_RW",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MISSING_PHONE_NUMBER");

    let (status, body) = send(
        app(&h),
        post(
            "/unlocks/initiate",
            Some(GUEST),
            json!({
                "property_id": CABIN,
                "payment_method": "three_month_30_percent",
                "payment_provider": "MTN_RW",
                "phone_number": PHONE,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "METHOD_NOT_SUPPORTED");

    let (status, body) = send(
        app(&h),
        post(
            "/unlocks/not-a-uuid/appreciation",
            Some(GUEST),
            json!({ "level": "neutral" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "UNLOCK_NOT_FOUND");
}

#[tokio::test]
async fn test_status_and_other_users_records() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;

    let (status, body) = send(app(&h), get(&format!("/unlocks/{VILLA}/status"), Some(GUEST))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "unlocked");
    assert_eq!(body["data"]["property"]["host_contact_info"]["email"], "host@example.com");

    let (status, body) = send(
        app(&h),
        post(
            &format!("/unlocks/{}/cancel", unlock.unlock_id),
            Some(OTHER_GUEST),
            json!({}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_feedback_code_and_validation_endpoints() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;

    let (status, body) = send(
        app(&h),
        post(
            &format!("/unlocks/{}/appreciation", unlock.unlock_id),
            Some(GUEST),
            json!({ "level": "not_appreciated", "feedback": "noisy street" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let code = body["data"]["deal_code"]["code"].as_str().unwrap().to_string();

    let (_, valid) = send(app(&h), get(&format!("/deal-codes/{code}/validate"), Some(GUEST))).await;
    assert_eq!(valid["data"]["valid"], true);

    let (status, foreign) = send(
        app(&h),
        get(&format!("/deal-codes/{code}/validate"), Some(OTHER_GUEST)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(foreign["data"]["valid"], false);
    assert_eq!(foreign["data"]["reason"], "not_owner");

    let (_, codes) = send(app(&h), get("/deal-codes", Some(GUEST))).await;
    assert_eq!(codes["data"].as_array().unwrap().len(), 1);

    let (status, again) = send(
        app(&h),
        post(
            &format!("/unlocks/{}/appreciation", unlock.unlock_id),
            Some(GUEST),
            json!({ "level": "neutral" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(again["code"], "ALREADY_APPRECIATED");
}

#[tokio::test]
async fn test_booking_endpoint() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;

    let (status, body) = send(
        app(&h),
        post(
            &format!("/unlocks/{}/booking", unlock.unlock_id),
            Some(GUEST),
            json!({ "check_in": "2026-11-01", "guests": 2 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["check_out"], "2027-02-01");
    assert!(body["data"]["booking_id"].as_str().unwrap().starts_with("BK-"));
}

#[tokio::test]
async fn test_payment_callback_always_acknowledges() {
    let h = harness().await;
    let outcome = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(STUDIO, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();
    let reference = outcome.unlock.transaction_reference;

    let (status, body) = send(
        app(&h),
        post(
            "/webhooks/payment-callback",
            None,
            json!({ "depositId": reference, "status": "COMPLETED" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true, "outcome": "applied" }));

    let (_, replay) = send(
        app(&h),
        post(
            "/webhooks/payment-callback",
            None,
            json!({ "depositId": reference, "status": "COMPLETED" }),
        ),
    )
    .await;
    assert_eq!(replay["outcome"], "duplicate");

    let (status, garbage) = send(
        app(&h),
        post("/webhooks/payment-callback", None, json!({ "hello": "world" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(garbage["outcome"], "rejected");

    let (_, unknown) = send(
        app(&h),
        post(
            "/webhooks/payment-callback",
            None,
            json!({ "refid": "XP-9999", "status": "PAID" }),
        ),
    )
    .await;
    assert_eq!(unknown["outcome"], "not_found");

    assert_eq!(h.outbox.sent().await.len(), 1);
}

#[tokio::test]
async fn test_payment_callback_requires_configured_secret() {
    let h = harness().await;
    let outcome = h
        .orchestrator
        .initiate_unlock_payment(GUEST, wallet_request(STUDIO, PaymentMethod::NonRefundableFee))
        .await
        .unwrap();
    let reference = outcome.unlock.transaction_reference;
    let guarded = || build_router(AppState::new(h.orchestrator.clone()).with_callback_secret("s3cret"));
    let callback = |token: Option<&str>| {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhooks/payment-callback")
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("x-callback-token", token);
        }
        builder
            .body(Body::from(
                json!({ "depositId": reference, "status": "COMPLETED" }).to_string(),
            ))
            .unwrap()
    };

    let (status, missing) = send(guarded(), callback(None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(missing["outcome"], "rejected");
    let (_, wrong) = send(guarded(), callback(Some("guess"))).await;
    assert_eq!(wrong["outcome"], "rejected");

    let stored = h.repository.find_unlock(GUEST, STUDIO).await.unwrap().unwrap();
    assert_eq!(stored.kind(), StatusKind::Submitted);
    assert!(h.outbox.sent().await.is_empty());

    let (_, signed) = send(guarded(), callback(Some("s3cret"))).await;
    assert_eq!(signed["outcome"], "applied");
}

#[tokio::test]
async fn test_refunds_endpoint() {
    let h = harness().await;
    let unlock = h
        .completed_unlock(GUEST, VILLA, PaymentMethod::ThreeMonth30Percent)
        .await;

    let (_, empty) = send(app(&h), get("/refunds", Some(GUEST))).await;
    assert_eq!(empty["data"], json!([]));

    let (status, _) = send(
        app(&h),
        post(&format!("/unlocks/{}/cancel", unlock.unlock_id), Some(GUEST), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, refunds) = send(app(&h), get("/refunds", Some(GUEST))).await;
    assert_eq!(status, StatusCode::OK);
    let refunds = refunds["data"].as_array().unwrap();
    assert_eq!(refunds.len(), 1);
    assert_eq!(refunds[0]["status"], "pending");
    assert_eq!(refunds[0]["unlock_id"], unlock.unlock_id.to_string());

    let (_, other) = send(app(&h), get("/refunds", Some(OTHER_GUEST))).await;
    assert_eq!(other["data"], json!([]));
}
