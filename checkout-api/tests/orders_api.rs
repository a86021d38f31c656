use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use checkout_api::{app, AppState};
use checkout_core::GatewayError;
use checkout_order::{CheckoutCoordinator, GatewayOp, MockPaymentGateway};
use checkout_pricing::{PricingConfig, PricingEngine};
use serde_json::{json, Value};
use tower::ServiceExt;

fn setup() -> (Router, Arc<MockPaymentGateway>) {
    let gateway = Arc::new(MockPaymentGateway::new());
    let pricing = PricingEngine::new(PricingConfig::default()).unwrap();
    let coordinator = Arc::new(CheckoutCoordinator::new(gateway.clone(), pricing));
    (app(AppState::new(coordinator)), gateway)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            builder = builder.header("content-type", "application/json");
            Body::from(body.to_string())
        }
        None => Body::empty(),
    };

    let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn create(app: &Router) -> String {
    let (status, body) = send(app, Method::POST, "/api/orders", Some(json!({ "cart": [{ "id": "product-1", "quantity": 1 }] }))).await;
    assert_eq!(status, StatusCode::CREATED);
    body["id"].as_str().unwrap().to_string()
}

async fn ship_to(app: &Router, order_id: &str, postal_code: &str) -> (StatusCode, Value) {
    send(
        app,
        Method::PATCH,
        &format!("/api/orders/{}", order_id),
        Some(json!({
            "shippingAddress": {
                "addressLine1": "1 Main St",
                "city": "Dallas",
                "state": "TX",
                "postalCode": postal_code,
                "countryCode": "US"
            }
        })),
    )
    .await
}

async fn capture(app: &Router, order_id: &str) -> String {
    let (status, body) = send(app, Method::POST, &format!("/api/orders/{}/capture", order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    body["purchase_units"][0]["payments"]["captures"][0]["id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_order_relays_provider_order() {
    let (app, _) = setup();

    let (status, body) = send(&app, Method::POST, "/api/orders", Some(json!({ "cart": [] }))).await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "CREATED");
    assert_eq!(body["purchase_units"][0]["amount"]["value"], "100.00");
    assert_eq!(body["purchase_units"][0]["amount"]["currency_code"], "USD");
}

#[tokio::test]
async fn test_unknown_product_is_rejected() {
    let (app, gateway) = setup();

    let (status, _) = send(&app, Method::POST, "/api/orders", Some(json!({ "cart": [{ "id": "nope" }] }))).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(gateway.calls(GatewayOp::CreateOrder), 0);
}

#[tokio::test]
async fn test_shipping_by_postal_code() {
    let (app, _) = setup();
    let order_id = create(&app).await;

    let (status, body) = ship_to(&app, &order_id, "75001").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["status"], "SHIPPING_SET");
    assert_eq!(body["shipping"]["value"], "5.00");
    assert_eq!(body["grandTotal"]["value"], "105.00");

    let (_, body) = ship_to(&app, &order_id, "99999").await;
    assert_eq!(body["grandTotal"]["value"], "115.00");
}

#[tokio::test]
async fn test_explicit_shipping_amount() {
    let (app, _) = setup();
    let order_id = create(&app).await;
    let uri = format!("/api/orders/{}", order_id);

    let (status, body) = send(&app, Method::PATCH, &uri, Some(json!({ "shippingAmount": "9.00" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["grandTotal"]["value"], "109.00");

    let (status, _) = send(&app, Method::PATCH, &uri, Some(json!({ "shippingAmount": 9.0 }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, Method::PATCH, &uri, Some(json!({ "shippingAmount": "-1.00" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, _) = send(&app, Method::PATCH, &uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_lifecycle() {
    let (app, gateway) = setup();
    let order_id = create(&app).await;
    ship_to(&app, &order_id, "75001").await;

    let capture_id = capture(&app, &order_id).await;

    // Second capture never reaches the provider
    let (status, body) = send(&app, Method::POST, &format!("/api/orders/{}/capture", order_id), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["from"], "CAPTURED");
    assert_eq!(gateway.calls(GatewayOp::CaptureOrder), 1);

    // Shipping is frozen after capture
    let (status, _) = ship_to(&app, &order_id, "10001").await;
    assert_eq!(status, StatusCode::CONFLICT);

    let refund_uri = format!("/api/captures/{}/refund", capture_id);

    let (status, _) = send(&app, Method::POST, &refund_uri, Some(json!({ "amount": "200.00" }))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(gateway.calls(GatewayOp::RefundCapture), 0);

    let (status, body) = send(&app, Method::POST, &refund_uri, Some(json!({ "amount": "5.00" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "COMPLETED");

    let (_, body) = send(&app, Method::GET, &format!("/api/orders/{}", order_id), None).await;
    assert_eq!(body["checkout"]["status"], "PARTIALLY_REFUNDED");
    assert_eq!(body["checkout"]["remaining_balance"]["value"], "100.00");

    // No body refunds whatever is left
    let (status, body) = send(&app, Method::POST, &refund_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["amount"]["value"], "100.00");

    let (status, body) = send(&app, Method::GET, &format!("/api/orders/{}", order_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], order_id.as_str());
    assert_eq!(body["checkout"]["status"], "REFUNDED");
    assert_eq!(body["checkout"]["refunded_total"]["value"], "105.00");

    let (status, _) = send(&app, Method::POST, &refund_uri, Some(json!({ "amount": "1.00" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_legacy_refund_route_accepts_order_or_capture_id() {
    let (app, _) = setup();
    let order_id = create(&app).await;
    let capture_id = capture(&app, &order_id).await;

    let (status, _) = send(&app, Method::POST, &format!("/api/orders/{}/refund", capture_id), Some(json!({ "amount": "10.00" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::POST, &format!("/api/orders/{}/refund", order_id), Some(json!({ "amount": "10.00" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app, Method::GET, &format!("/api/orders/{}", order_id), None).await;
    assert_eq!(body["checkout"]["refunded_total"]["value"], "20.00");
    assert_eq!(body["checkout"]["remaining_balance"]["value"], "80.00");
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let (app, gateway) = setup();

    let (status, _) = send(&app, Method::GET, "/api/orders/MISSING", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/api/orders/MISSING/capture", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, Method::POST, "/api/captures/MISSING/refund", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(gateway.calls(GatewayOp::CaptureOrder), 0);
    assert_eq!(gateway.calls(GatewayOp::RefundCapture), 0);
}

#[tokio::test]
async fn test_gateway_failures_surface_as_upstream_errors() {
    let (app, gateway) = setup();
    let order_id = create(&app).await;

    gateway.fail(GatewayOp::PatchOrder, GatewayError::Timeout("simulated".to_string()));
    let (status, _) = ship_to(&app, &order_id, "75001").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);

    // A failed patch leaves the order as it was
    let (_, body) = send(&app, Method::GET, &format!("/api/orders/{}", order_id), None).await;
    assert_eq!(body["checkout"]["status"], "CREATED");
    assert_eq!(body["checkout"]["grand_total"]["value"], "100.00");

    gateway.fail(
        GatewayOp::CaptureOrder,
        GatewayError::Provider {
            status: 422,
            message: "INSTRUMENT_DECLINED".to_string(),
            debug_id: Some("DBG-1".to_string()),
        },
    );
    let (status, body) = send(&app, Method::POST, &format!("/api/orders/{}/capture", order_id), None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["provider_status"], 422);
    assert_eq!(body["debug_id"], "DBG-1");

    gateway.recover(GatewayOp::CaptureOrder);
    capture(&app, &order_id).await;
}

#[tokio::test]
async fn test_oversized_amounts_are_unprocessable() {
    let (app, gateway) = setup();
    let order_id = create(&app).await;

    let (status, body) = send(
        &app,
        Method::PATCH,
        &format!("/api/orders/{}", order_id),
        Some(json!({ "shippingAmount": "79228162514264337593543950335" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("out of range"));
    assert_eq!(gateway.calls(GatewayOp::PatchOrder), 0);

    let capture_id = capture(&app, &order_id).await;
    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/captures/{}/refund", capture_id),
        Some(json!({ "amount": "1000000000000000.00" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(gateway.calls(GatewayOp::RefundCapture), 0);
}
