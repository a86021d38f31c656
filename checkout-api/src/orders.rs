use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use checkout_core::{Address, CartItem};
use checkout_shared::money::parse_amount;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub cart: Vec<CartItem>,
}

/// Either an address to price, or an explicit amount as a decimal string.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateShippingRequest {
    pub shipping_address: Option<Address>,
    pub shipping_amount: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    pub amount: Option<Value>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/orders", post(create_order))
        .route("/api/orders/{order_id}", get(get_order).patch(update_shipping))
        .route("/api/orders/{order_id}/capture", post(capture_order))
        .route("/api/orders/{order_id}/refund", post(refund_order))
        .route("/api/captures/{capture_id}/refund", post(refund_capture))
}

/// Amounts travel as decimal strings; a JSON number would already have been
/// through a binary float, so it is refused.
fn amount_from(value: Option<&Value>) -> Result<Option<Decimal>, AppError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(raw)) => parse_amount(raw).map(Some).map_err(|e| AppError::invalid_amount(e.to_string())),
        Some(_) => Err(AppError::invalid_amount("amounts must be sent as decimal strings, e.g. \"9.00\"")),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/orders
async fn create_order(
    State(state): State<AppState>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let created = state.coordinator.create(&req.cart).await?;
    Ok((StatusCode::CREATED, Json(created.remote.raw)))
}

/// GET /api/orders/:id
/// Provider representation, plus our own view under `checkout` when we track the order
async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let remote = state.coordinator.remote_order(&order_id).await?;
    let mut body = remote.raw;

    if let Ok(local) = state.coordinator.get(&order_id).await {
        if let Value::Object(map) = &mut body {
            let snapshot = serde_json::to_value(local).map_err(anyhow::Error::from)?;
            map.insert("checkout".to_string(), snapshot);
        }
    }

    Ok(Json(body))
}

/// PATCH /api/orders/:id
async fn update_shipping(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    Json(req): Json<UpdateShippingRequest>,
) -> Result<Json<Value>, AppError> {
    let order = match (req.shipping_address, amount_from(req.shipping_amount.as_ref())?) {
        (Some(address), None) => state.coordinator.set_shipping(&order_id, address).await?,
        (None, Some(amount)) => state.coordinator.set_shipping_amount(&order_id, amount).await?,
        (Some(_), Some(_)) => {
            return Err(AppError::BadRequest("send either shippingAddress or shippingAmount, not both".to_string()))
        }
        (None, None) => return Err(AppError::BadRequest("shippingAddress or shippingAmount is required".to_string())),
    };

    Ok(Json(json!({
        "success": true,
        "status": order.status,
        "shipping": order.shipping_amount,
        "grandTotal": order.grand_total,
    })))
}

/// POST /api/orders/:id/capture
async fn capture_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.coordinator.capture(&order_id).await?;
    Ok(Json(outcome.raw))
}

/// POST /api/captures/:capture_id/refund
async fn refund_capture(
    State(state): State<AppState>,
    Path(capture_id): Path<String>,
    body: Option<Json<RefundRequest>>,
) -> Result<Json<Value>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    refund(&state, &capture_id, req).await
}

/// POST /api/orders/:id/refund
/// Older clients post a capture id here; an order id works too.
async fn refund_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<RefundRequest>>,
) -> Result<Json<Value>, AppError> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let capture_id = state.coordinator.resolve_capture(&id).await?;
    refund(&state, &capture_id, req).await
}

async fn refund(state: &AppState, capture_id: &str, req: RefundRequest) -> Result<Json<Value>, AppError> {
    let amount = amount_from(req.amount.as_ref())?;
    let outcome = state.coordinator.refund(capture_id, amount).await?;
    Ok(Json(outcome.raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_amount_parsing() {
        assert_eq!(amount_from(None).unwrap(), None);
        assert_eq!(amount_from(Some(&Value::Null)).unwrap(), None);
        assert_eq!(amount_from(Some(&json!("10.50"))).unwrap(), Some(Decimal::new(1050, 2)));
        assert!(amount_from(Some(&json!(10.5))).is_err());
        assert!(amount_from(Some(&json!("ten"))).is_err());
        assert!(amount_from(Some(&json!("1.001"))).is_err());
    }
}
