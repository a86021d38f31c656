use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use checkout_core::GatewayError;
use checkout_order::CheckoutError;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Checkout(CheckoutError),
    BadRequest(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    pub fn invalid_amount(msg: impl Into<String>) -> Self {
        AppError::Checkout(CheckoutError::InvalidAmount(msg.into()))
    }
}

fn gateway_status(err: &GatewayError) -> StatusCode {
    match err {
        GatewayError::Provider { status, .. } => StatusCode::from_u16(*status)
            .ok()
            .filter(|s| s.is_client_error() || s.is_server_error())
            .unwrap_or(StatusCode::BAD_GATEWAY),
        GatewayError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        GatewayError::Transport(_) | GatewayError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Checkout(err) => {
                let message = err.to_string();
                match err {
                    CheckoutError::NotFound(_) => (StatusCode::NOT_FOUND, json!({ "error": message })),
                    CheckoutError::InvalidTransition { from, to } => (
                        StatusCode::CONFLICT,
                        json!({ "error": message, "from": from, "to": to }),
                    ),
                    CheckoutError::InvalidAmount(_) | CheckoutError::InvalidCart(_) => {
                        (StatusCode::UNPROCESSABLE_ENTITY, json!({ "error": message }))
                    }
                    CheckoutError::CaptureNotCompleted { order_id, capture_id, status } => (
                        StatusCode::PAYMENT_REQUIRED,
                        json!({ "error": message, "order_id": order_id, "capture_id": capture_id, "status": status }),
                    ),
                    CheckoutError::RefundNotCompleted { capture_id, refund_id, status } => (
                        StatusCode::PAYMENT_REQUIRED,
                        json!({ "error": message, "capture_id": capture_id, "refund_id": refund_id, "status": status }),
                    ),
                    CheckoutError::Gateway(err) => {
                        tracing::error!("Payment provider error: {}", err);
                        (
                            gateway_status(&err),
                            json!({ "error": message, "provider_status": err.status(), "debug_id": err.debug_id() }),
                        )
                    }
                }
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, json!({ "error": msg })),
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        Self::Checkout(err)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
