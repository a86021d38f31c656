use crate::app_config::GatewayConfig;
use async_trait::async_trait;
use checkout_core::{
    AmountBreakdown, Capture, CaptureResult, GatewayError, GatewayResult, PaymentGateway, Refund, RefundResult,
    RemoteOrder,
};
use checkout_shared::{Masked, Money};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Purchase unit every order is created with, and the one the amount patch targets.
const REFERENCE_ID: &str = "default";

/// Tokens are refreshed this long before PayPal says they expire.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

struct AccessToken {
    value: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    name: Option<String>,
    message: Option<String>,
    debug_id: Option<String>,
    #[serde(default)]
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    issue: Option<String>,
    description: Option<String>,
}

/// PayPal REST (Orders v2 / Payments v2) implementation of the gateway.
pub struct PayPalGateway {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: Masked<String>,
    token: RwLock<Option<AccessToken>>,
}

impl PayPalGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| GatewayError::Transport(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: RwLock::new(None),
        })
    }

    /// Cached OAuth2 client-credentials token, fetched again once close to expiry.
    async fn access_token(&self) -> GatewayResult<String> {
        if let Some(token) = self.token.read().await.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let mut slot = self.token.write().await;
        // Another request may have refreshed while we waited for the lock
        if let Some(token) = slot.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        debug!("Requesting PayPal access token");
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(self.client_secret.expose()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(transport_error)?;

        let response = check_status(response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(format!("token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        *slot = Some(AccessToken {
            value: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    /// Authenticated JSON call. Returns `None` for empty (204) responses.
    async fn call(&self, method: Method, path: &str, body: Option<Value>, prefer: &str) -> GatewayResult<Option<Value>> {
        let token = self.access_token().await?;

        let mut request = self
            .client
            .request(method.clone(), format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .header("Prefer", prefer);

        if method != Method::GET {
            request = request.header("PayPal-Request-Id", Uuid::new_v4().to_string());
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = check_status(request.send().await.map_err(transport_error)?).await?;
        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let text = response.text().await.map_err(transport_error)?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| GatewayError::InvalidResponse(format!("{} {}: {}", method, path, e)))
    }

    async fn call_json(&self, method: Method, path: &str, body: Option<Value>, prefer: &str) -> GatewayResult<Value> {
        let label = format!("{} {}", method, path);
        self.call(method, path, body, prefer)
            .await?
            .ok_or_else(|| GatewayError::InvalidResponse(format!("{} returned no body", label)))
    }
}

fn transport_error(err: reqwest::Error) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout(err.to_string())
    } else {
        GatewayError::Transport(err.to_string())
    }
}

/// Turn a non-2xx response into a provider error carrying PayPal's debug id.
async fn check_status(response: reqwest::Response) -> GatewayResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let header_debug_id = response
        .headers()
        .get("paypal-debug-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = response.text().await.unwrap_or_default();

    let (message, debug_id) = match serde_json::from_str::<ErrorBody>(&text) {
        Ok(body) => {
            let mut message = match (body.name, body.message) {
                (Some(name), Some(message)) => format!("{}: {}", name, message),
                (Some(name), None) => name,
                (None, Some(message)) => message,
                (None, None) => text.clone(),
            };
            if let Some(detail) = body.details.first() {
                let issue = detail.issue.as_deref().unwrap_or_default();
                let description = detail.description.as_deref().unwrap_or_default();
                message = format!("{} ({} {})", message, issue, description).trim_end().to_string();
            }
            (message, body.debug_id.or(header_debug_id))
        }
        Err(_) => (
            if text.is_empty() { status.to_string() } else { text },
            header_debug_id,
        ),
    };

    warn!("PayPal returned {}: {} (debug_id {:?})", status, message, debug_id);
    Err(GatewayError::Provider {
        status: status.as_u16(),
        message,
        debug_id,
    })
}

/// Ids end up in URL paths, so only the characters PayPal itself uses are let through.
fn path_id(id: &str) -> GatewayResult<&str> {
    let valid = !id.is_empty() && id.len() <= 64 && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(id)
    } else {
        Err(GatewayError::InvalidRequest(format!("malformed id '{}'", id)))
    }
}

fn remote_order(raw: Value) -> GatewayResult<RemoteOrder> {
    let id = raw["id"]
        .as_str()
        .ok_or_else(|| GatewayError::InvalidResponse("order without id".to_string()))?
        .to_string();
    let status = raw["status"].as_str().unwrap_or_default().to_string();
    Ok(RemoteOrder { id, status, raw })
}

fn parse_capture(order_id: &str, raw: &Value) -> GatewayResult<Option<Capture>> {
    let node = &raw["purchase_units"][0]["payments"]["captures"][0];
    if node.is_null() {
        return Ok(None);
    }

    let id = node["id"]
        .as_str()
        .ok_or_else(|| GatewayError::InvalidResponse("capture without id".to_string()))?;
    let amount: Money = serde_json::from_value(node["amount"].clone())
        .map_err(|e| GatewayError::InvalidResponse(format!("capture amount: {}", e)))?;
    let status = serde_json::from_value(node["status"].clone())
        .map_err(|e| GatewayError::InvalidResponse(format!("capture status: {}", e)))?;

    Ok(Some(Capture {
        id: id.to_string(),
        order_id: order_id.to_string(),
        amount,
        status,
    }))
}

fn parse_refund(capture_id: &str, raw: &Value) -> GatewayResult<Refund> {
    let id = raw["id"]
        .as_str()
        .ok_or_else(|| GatewayError::InvalidResponse("refund without id".to_string()))?;
    let status = serde_json::from_value(raw["status"].clone())
        .map_err(|e| GatewayError::InvalidResponse(format!("refund status: {}", e)))?;
    let amount = match &raw["amount"] {
        Value::Null => None,
        node => Some(
            serde_json::from_value(node.clone())
                .map_err(|e| GatewayError::InvalidResponse(format!("refund amount: {}", e)))?,
        ),
    };

    Ok(Refund {
        id: id.to_string(),
        capture_id: capture_id.to_string(),
        amount,
        status,
    })
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    #[instrument(skip(self))]
    async fn create_order(&self, amount: &Money) -> GatewayResult<RemoteOrder> {
        let body = json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": REFERENCE_ID,
                "amount": amount,
            }],
        });

        let raw = self
            .call_json(Method::POST, "/v2/checkout/orders", Some(body), "return=minimal")
            .await?;
        let order = remote_order(raw)?;
        info!("PayPal order {} created ({})", order.id, order.status);
        Ok(order)
    }

    #[instrument(skip(self))]
    async fn patch_order(&self, order_id: &str, breakdown: &AmountBreakdown) -> GatewayResult<()> {
        let path = format!("/v2/checkout/orders/{}", path_id(order_id)?);
        let body = json!([{
            "op": "replace",
            "path": format!("/purchase_units/@reference_id=='{}'/amount", REFERENCE_ID),
            "value": {
                "currency_code": breakdown.total.currency(),
                "value": breakdown.total.value(),
                "breakdown": {
                    "item_total": breakdown.item_total,
                    "shipping": breakdown.shipping,
                },
            },
        }]);

        self.call(Method::PATCH, &path, Some(body), "return=minimal").await?;
        info!("PayPal order {} amount set to {}", order_id, breakdown.total);
        Ok(())
    }

    #[instrument(skip(self))]
    async fn capture_order(&self, order_id: &str) -> GatewayResult<CaptureResult> {
        let path = format!("/v2/checkout/orders/{}/capture", path_id(order_id)?);
        let raw = self
            .call_json(Method::POST, &path, Some(json!({})), "return=representation")
            .await?;

        let order_status = raw["status"].as_str().unwrap_or_default().to_string();
        let capture = parse_capture(order_id, &raw).map_err(|e| {
            // Funds may already be captured at PayPal
            error!(
                order_id,
                order_status = %order_status,
                "Unreadable capture in PayPal response: {}", e
            );
            e
        })?;
        Ok(CaptureResult {
            order_id: order_id.to_string(),
            order_status,
            capture,
            raw,
        })
    }

    #[instrument(skip(self))]
    async fn refund_capture(&self, capture_id: &str, amount: Option<&Money>) -> GatewayResult<RefundResult> {
        let path = format!("/v2/payments/captures/{}/refund", path_id(capture_id)?);
        let body = match amount {
            Some(amount) => json!({ "amount": amount }),
            None => json!({}),
        };

        let raw = self
            .call_json(Method::POST, &path, Some(body), "return=representation")
            .await?;
        let refund = parse_refund(capture_id, &raw)?;
        Ok(RefundResult { refund, raw })
    }

    #[instrument(skip(self))]
    async fn get_order(&self, order_id: &str) -> GatewayResult<RemoteOrder> {
        let path = format!("/v2/checkout/orders/{}", path_id(order_id)?);
        let raw = self.call_json(Method::GET, &path, None, "return=representation").await?;
        remote_order(raw)
    }
}
