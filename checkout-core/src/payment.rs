use async_trait::async_trait;
use checkout_shared::Money;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CaptureStatus {
    Completed,
    Pending,
    Declined,
    Failed,
    PartiallyRefunded,
    Refunded,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundStatus {
    Completed,
    Pending,
    Cancelled,
    Failed,
    #[serde(other)]
    Unknown,
}

impl RefundStatus {
    /// Whether the provider has committed (or will commit) the funds movement.
    pub fn is_accepted(&self) -> bool {
        matches!(self, RefundStatus::Completed | RefundStatus::Pending)
    }
}

/// A charge taken against a provider order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Capture {
    pub id: String,
    pub order_id: String,
    pub amount: Money,
    pub status: CaptureStatus,
}

/// A reversal against a capture. `amount` is `None` only when the provider
/// did not echo one back; the coordinator always records the effective amount.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Refund {
    pub id: String,
    pub capture_id: String,
    pub amount: Option<Money>,
    pub status: RefundStatus,
}

/// Amount breakdown pushed to the provider whenever shipping changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AmountBreakdown {
    pub item_total: Money,
    pub shipping: Money,
    pub total: Money,
}

/// Provider order. `raw` is the provider's JSON, relayed to the client untouched.
#[derive(Debug, Clone)]
pub struct RemoteOrder {
    pub id: String,
    pub status: String,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct CaptureResult {
    pub order_id: String,
    pub order_status: String,
    pub capture: Option<Capture>,
    pub raw: Value,
}

#[derive(Debug, Clone)]
pub struct RefundResult {
    pub refund: Refund,
    pub raw: Value,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("Payment provider returned {status}: {message}")]
    Provider {
        status: u16,
        message: String,
        debug_id: Option<String>,
    },
    #[error("Payment provider timed out: {0}")]
    Timeout(String),
    #[error("Payment provider unreachable: {0}")]
    Transport(String),
    #[error("Unexpected payment provider response: {0}")]
    InvalidResponse(String),
    #[error("Request rejected before reaching the payment provider: {0}")]
    InvalidRequest(String),
}

impl GatewayError {
    /// HTTP status reported by the provider, if it answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Provider { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn debug_id(&self) -> Option<&str> {
        match self {
            GatewayError::Provider { debug_id, .. } => debug_id.as_deref(),
            _ => None,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// The only seam that talks to the payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Open a provider order for the given amount (capture intent)
    async fn create_order(&self, amount: &Money) -> GatewayResult<RemoteOrder>;

    /// Replace the order amount with a new item/shipping breakdown
    async fn patch_order(&self, order_id: &str, breakdown: &AmountBreakdown) -> GatewayResult<()>;

    /// Capture the approved order
    async fn capture_order(&self, order_id: &str) -> GatewayResult<CaptureResult>;

    /// Refund a capture; `None` refunds whatever the provider considers the full amount
    async fn refund_capture(&self, capture_id: &str, amount: Option<&Money>) -> GatewayResult<RefundResult>;

    async fn get_order(&self, order_id: &str) -> GatewayResult<RemoteOrder>;
}
