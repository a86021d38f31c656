pub mod app_config;
pub mod paypal;

pub use app_config::{Config, GatewayConfig, GatewayMode};
pub use paypal::PayPalGateway;
