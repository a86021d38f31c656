use checkout_pricing::PricingConfig;
use checkout_shared::Masked;
use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    #[default]
    Paypal,
    Mock,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GatewayConfig {
    #[serde(default)]
    pub mode: GatewayMode,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Masked<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_base_url() -> String {
    "https://api-m.sandbox.paypal.com".to_string()
}

fn default_timeout_seconds() -> u64 {
    30
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from("config")
    }

    /// Layered load from `dir`: default, then `RUN_MODE`, then local, then
    /// `CHECKOUT__*` environment variables. The plain `PAYPAL_CLIENT_ID`,
    /// `PAYPAL_CLIENT_SECRET` and `PORT` variables win over everything.
    pub fn load_from(dir: &str) -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name(&format!("{}/default", dir)))
            .add_source(config::File::with_name(&format!("{}/{}", dir, run_mode)).required(false))
            // Not checked in
            .add_source(config::File::with_name(&format!("{}/local", dir)).required(false))
            .add_source(config::Environment::with_prefix("CHECKOUT").separator("__"))
            .set_override_option("gateway.client_id", env::var("PAYPAL_CLIENT_ID").ok())?
            .set_override_option("gateway.client_secret", env::var("PAYPAL_CLIENT_SECRET").ok())?
            .set_override_option("server.port", env::var("PORT").ok())?
            .build()?;

        let config: Config = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.gateway.mode == GatewayMode::Paypal
            && (self.gateway.client_id.is_empty() || self.gateway.client_secret.expose().is_empty())
        {
            return Err(config::ConfigError::Message(
                "gateway.client_id and gateway.client_secret are required in paypal mode".to_string(),
            ));
        }
        if self.gateway.timeout_seconds == 0 {
            return Err(config::ConfigError::Message("gateway.timeout_seconds must be positive".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_dir() -> String {
        format!("{}/../config", env!("CARGO_MANIFEST_DIR"))
    }

    #[test]
    fn test_default_config_parses() {
        let raw = config::Config::builder()
            .add_source(config::File::with_name(&format!("{}/default", config_dir())))
            .build()
            .unwrap();
        let config: Config = raw.try_deserialize().unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.gateway.mode, GatewayMode::Paypal);
        assert_eq!(config.pricing.currency.as_str(), "USD");
        assert_eq!(config.pricing.shipping_rules[0].prefix, "75");
        assert!(checkout_pricing::PricingEngine::new(config.pricing).is_ok());
    }

    #[test]
    fn test_paypal_mode_requires_credentials() {
        let config = Config {
            server: ServerConfig { port: 8080 },
            gateway: GatewayConfig {
                mode: GatewayMode::Paypal,
                base_url: default_base_url(),
                client_id: String::new(),
                client_secret: Masked(String::new()),
                timeout_seconds: 30,
            },
            pricing: PricingConfig::default(),
        };
        assert!(config.validate().is_err());

        let mock = Config {
            gateway: GatewayConfig {
                mode: GatewayMode::Mock,
                ..config.gateway.clone()
            },
            ..config
        };
        assert!(mock.validate().is_ok());
    }

    #[test]
    fn test_secret_is_masked_in_debug() {
        let gateway = GatewayConfig {
            mode: GatewayMode::Paypal,
            base_url: default_base_url(),
            client_id: "id".to_string(),
            client_secret: Masked("super-secret".to_string()),
            timeout_seconds: 30,
        };
        assert!(!format!("{:?}", gateway).contains("super-secret"));
    }
}
