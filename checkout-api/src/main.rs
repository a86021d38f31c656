use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use checkout_api::{app, AppState};
use checkout_core::PaymentGateway;
use checkout_infra::{Config, GatewayMode, PayPalGateway};
use checkout_order::{CheckoutCoordinator, MockPaymentGateway};
use checkout_pricing::PricingEngine;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "checkout_api=debug,checkout_order=debug,checkout_infra=debug,tower_http=debug,axum::rejection=trace"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting checkout API on port {}", config.server.port);

    let gateway: Arc<dyn PaymentGateway> = match config.gateway.mode {
        GatewayMode::Paypal => {
            tracing::info!("Using PayPal at {}", config.gateway.base_url);
            Arc::new(PayPalGateway::new(&config.gateway).context("Failed to build PayPal client")?)
        }
        GatewayMode::Mock => {
            tracing::warn!("Using in-memory mock payment gateway");
            Arc::new(MockPaymentGateway::new())
        }
    };

    let pricing = PricingEngine::new(config.pricing.clone()).context("Invalid pricing config")?;
    let coordinator = Arc::new(CheckoutCoordinator::new(gateway, pricing));

    let app = app(AppState::new(coordinator));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
