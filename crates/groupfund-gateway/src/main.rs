use std::net::SocketAddr;

use anyhow::Result as AnyResult;
use groupfund_gateway::{AppState, build_router};
use groupfund_platform::{AdminAuth, AuthConfig, MomoClient, ServiceConfig, build_ledger};
use tracing::info;

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "groupfund_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let auth = AuthConfig::from_env()?;
    let ledger = build_ledger(&config).await?;

    let state = AppState {
        ledger,
        auth: AdminAuth::new(auth),
        momo: MomoClient::new(config.momo.clone()),
        meta: config.notifier.meta.clone(),
    };
    let router = build_router(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
