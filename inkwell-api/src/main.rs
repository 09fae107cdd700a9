//! Inkwell API Server Entry Point
//!
//! Loads configuration from the environment, assembles the services and
//! serves every transport on one listener.

use std::net::SocketAddr;

use inkwell_api::telemetry::{init_tracer, TelemetryConfig};
use inkwell_api::{build_app, ApiConfig, ApiError, ApiResult, AuthConfig};

#[tokio::main]
async fn main() -> ApiResult<()> {
    let telemetry_config = TelemetryConfig::default();
    init_tracer(&telemetry_config)?;

    let api_config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();
    auth_config.validate_for_production(&api_config.environment)?;

    let app = build_app(api_config, auth_config).await?;
    if let Some(code) = &app.seed.author_code {
        tracing::info!(author = %code, "Demo author seeded; bind a key with INKWELL_API_KEYS=<key>={}", code);
    }

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, "Starting Inkwell API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app.router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
            }
            tracing::info!("Shutdown signal received");
        })
        .await
        .map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;

    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("INKWELL_API_BIND").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("INKWELL_API_PORT").ok())
        .unwrap_or_else(|| "3000".to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
