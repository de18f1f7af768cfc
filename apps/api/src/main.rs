//! Warden API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dev_seed;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use std::net::SocketAddr;

use tracing::info;
use warden_core::AppError;

use crate::api_config::{ApiConfig, StoreBackend};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    api_config::init_tracing();

    let config = ApiConfig::load()?;

    if config.migrate_only {
        if let StoreBackend::Postgres { database_url } = &config.store_backend {
            api_services::connect_and_migrate(database_url).await?;
        }
        info!("database migrations applied successfully");
        return Ok(());
    }

    let app_state = api_services::build_app_state(&config).await?;

    if let Some(principal_id) = config.bootstrap_system_admin_id {
        let assignment = app_state
            .role_admin_service
            .bootstrap_system_admin(principal_id)
            .await?;
        info!(
            principal_id = %principal_id,
            assignment_id = %assignment.id(),
            "bootstrap system administrator ready"
        );
    }

    let app = api_router::build_router(app_state, &config.public_base_url)?;
    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "warden-api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}
