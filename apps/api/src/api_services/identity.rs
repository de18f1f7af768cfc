use std::sync::Arc;

use tracing::warn;
use warden_application::IdentityProvider;
use warden_core::AppError;
use warden_infrastructure::{HttpIdentityProvider, InMemoryIdentityProvider};

use crate::api_config::ApiConfig;
use crate::dev_seed;

pub(super) async fn build_identity_provider(
    config: &ApiConfig,
) -> Result<Arc<dyn IdentityProvider>, AppError> {
    if let Some(base_url) = &config.identity_provider_url {
        return Ok(Arc::new(HttpIdentityProvider::new(
            base_url.clone(),
            config.identity_provider_timeout,
        )?));
    }

    warn!("IDENTITY_PROVIDER_URL is not set; using the in-memory identity directory");
    let directory = InMemoryIdentityProvider::new();
    if let Some(seed) = &config.dev_seed {
        dev_seed::seed_principal(&directory, seed, config.bootstrap_system_admin_id).await?;
    }

    Ok(Arc::new(directory))
}
