use tracing::info;
use warden_core::{AppResult, PrincipalId};
use warden_domain::{EmailAddress, Principal};
use warden_infrastructure::InMemoryIdentityProvider;

use crate::api_config::DevSeedConfig;

/// Registers one principal with an open session in the in-memory directory.
///
/// The seeded principal reuses the bootstrap administrator id when one is
/// configured, so a local run starts with a usable system administrator.
pub async fn seed_principal(
    directory: &InMemoryIdentityProvider,
    seed: &DevSeedConfig,
    bootstrap_principal_id: Option<PrincipalId>,
) -> AppResult<PrincipalId> {
    let principal = Principal {
        id: bootstrap_principal_id.unwrap_or_default(),
        email: EmailAddress::new(seed.email.as_str())?,
        is_active: true,
    };
    let principal_id = principal.id;

    directory.upsert_principal(principal).await;
    directory
        .open_session(seed.session_token.as_str(), principal_id)
        .await;

    info!(principal_id = %principal_id, "seeded development principal");
    Ok(principal_id)
}
