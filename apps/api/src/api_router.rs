use axum::Router;
use axum::middleware::from_fn_with_state;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use warden_core::AppError;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

/// Builds the full router. Every request, including unknown paths, passes the
/// route guard before any handler runs.
pub fn build_router(app_state: AppState, public_base_url: &str) -> Result<Router, AppError> {
    let public_routes = Router::new()
        .route("/health", get(handlers::health::health_handler))
        .route("/health/ready", get(handlers::health::readiness_handler))
        .route(
            "/invite/{token}",
            get(handlers::invitations::view_invitation_handler),
        );

    let principal_routes = Router::new()
        .route("/onboarding", get(handlers::pages::onboarding_handler))
        .route("/dashboard", get(handlers::pages::dashboard_handler))
        .route(
            "/invite/{token}/accept",
            post(handlers::invitations::accept_invitation_handler),
        );

    let admin_routes = Router::new()
        .route("/admin", get(handlers::pages::admin_console_handler))
        .route(
            "/admin/organizations",
            get(handlers::admin::list_organizations_handler)
                .post(handlers::admin::create_organization_handler),
        )
        .route(
            "/admin/organizations/{organization_id}/deactivate",
            post(handlers::admin::deactivate_organization_handler),
        )
        .route(
            "/admin/organizations/{organization_id}/activate",
            post(handlers::admin::activate_organization_handler),
        )
        .route(
            "/admin/users/{principal_id}/roles",
            get(handlers::admin::list_principal_roles_handler)
                .post(handlers::admin::grant_role_handler),
        )
        .route(
            "/admin/users/roles/{assignment_id}/revoke",
            post(handlers::admin::revoke_role_handler),
        )
        .route(
            "/admin/audit-log",
            get(handlers::audit::list_audit_log_handler),
        );

    let organization_routes = Router::new()
        .route(
            "/org/{organization_id}/dashboard",
            get(handlers::organizations::organization_dashboard_handler),
        )
        .route(
            "/org/{organization_id}/settings",
            get(handlers::organizations::organization_settings_handler),
        )
        .route(
            "/org/{organization_id}/users",
            get(handlers::organizations::list_members_handler),
        )
        .route(
            "/org/{organization_id}/users/{assignment_id}/revoke",
            post(handlers::organizations::revoke_member_handler),
        )
        .route(
            "/org/{organization_id}/invitations",
            get(handlers::invitations::list_invitations_handler)
                .post(handlers::invitations::create_invitation_handler),
        )
        .route(
            "/org/{organization_id}/invitations/{invitation_id}/revoke",
            post(handlers::invitations::revoke_invitation_handler),
        );

    Ok(Router::new()
        .merge(public_routes)
        .merge(principal_routes)
        .merge(admin_routes)
        .merge(organization_routes)
        .fallback(handlers::not_found_handler)
        .layer(from_fn_with_state(
            app_state.clone(),
            middleware::guard_requests,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(cors::build_cors_layer(public_base_url)?)
        .with_state(app_state))
}
