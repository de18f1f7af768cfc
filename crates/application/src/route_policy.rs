//! Static route table consulted by the request guard.
//!
//! Every protected path template is listed in [`ROUTE_RULES`]; anything not
//! listed and not public is unmapped and handled fail-closed.

use warden_core::OrganizationId;
use warden_domain::Permission;

/// Scope a route's permission is checked in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteScope {
    /// System-wide; only system administrators qualify.
    System,
    /// Organization taken from the `{org}` path segment.
    OrganizationFromPath,
    /// Bound to the principal alone.
    Principal,
}

/// What a route demands of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteRequirement {
    /// Any authenticated principal.
    Authenticated,
    /// A permission in a scope.
    Permission {
        /// Required permission.
        permission: Permission,
        /// Scope of the check.
        scope: RouteScope,
    },
}

/// One entry of the route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteRule {
    /// Path template; `{org}` must be an organization id, other `{..}` match any segment.
    pub template: &'static str,
    /// Requirement applied to the template and everything below it.
    pub requirement: RouteRequirement,
}

const fn permission_rule(
    template: &'static str,
    permission: Permission,
    scope: RouteScope,
) -> RouteRule {
    RouteRule {
        template,
        requirement: RouteRequirement::Permission { permission, scope },
    }
}

/// Protected routes.
pub const ROUTE_RULES: &[RouteRule] = &[
    permission_rule("/admin", Permission::AccessAdminConsole, RouteScope::System),
    permission_rule(
        "/admin/organizations",
        Permission::ManageOrganizations,
        RouteScope::System,
    ),
    permission_rule("/admin/users", Permission::ManageSystemUsers, RouteScope::System),
    permission_rule("/admin/audit-log", Permission::ViewAuditLog, RouteScope::System),
    permission_rule(
        "/org/{org}/users",
        Permission::ManageOrgUsers,
        RouteScope::OrganizationFromPath,
    ),
    permission_rule(
        "/org/{org}/settings",
        Permission::ManageOrgSettings,
        RouteScope::OrganizationFromPath,
    ),
    permission_rule(
        "/org/{org}/invitations",
        Permission::ManageOrgInvitations,
        RouteScope::OrganizationFromPath,
    ),
    permission_rule(
        "/org/{org}/dashboard",
        Permission::ViewOrganizationDashboard,
        RouteScope::OrganizationFromPath,
    ),
    permission_rule(
        "/dashboard",
        Permission::ViewPersonalDashboard,
        RouteScope::Principal,
    ),
    RouteRule {
        template: "/onboarding",
        requirement: RouteRequirement::Authenticated,
    },
    RouteRule {
        template: "/invite/{token}/accept",
        requirement: RouteRequirement::Authenticated,
    },
];

/// Paths reachable without a session. Matched exactly, segment by segment.
pub const PUBLIC_PATHS: &[&str] = &[
    "/",
    "/login",
    "/signup",
    "/auth/callback",
    "/health",
    "/health/ready",
    "/invite/{token}",
];

const STATIC_PREFIXES: &[&str] = &["/static/", "/assets/"];
const STATIC_FILES: &[&str] = &["/favicon.ico", "/robots.txt"];
const STATIC_EXTENSIONS: &[&str] = &[
    "css", "js", "map", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff", "woff2",
];

/// A protected route matched against a concrete path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedRoute {
    /// Template of the matching rule.
    pub template: &'static str,
    /// Requirement of the matching rule.
    pub requirement: RouteRequirement,
    /// Organization parsed from the path, for organization-scoped rules.
    pub organization_id: Option<OrganizationId>,
}

/// Classification of a request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteResolution {
    /// No session needed.
    Public,
    /// Covered by the route table.
    Protected(ResolvedRoute),
    /// Neither public nor covered; treated as not found.
    Unmapped,
}

/// Classifies a request path.
#[must_use]
pub fn resolve_route(path: &str) -> RouteResolution {
    if is_static_location(path) {
        return RouteResolution::Public;
    }

    let segments = path_segments(path);

    if PUBLIC_PATHS.iter().any(|template| {
        let template_segments = path_segments(template);
        template_segments.len() == segments.len()
            && match_prefix(&template_segments, &segments).is_some()
    }) {
        return RouteResolution::Public;
    }

    ROUTE_RULES
        .iter()
        .filter_map(|rule| {
            let template_segments = path_segments(rule.template);
            match_prefix(&template_segments, &segments).map(|organization_id| {
                (
                    template_segments.len(),
                    ResolvedRoute {
                        template: rule.template,
                        requirement: rule.requirement,
                        organization_id,
                    },
                )
            })
        })
        .max_by_key(|(specificity, _)| *specificity)
        .map(|(_, route)| RouteResolution::Protected(route))
        .unwrap_or_else(|| {
            // Asset extensions only count outside the route table.
            if has_static_extension(path) {
                RouteResolution::Public
            } else {
                RouteResolution::Unmapped
            }
        })
}

fn is_static_location(path: &str) -> bool {
    STATIC_FILES.contains(&path) || STATIC_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn has_static_extension(path: &str) -> bool {
    path.rsplit('/')
        .next()
        .and_then(|file_name| file_name.rsplit_once('.'))
        .is_some_and(|(stem, extension)| {
            !stem.is_empty() && STATIC_EXTENSIONS.contains(&extension.to_ascii_lowercase().as_str())
        })
}

fn path_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|segment| !segment.is_empty()).collect()
}

/// Matches `template` as a prefix of `segments`, returning the parsed `{org}`.
///
/// The outer `Option` is the match; the inner one is the organization id.
fn match_prefix(template: &[&str], segments: &[&str]) -> Option<Option<OrganizationId>> {
    if template.len() > segments.len() {
        return None;
    }

    let mut organization_id = None;
    for (pattern, segment) in template.iter().zip(segments) {
        match *pattern {
            "{org}" => organization_id = Some(OrganizationId::parse(segment).ok()?),
            placeholder if placeholder.starts_with('{') && placeholder.ends_with('}') => {}
            literal if literal == *segment => {}
            _ => return None,
        }
    }

    Some(organization_id)
}
