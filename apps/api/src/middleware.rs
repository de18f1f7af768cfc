use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, Method, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use ipnet::IpNet;
use tracing::{error, warn};
use url::form_urlencoded;
use warden_application::{GuardOutcome, GuardRequest, RequestMetadata};
use warden_core::AppError;

use crate::error::ApiError;
use crate::state::AppState;

pub const SESSION_COOKIE_NAME: &str = "warden_session";

/// Runs the route guard for every request and renders its outcome.
pub async fn guard_requests(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let metadata = request_metadata(&request, &state.trusted_proxies);
    let guard_request = GuardRequest {
        method: request.method().as_str().to_owned(),
        path: request.uri().path().to_owned(),
        query: request.uri().query().map(ToOwned::to_owned),
        session_token: session_token(request.headers()),
        metadata: metadata.clone(),
    };

    let outcome = match tokio::time::timeout(
        state.guard_timeout,
        state.route_guard.check(&guard_request),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => GuardOutcome::Unavailable {
            message: format!(
                "authorization guard exceeded {} ms",
                state.guard_timeout.as_millis()
            ),
        },
    };

    let navigational = wants_html(request.method(), request.headers());
    match outcome {
        GuardOutcome::Bypass => {
            request.extensions_mut().insert(metadata);
            next.run(request).await
        }
        GuardOutcome::Forward(context) => {
            request.extensions_mut().insert(metadata);
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        GuardOutcome::RedirectToLogin { return_to } => {
            if navigational {
                let encoded: String =
                    form_urlencoded::byte_serialize(return_to.as_bytes()).collect();
                Redirect::to(&format!("/login?return_to={encoded}")).into_response()
            } else {
                ApiError(AppError::Unauthorized("authentication required".to_owned()))
                    .into_response()
            }
        }
        GuardOutcome::RedirectToLanding {
            landing,
            required,
            reason,
        } => {
            warn!(
                path = guard_request.path.as_str(),
                permission = required.as_str(),
                reason = reason.as_str(),
                "request denied"
            );
            if navigational {
                Redirect::to(&landing.path()).into_response()
            } else {
                ApiError(AppError::Forbidden(format!(
                    "permission '{}' denied: {}",
                    required.as_str(),
                    reason.as_str()
                )))
                .into_response()
            }
        }
        GuardOutcome::NotFound => ApiError(AppError::NotFound(format!(
            "route '{}' does not exist",
            guard_request.path
        )))
        .into_response(),
        GuardOutcome::Unavailable { message } => {
            error!(
                path = guard_request.path.as_str(),
                detail = message.as_str(),
                "guard failed closed"
            );
            ApiError(AppError::Unavailable(message)).into_response()
        }
    }
}

/// Reads the session token from a bearer header, falling back to the session cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_owned());
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE_NAME && !value.is_empty())
        .map(|(_, value)| value.to_owned())
}

/// Navigational browser requests get redirects; everything else gets status codes.
fn wants_html(method: &Method, headers: &HeaderMap) -> bool {
    if *method != Method::GET {
        return false;
    }

    headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|accept| accept.contains("text/html"))
}

fn request_metadata(request: &Request, trusted_proxies: &[IpNet]) -> RequestMetadata {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(address)| address.ip());

    RequestMetadata {
        ip_address: client_ip(peer, request.headers(), trusted_proxies).map(|ip| ip.to_string()),
        user_agent: request
            .headers()
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned),
    }
}

/// Walks `x-forwarded-for` from the right while hops are trusted proxies.
pub fn client_ip(
    peer: Option<IpAddr>,
    headers: &HeaderMap,
    trusted_proxies: &[IpNet],
) -> Option<IpAddr> {
    let is_trusted = |ip: &IpAddr| trusted_proxies.iter().any(|network| network.contains(ip));

    let peer = peer?;
    if !is_trusted(&peer) {
        return Some(peer);
    }

    let forwarded: Vec<IpAddr> = headers
        .get_all("x-forwarded-for")
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|hop| hop.trim().parse::<IpAddr>().ok())
        .collect();

    let mut client = peer;
    for hop in forwarded.into_iter().rev() {
        client = hop;
        if !is_trusted(&hop) {
            break;
        }
    }

    Some(client)
}
