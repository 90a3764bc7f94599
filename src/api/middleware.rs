//! Session refresh on every request.
//!
//! Asks the provider for the current user so expiring tokens get refreshed,
//! then relays whatever cookies the provider client wrote. No access control
//! decision is made here.

use axum::{
    extract::{Extension, Request},
    http::{
        header::{COOKIE, SET_COOKIE},
        HeaderMap, HeaderValue,
    },
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    api::state::AppState,
    supabase::{create_server_client, AuthError, RequestCookies},
};

fn is_static_asset(path: &str) -> bool {
    path.starts_with("/static/") || path == "/favicon.ico"
}

pub async fn refresh_session(
    Extension(state): Extension<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_static_asset(request.uri().path()) {
        return next.run(request).await;
    }

    let cookies = RequestCookies::from_headers(request.headers());
    match create_server_client(state.provider(), &cookies).get_user().await {
        Ok(_) | Err(AuthError::SessionMissing) => {}
        Err(err) => debug!("Session check failed: {err}"),
    }

    // Handlers further down must see the refreshed cookies.
    if !cookies.pending_set_cookies().is_empty() {
        rewrite_cookie_header(&cookies, request.headers_mut());
    }

    let mut response = next.run(request).await;
    relay_cookies(&cookies, response.headers_mut());
    response
}

fn rewrite_cookie_header(cookies: &RequestCookies, headers: &mut HeaderMap) {
    headers.remove(COOKIE);
    if let Some(value) = cookies.cookie_header() {
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(err) => warn!("Failed to rebuild Cookie header: {err}"),
        }
    }
}

/// Put the middleware's `Set-Cookie` headers in front of the handler's, so a
/// handler that clears the session (sign-out) has the last word.
fn relay_cookies(cookies: &RequestCookies, headers: &mut HeaderMap) {
    let relayed = cookies.set_cookie_headers();
    if relayed.is_empty() {
        return;
    }

    let from_handler: Vec<HeaderValue> = headers.get_all(SET_COOKIE).iter().cloned().collect();
    headers.remove(SET_COOKIE);
    for value in relayed.into_iter().chain(from_handler) {
        headers.append(SET_COOKIE, value);
    }
}
