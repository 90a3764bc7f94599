use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::html_page;
use crate::{
    api::state::AppState,
    supabase::{create_server_client, AuthError, RequestCookies, User},
};

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    message: Option<String>,
}

/// The header widget needs the signed-in user, if any.
async fn current_user(state: &AppState, cookies: &RequestCookies) -> Option<User> {
    match create_server_client(state.provider(), cookies).get_user().await {
        Ok(user) => Some(user),
        Err(AuthError::SessionMissing) => None,
        Err(err) => {
            debug!("No signed-in user: {err}");
            None
        }
    }
}

pub async fn home(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let cookies = RequestCookies::from_headers(&headers);
    let user = current_user(&state, &cookies).await;
    let page = state
        .templates()
        .home(user.as_ref().and_then(|user| user.email.as_deref()));

    (cookies, html_page(page))
}

pub async fn login(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<LoginParams>,
) -> impl IntoResponse {
    let cookies = RequestCookies::from_headers(&headers);
    let user = current_user(&state, &cookies).await;
    let page = state.templates().login(
        user.as_ref().and_then(|user| user.email.as_deref()),
        params.message.as_deref().filter(|message| !message.is_empty()),
    );

    (cookies, html_page(page))
}
