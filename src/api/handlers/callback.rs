//! Landing point for email confirmation links.

use axum::{
    extract::{Extension, Query},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use super::login_redirect;
use crate::{
    api::state::AppState,
    supabase::{create_server_client, RequestCookies},
};

pub const VERIFY_FAILED: &str = "Could not verify email";

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    next: Option<String>,
}

/// Only same-site absolute paths are followed; anything else goes home.
fn safe_next(next: Option<&str>) -> &str {
    match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') => {
            path
        }
        _ => "/",
    }
}

pub async fn callback(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> impl IntoResponse {
    let cookies = RequestCookies::from_headers(&headers);

    if let Some(code) = params.code.as_deref().filter(|code| !code.is_empty()) {
        let result = create_server_client(state.provider(), &cookies)
            .exchange_code_for_session(code)
            .await;
        match result {
            Ok(_) => {
                let location = safe_next(params.next.as_deref()).to_string();
                return (cookies, Redirect::temporary(&location));
            }
            Err(err) => error!("Code exchange error: {err}"),
        }
    }

    (cookies, Redirect::temporary(&login_redirect(VERIFY_FAILED)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn safe_next_defaults_to_root() {
        assert_eq!(safe_next(None), "/");
        assert_eq!(safe_next(Some("")), "/");
    }

    #[test]
    fn safe_next_keeps_local_paths() {
        assert_eq!(safe_next(Some("/dashboard")), "/dashboard");
        assert_eq!(safe_next(Some("/books?page=2")), "/books?page=2");
    }

    #[test]
    fn safe_next_rejects_other_origins() {
        assert_eq!(safe_next(Some("https://evil.example")), "/");
        assert_eq!(safe_next(Some("//evil.example")), "/");
        assert_eq!(safe_next(Some("/\\evil.example")), "/");
    }
}
