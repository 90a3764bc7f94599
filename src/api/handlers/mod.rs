//! Route handlers and the helpers they share.

pub mod assets;
pub mod auth;
pub mod callback;
pub mod health;
pub mod pages;

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use tracing::error;
use url::form_urlencoded;

/// `/login` with a human-readable status message in the query string.
pub(crate) fn login_redirect(message: &str) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("message", message)
        .finish();
    format!("/login?{query}")
}

/// Turn a rendered page into a response; rendering failures become a bare 500.
pub(crate) fn html_page(page: Result<String, tera::Error>) -> Response {
    match page {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!("Failed to render page: {err:?}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
