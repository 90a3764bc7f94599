//! Form actions for the login page.
//!
//! Each action forwards the submitted credentials to the provider and answers
//! with a `303 See Other`. Provider errors are logged, never shown verbatim.

use axum::{
    extract::{Extension, Form},
    http::HeaderMap,
    response::{IntoResponse, Redirect},
};
use std::sync::Arc;
use tracing::{error, info};

use super::login_redirect;
use crate::{
    api::state::AppState,
    supabase::{create_server_client, Credentials, RequestCookies, SignUpOptions, SignUpOutcome},
};

pub const SIGN_IN_FAILED: &str = "Could not authenticate user";
pub const SIGN_UP_FAILED: &str = "Could not create user";
pub const SIGN_UP_CHECK_EMAIL: &str = "Check email to continue sign in process";

pub async fn sign_in(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Form(credentials): Form<Credentials>,
) -> impl IntoResponse {
    let cookies = RequestCookies::from_headers(&headers);
    let result = create_server_client(state.provider(), &cookies)
        .sign_in_with_password(&credentials)
        .await;

    let location = match result {
        Ok(_) => "/".to_string(),
        Err(err) => {
            error!("Sign In Error: {err}");
            login_redirect(SIGN_IN_FAILED)
        }
    };

    (cookies, Redirect::to(&location))
}

pub async fn sign_up(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    Form(credentials): Form<Credentials>,
) -> impl IntoResponse {
    let cookies = RequestCookies::from_headers(&headers);
    let options = SignUpOptions {
        email_redirect_to: Some(state.email_redirect_to()),
    };
    let result = create_server_client(state.provider(), &cookies)
        .sign_up(&credentials, &options)
        .await;

    let location = match result {
        Ok(SignUpOutcome::PendingConfirmation(_)) => login_redirect(SIGN_UP_CHECK_EMAIL),
        Ok(SignUpOutcome::Session(_)) => {
            info!("Sign up confirmed without email verification");
            login_redirect(SIGN_UP_CHECK_EMAIL)
        }
        Err(err) => {
            error!("Sign Up Error: {err}");
            login_redirect(SIGN_UP_FAILED)
        }
    };

    (cookies, Redirect::to(&location))
}

pub async fn sign_out(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let cookies = RequestCookies::from_headers(&headers);
    if let Err(err) = create_server_client(state.provider(), &cookies)
        .sign_out()
        .await
    {
        error!("Sign Out Error: {err}");
    }

    (cookies, Redirect::to("/"))
}
