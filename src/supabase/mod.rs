//! Client for the Supabase-style auth provider.
//!
//! [`AuthProvider`] holds the provider endpoint, the public anon key and a shared
//! HTTP connection pool. A [`SessionClient`] binds it to a cookie accessor for
//! the duration of one unit of work (usually one HTTP request).

mod client;
mod cookies;
mod error;
mod pkce;
mod storage;
mod types;

pub use client::SessionClient;
pub use cookies::{BrowserCookies, CookieOptions, CookieStore, RequestCookies};
pub use error::AuthError;
pub use types::{Credentials, Session, SignUpOptions, SignUpOutcome, User};

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use url::Url;

use crate::APP_USER_AGENT;

#[derive(Clone)]
pub struct AuthProvider {
    inner: Arc<ProviderInner>,
}

struct ProviderInner {
    base_url: Url,
    anon_key: SecretString,
    storage_key: String,
    cookie_options: CookieOptions,
    http: Client,
}

impl AuthProvider {
    /// Build a provider handle.
    ///
    /// # Errors
    /// Returns an error if the URL has no host or the HTTP client cannot be built.
    pub fn new(
        base_url: Url,
        anon_key: SecretString,
        cookie_options: CookieOptions,
    ) -> Result<Self, AuthError> {
        let storage_key = storage::storage_key(&base_url)?;
        let http = Client::builder().user_agent(APP_USER_AGENT).build()?;

        Ok(Self {
            inner: Arc::new(ProviderInner {
                base_url,
                anon_key,
                storage_key,
                cookie_options,
                http,
            }),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Name of the cookie holding the session.
    #[must_use]
    pub fn storage_key(&self) -> &str {
        &self.inner.storage_key
    }

    #[must_use]
    pub fn cookie_options(&self) -> &CookieOptions {
        &self.inner.cookie_options
    }

    pub(crate) fn http(&self) -> &Client {
        &self.inner.http
    }

    pub(crate) fn anon_key(&self) -> &str {
        self.inner.anon_key.expose_secret()
    }

    /// Absolute URL of an auth API endpoint, e.g. `token` -> `<base>/auth/v1/token`.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/auth/v1/{}",
            self.inner.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

impl std::fmt::Debug for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthProvider")
            .field("base_url", &self.inner.base_url.as_str())
            .field("anon_key", &"***")
            .field("storage_key", &self.inner.storage_key)
            .field("cookie_options", &self.inner.cookie_options)
            .finish()
    }
}

/// Client bound to the cookies of a single server request.
#[must_use]
pub fn create_server_client<'a>(
    provider: &'a AuthProvider,
    cookies: &'a RequestCookies,
) -> SessionClient<'a> {
    SessionClient::new(provider, cookies)
}

/// Client bound to a long-lived, browser-like cookie jar.
#[must_use]
pub fn create_browser_client<'a>(
    provider: &'a AuthProvider,
    cookies: &'a BrowserCookies,
) -> SessionClient<'a> {
    SessionClient::new(provider, cookies)
}
