use crate::{api::templates::Templates, supabase::AuthProvider};
use anyhow::{Context, Result};
use url::Url;

/// Shared, immutable application state.
#[derive(Debug)]
pub struct AppState {
    provider: AuthProvider,
    site_url: Url,
    templates: Templates,
}

impl AppState {
    /// # Errors
    /// Returns an error if the embedded templates fail to parse.
    pub fn new(provider: AuthProvider, site_url: Url) -> Result<Self> {
        let templates = Templates::new().context("Failed to load page templates")?;
        Ok(Self {
            provider,
            site_url,
            templates,
        })
    }

    #[must_use]
    pub fn provider(&self) -> &AuthProvider {
        &self.provider
    }

    #[must_use]
    pub fn site_url(&self) -> &Url {
        &self.site_url
    }

    #[must_use]
    pub fn templates(&self) -> &Templates {
        &self.templates
    }

    /// Link target for confirmation emails: `<site_url>/auth/callback`.
    #[must_use]
    pub fn email_redirect_to(&self) -> String {
        format!(
            "{}/auth/callback",
            self.site_url.as_str().trim_end_matches('/')
        )
    }
}
