use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use url::Url;

pub const ARG_SUPABASE_URL: &str = "supabase-url";
pub const ARG_SUPABASE_ANON_KEY: &str = "supabase-anon-key";
pub const ARG_SITE_URL: &str = "site-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SUPABASE_URL)
                .long(ARG_SUPABASE_URL)
                .help("Auth provider project URL, example: https://<project-ref>.supabase.co")
                .env("ASTEWAI_SUPABASE_URL")
                .required(true),
        )
        .arg(
            Arg::new(ARG_SUPABASE_ANON_KEY)
                .long(ARG_SUPABASE_ANON_KEY)
                .help("Auth provider public (anon) API key")
                .env("ASTEWAI_SUPABASE_ANON_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SITE_URL)
                .long(ARG_SITE_URL)
                .help("Public base URL of this site, used for email confirmation links")
                .env("ASTEWAI_SITE_URL")
                .default_value("http://localhost:8080"),
        )
}

pub struct Options {
    pub supabase_url: Url,
    pub supabase_anon_key: SecretString,
    pub site_url: Url,
}

impl std::fmt::Debug for Options {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Options")
            .field("supabase_url", &self.supabase_url.as_str())
            .field("supabase_anon_key", &"***")
            .field("site_url", &self.site_url.as_str())
            .finish()
    }
}

impl Options {
    /// # Errors
    /// Returns an error if an argument is missing or not a valid URL.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let supabase_url = matches
            .get_one::<String>(ARG_SUPABASE_URL)
            .context("missing required argument: --supabase-url")?;
        let supabase_url = Url::parse(supabase_url)
            .with_context(|| format!("Invalid auth provider URL: {supabase_url}"))?;

        let supabase_anon_key = matches
            .get_one::<String>(ARG_SUPABASE_ANON_KEY)
            .cloned()
            .context("missing required argument: --supabase-anon-key")?;

        let site_url = matches
            .get_one::<String>(ARG_SITE_URL)
            .context("missing required argument: --site-url")?;
        let site_url =
            Url::parse(site_url).with_context(|| format!("Invalid site URL: {site_url}"))?;

        Ok(Self {
            supabase_url,
            supabase_anon_key: SecretString::from(supabase_anon_key),
            site_url,
        })
    }
}
