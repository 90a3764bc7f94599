use crate::{
    api::{self, AppState},
    supabase::{AuthProvider, CookieOptions},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use tracing::info;
use url::Url;

pub struct Args {
    pub port: u16,
    pub supabase_url: Url,
    pub supabase_anon_key: SecretString,
    pub site_url: Url,
}

impl std::fmt::Debug for Args {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Args")
            .field("port", &self.port)
            .field("supabase_url", &self.supabase_url.as_str())
            .field("supabase_anon_key", &"***")
            .field("site_url", &self.site_url.as_str())
            .finish()
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the auth provider configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let cookie_options = CookieOptions::for_site(&args.site_url);
    let provider = AuthProvider::new(args.supabase_url, args.supabase_anon_key, cookie_options)
        .context("Invalid auth provider configuration")?;
    let state = AppState::new(provider, args.site_url)?;

    api::new(args.port, state).await
}

fn log_startup_args(args: &Args) {
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("supabase_url", args.supabase_url.to_string()),
        ("site_url", args.site_url.to_string()),
    ];
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "astewai {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_anon_key() {
        let args = Args {
            port: 8080,
            supabase_url: Url::parse("https://abc.supabase.co").unwrap(),
            supabase_anon_key: SecretString::from("very-secret"),
            site_url: Url::parse("http://localhost:8080").unwrap(),
        };
        let debug = format!("{args:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("abc.supabase.co"));
    }

    #[test]
    fn short_commit_truncates() {
        assert_eq!(short_commit("0123456789abcdef"), "0123456");
        assert_eq!(short_commit("abc"), "abc");
        assert_eq!(short_commit(""), "");
    }
}
