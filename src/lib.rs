//! # Astewai (Digital Bookstore Storefront)
//!
//! `astewai` serves the storefront pages of the Astewai digital bookstore and
//! delegates email/password authentication to a Supabase-style auth provider.
//!
//! ## Sessions
//!
//! The service keeps no session state of its own. The provider issues an
//! access/refresh token pair which is stored, encoded, in the
//! `sb-<project-ref>-auth-token` cookie (split into `.0`, `.1`, ... chunks when
//! large). Every request except static assets passes through a middleware that
//! asks the provider for the current user, refreshing the tokens when they are
//! about to expire and relaying the rewritten cookies to the browser.
//!
//! ## Auth flows
//!
//! - **Sign in**: form `POST` forwarded to the provider password grant.
//! - **Sign up**: form `POST` forwarded to the provider with a `PKCE` challenge;
//!   the verifier waits in a cookie until the email link hits `/auth/callback`.
//! - **Sign out**: provider logout plus cookie removal, always redirecting home.

pub mod api;
pub mod cli;
pub mod supabase;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_git_commit_hash_format() {
        if GIT_COMMIT_HASH == "unknown" {
            // Acceptable in non-git build environments
            return;
        }
        assert!(
            GIT_COMMIT_HASH.chars().all(|c| c.is_ascii_hexdigit()),
            "GIT_COMMIT_HASH should be a hex string, got: {GIT_COMMIT_HASH}"
        );
        assert!(
            GIT_COMMIT_HASH.len() >= 7,
            "GIT_COMMIT_HASH should be at least 7 characters long, got: {GIT_COMMIT_HASH}"
        );
    }

    #[test]
    fn test_app_user_agent_format() {
        assert!(APP_USER_AGENT.starts_with(env!("CARGO_PKG_NAME")));
        assert!(APP_USER_AGENT.contains(env!("CARGO_PKG_VERSION")));
    }
}
