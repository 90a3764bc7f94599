use crate::cli::{
    actions::{server::Args, Action},
    commands::provider,
};
use anyhow::Result;

/// # Errors
/// Returns an error if required arguments are missing or invalid.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let provider::Options {
        supabase_url,
        supabase_anon_key,
        site_url,
    } = provider::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        supabase_url,
        supabase_anon_key,
        site_url,
    }))
}
