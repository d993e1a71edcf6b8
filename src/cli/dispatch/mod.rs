use crate::cli::actions::Action;
use anyhow::Result;

/// Turn parsed CLI matches into an [`Action`].
///
/// # Errors
///
/// Returns an error when a required argument is missing from the matches.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        jwks: required(matches, "jwks")?,
        issuer: required(matches, "issuer")?,
        audience: required(matches, "audience")?,
    })
}

fn required(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .map(String::to_string)
        .ok_or_else(|| anyhow::anyhow!("missing required argument: --{name}"))
}
