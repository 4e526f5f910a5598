#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error;

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[must_use]
pub fn default_env(name: &str, default: &str) -> String {
    non_empty_var(name).unwrap_or_else(|| default.to_string())
}

#[derive(Error, Debug)]
pub enum OptionEnvUsizeError {
    #[error("Invalid value for {name}: {source}")]
    ParseInt {
        name: String,
        source: std::num::ParseIntError,
    },
}

/// Reads `name` as a `usize`. Unset and blank variables are `None`.
///
/// # Errors
///
/// * If the variable is set but is not a valid `usize`
pub fn option_env_usize(name: &str) -> Result<Option<usize>, OptionEnvUsizeError> {
    let Some(value) = non_empty_var(name) else {
        return Ok(None);
    };

    log::trace!("option_env_usize: {name}={value}");

    value
        .parse::<usize>()
        .map(Some)
        .map_err(|source| OptionEnvUsizeError::ParseInt {
            name: name.to_string(),
            source,
        })
}

#[derive(Error, Debug)]
pub enum DefaultEnvUsizeError {
    #[error(transparent)]
    OptionEnvUsize(#[from] OptionEnvUsizeError),
}

/// # Errors
///
/// * If the variable is set but is not a valid `usize`
pub fn default_env_usize(name: &str, default: usize) -> Result<usize, DefaultEnvUsizeError> {
    Ok(option_env_usize(name)?.unwrap_or(default))
}
