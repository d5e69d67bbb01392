//! URL availability probing.
//!
//! A probe is a single HTTP GET against a node's URL. Probes never fail at
//! the call site: every outcome, including transport errors, is normalized
//! into a [`ProbeOutcome`]. Folder-wide tests fan out over all active nodes
//! concurrently and join before reporting.

mod aggregate;
mod http;

pub use aggregate::*;
pub use http::*;

use std::time::Duration;
use thiserror::Error;

/// Probe error types. These cover caller mistakes (bad configuration), not
/// probe outcomes; a failed probe is a successful call returning an
/// unsuccessful [`ProbeOutcome`].
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("HTTP client error: {0}")]
    Client(String),
}

/// Minimum allowed probe timeout in seconds.
pub const MIN_TIMEOUT_SECS: u64 = 1;
/// Maximum allowed probe timeout in seconds.
pub const MAX_TIMEOUT_SECS: u64 = 120;

/// Validate a probe timeout, rejecting values outside
/// [`MIN_TIMEOUT_SECS`]..=[`MAX_TIMEOUT_SECS`].
pub fn validate_timeout(secs: u64) -> Result<Duration, ProbeError> {
    if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&secs) {
        return Err(ProbeError::Config(format!(
            "timeout must be between {} and {} seconds, got {}",
            MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, secs
        )));
    }
    Ok(Duration::from_secs(secs))
}

/// Clamp a user-supplied timeout preference into the allowed range.
pub fn clamp_timeout_secs(secs: i64) -> u64 {
    (secs.max(0) as u64).clamp(MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS)
}
