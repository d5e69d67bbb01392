//! HTTP probe implementation.

use std::time::{Duration, Instant};

use serde::Serialize;

use super::ProbeError;

/// The normalized outcome of one probe attempt.
///
/// Exactly one of `status_code` and `error` is set: a completed HTTP exchange
/// carries the final status code, a transport failure (DNS, connect, TLS,
/// timeout, protocol) carries a description instead.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    /// Whether the final response, after following redirects, had a 2xx
    /// status. Unfollowed 3xx and all 4xx/5xx responses count as failures,
    /// as does any transport error.
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    /// Wall-clock milliseconds from just before the request to the response
    /// head, or to the point of failure.
    pub elapsed_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// HTTP prober wrapping a shared connection pool.
///
/// The client follows redirects (up to reqwest's default of 10 hops); the
/// timeout is applied per request so one prober can serve requests with
/// different preferences.
#[derive(Clone)]
pub struct Prober {
    client: reqwest::Client,
}

impl Prober {
    pub fn new() -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ProbeError::Client(e.to_string()))?;
        Ok(Self { client })
    }

    /// Probe a URL with a single GET request.
    ///
    /// Never fails: every transport error is folded into the returned
    /// [`ProbeOutcome`]. Exactly one attempt is made.
    pub async fn probe_url(&self, url: &str, timeout: Duration) -> ProbeOutcome {
        let start = Instant::now();

        match self.client.get(url).timeout(timeout).send().await {
            Ok(response) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                let status = response.status();
                ProbeOutcome {
                    ok: status.is_success(),
                    status_code: Some(status.as_u16()),
                    elapsed_ms,
                    error: None,
                }
            }
            Err(e) => {
                let elapsed_ms = start.elapsed().as_millis() as u64;
                ProbeOutcome {
                    ok: false,
                    status_code: None,
                    elapsed_ms,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}
