//! HTTP Client Factory
//!
//! Builds reqwest clients with the per-call timeout class applied.
//! Interactive turns use a short timeout; multi-phase generation calls use
//! a long one. These timeouts are transport-level and independent of the
//! retry budgets above them.

use std::time::Duration;

/// Build a `reqwest::Client` with the given request timeout in seconds.
pub fn build_http_client(timeout_secs: u64) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .expect("failed to build reqwest client")
}
