//! Shared HTTP client construction.

use std::time::Duration;

/// Build a `reqwest::Client` with a whole-request timeout.
///
/// The workspace builds reqwest with `rustls-no-provider`, so the `ring`
/// provider is installed first (no-op if one is already installed).
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("wxrelay/", env!("CARGO_PKG_VERSION")))
        .build()
}
