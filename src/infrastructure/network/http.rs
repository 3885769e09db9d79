// HTTP client utilities
use crate::domain::error::TmError;
use reqwest::Client;
use std::time::Duration;

/// Create the HTTP client used by remote providers.
///
/// `timeout` bounds both connecting and the whole request.
pub fn create_client(timeout: Duration) -> Result<Client, TmError> {
    Client::builder()
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(30))
        .connect_timeout(timeout)
        .timeout(timeout)
        .user_agent(concat!("tmq/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| TmError::ProviderUnavailable(format!("cannot build HTTP client: {}", e)))
}
