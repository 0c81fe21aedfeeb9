// Error taxonomy for the data-access core.
//
// Transport and upstream-status failures are recovered by the orchestrator's
// fallback chain; store failures degrade the persistent tier only. Only total
// exhaustion (every fetcher failed, no cache entry at any freshness) reaches
// the caller.

use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VehicleError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream responded with status {0}")]
    UpstreamStatus(StatusCode),

    #[error("malformed upstream response: {0}")]
    MalformedResponse(String),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

// Persistent-tier failures never cross the cache boundary; the store surfaces
// them, the cache logs and swallows them.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type VehicleResult<T> = Result<T, VehicleError>;
