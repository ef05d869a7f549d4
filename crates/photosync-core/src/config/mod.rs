//! Engine configuration.
//!
//! Hosts build an `EngineConfig` from their own profile/env handling; the
//! engine only validates the server URL when it builds its HTTP client.

use std::time::Duration;

use crate::api::normalize_base_url;
use crate::Result;

const DEFAULT_RETRY_BACKOFF_SECS: u64 = 5;
const DEFAULT_SCAN_BATCH_SIZE: usize = 200;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_PERIODIC_INTERVAL_SECS: u64 = 15 * 60;

/// Runtime knobs for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Server base URL; endpoints are resolved relative to it.
    pub server_url: Option<String>,
    /// Pause after a failed attempt before the next claim.
    pub retry_backoff: Duration,
    /// Device media entries read per page during a scan.
    pub scan_batch_size: usize,
    pub request_timeout: Duration,
    /// How often hosts should trigger reconciliation plus an upload cycle.
    pub periodic_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_url: None,
            retry_backoff: Duration::from_secs(DEFAULT_RETRY_BACKOFF_SECS),
            scan_batch_size: DEFAULT_SCAN_BATCH_SIZE,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            periodic_interval: Duration::from_secs(DEFAULT_PERIODIC_INTERVAL_SECS),
        }
    }
}

impl EngineConfig {
    /// Defaults with the given server URL.
    pub fn for_server(server_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            server_url: Some(normalize_base_url(server_url.into())?),
            ..Self::default()
        })
    }
}
