use crate::account::ClientId;
use crate::error::*;
use serde::Deserialize;
use std::time::Duration;

pub const DEFAULT_DPOP_TOKEN_EXPIRY_SECS: u32 = 30;
pub const DEFAULT_CRL_CHECK_INTERVAL_SECS: u64 = 24 * 3600;
pub const DEFAULT_FEDERATION_SYNC_INTERVAL_SECS: u64 = 24 * 3600;

/// Settings for one local account.
#[derive(Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct E2eiConfig {
  /// The ACME directory URL.
  pub acme_discovery_url: String,
  /// Base URL of the backend issuing wire nonces and access tokens.
  pub backend_url: String,
  /// The current device client id.
  pub client_id: ClientId,
  /// Upper bound for any single enrollment step. `None` waits forever.
  pub step_timeout_secs: Option<u64>,
  pub dpop_token_expiry_secs: u32,
  pub crl_check_interval_secs: u64,
  pub federation_sync_interval_secs: u64,
}

impl Default for E2eiConfig {
  fn default() -> Self {
    E2eiConfig {
      acme_discovery_url: String::new(),
      backend_url: String::new(),
      client_id: ClientId::new(""),
      step_timeout_secs: None,
      dpop_token_expiry_secs: DEFAULT_DPOP_TOKEN_EXPIRY_SECS,
      crl_check_interval_secs: DEFAULT_CRL_CHECK_INTERVAL_SECS,
      federation_sync_interval_secs: DEFAULT_FEDERATION_SYNC_INTERVAL_SECS,
    }
  }
}

impl E2eiConfig {
  pub fn new(
    acme_discovery_url: String,
    backend_url: String,
    client_id: ClientId,
  ) -> Self {
    E2eiConfig {
      acme_discovery_url,
      backend_url,
      client_id,
      ..Default::default()
    }
  }

  pub fn from_json(raw: &str) -> Result<Self, Error> {
    let config: E2eiConfig = serde_json::from_str(raw)
      .map_err(|_| Error::Validation("the E2EI configuration is malformed"))?;
    if config.crl_check_interval_secs == 0
      || config.federation_sync_interval_secs == 0
    {
      return Err(Error::Validation("intervals must be greater than zero"));
    }
    Ok(config)
  }

  pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
    self.step_timeout_secs = Some(timeout.as_secs());
    self
  }

  pub fn with_crl_check_interval(mut self, interval: Duration) -> Self {
    self.crl_check_interval_secs = interval.as_secs().max(1);
    self
  }

  pub fn with_federation_sync_interval(mut self, interval: Duration) -> Self {
    self.federation_sync_interval_secs = interval.as_secs().max(1);
    self
  }

  pub fn step_timeout(&self) -> Option<Duration> {
    self.step_timeout_secs.map(Duration::from_secs)
  }

  pub fn crl_check_interval(&self) -> Duration {
    Duration::from_secs(self.crl_check_interval_secs)
  }

  pub fn federation_sync_interval(&self) -> Duration {
    Duration::from_secs(self.federation_sync_interval_secs)
  }
}
