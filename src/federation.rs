use crate::config::E2eiConfig;
use crate::error::*;
use crate::features::*;
use crate::transport::AcmeTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::info_span;
use tracing_futures::Instrument;

/// Default interval between two federation certificate syncs (24 hours).
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Shortest accepted sync interval.
pub const MIN_SYNC_INTERVAL: Duration = Duration::from_secs(1);

/// Periodically refreshes the trust anchors of federated domains.
pub struct PeriodicCertificateSync {
  transport: Arc<dyn AcmeTransport>,
  features: Arc<dyn FeatureFlagSource>,
  sync_interval: Duration,
}

impl PeriodicCertificateSync {
  pub fn new(
    transport: Arc<dyn AcmeTransport>,
    features: Arc<dyn FeatureFlagSource>,
  ) -> Self {
    PeriodicCertificateSync {
      transport,
      features,
      sync_interval: DEFAULT_SYNC_INTERVAL,
    }
  }

  pub fn from_config(
    transport: Arc<dyn AcmeTransport>,
    features: Arc<dyn FeatureFlagSource>,
    config: &E2eiConfig,
  ) -> Self {
    PeriodicCertificateSync::new(transport, features)
      .with_interval(config.federation_sync_interval())
  }

  /// Clamped to [`MIN_SYNC_INTERVAL`].
  pub fn with_interval(mut self, sync_interval: Duration) -> Self {
    self.sync_interval = sync_interval.max(MIN_SYNC_INTERVAL);
    self
  }

  pub fn sync_interval(&self) -> Duration {
    self.sync_interval
  }

  /// Fetch the federation certificates once. Returns whether a fetch was
  /// attempted; with E2EI or MLS disabled nothing is sent.
  pub async fn sync_once(&self) -> Result<bool, Error> {
    if !is_e2ei_enabled(self.features.as_ref()) {
      debug!("E2EI is disabled, skipping federation certificate sync");
      return Ok(false);
    }
    self.transport.fetch_federation_certificates().await?;
    Ok(true)
  }

  /// Sync right away, then once per interval, until `cancel` fires. Failed
  /// syncs are logged and never end the loop.
  pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
    info!(
      sync_interval_secs = self.sync_interval.as_secs(),
      "Starting federation certificate sync"
    );

    let mut ticker = tokio::time::interval(self.sync_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        _ = ticker.tick() => {
          match self.sync_once().await {
            Ok(true) => debug!("Federation certificates refreshed"),
            Ok(false) => {}
            Err(err) => report_worker_failure("federation_sync", &err),
          }
        }
      }
    }

    info!("Federation certificate sync stopped");
  }

  pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(self.run(cancel).instrument(info_span!("federation_sync")))
  }
}
