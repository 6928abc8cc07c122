use crate::api::AcmeApi;
use crate::config::E2eiConfig;
use crate::crl::CrlRepository;
use crate::crypto::IdentityCryptoProvider;
use crate::error::*;
use crate::features::*;
use crate::helpers::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::info_span;
use tracing::instrument;
use tracing::Level;
use tracing_futures::Instrument;

/// Default minimum time between two scheduled CRL checks (24 hours).
pub const DEFAULT_CRL_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 3600);

/// Shortest accepted check interval.
pub const MIN_CRL_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Wait after a failed iteration before the worker tries again.
const FAILURE_BACKOFF: Duration = Duration::from_secs(15 * 60);

/// Fetches one CRL and registers it with the crypto provider.
pub struct RevocationListChecker {
  api: Arc<dyn AcmeApi>,
  crypto: Arc<dyn IdentityCryptoProvider>,
  features: Arc<dyn FeatureFlagSource>,
}

impl RevocationListChecker {
  pub fn new(
    api: Arc<dyn AcmeApi>,
    crypto: Arc<dyn IdentityCryptoProvider>,
    features: Arc<dyn FeatureFlagSource>,
  ) -> Self {
    RevocationListChecker {
      api,
      crypto,
      features,
    }
  }

  /// Returns the new expiration of the CRL at `url`, if the CRL has one.
  ///
  /// Fails with [`Error::Disabled`] without touching the network when E2EI
  /// is off.
  #[instrument(level = Level::DEBUG, name = "e2ei::RevocationListChecker::check", err, skip(self))]
  pub async fn check(&self, url: &str) -> Result<Option<u64>, Error> {
    if !is_e2ei_enabled(self.features.as_ref()) {
      return Err(Error::Disabled);
    }

    let der = self.api.get_crl(url).await?;
    let registration = self.crypto.register_crl(url, &der).await?;

    if registration.dirty {
      info!(url, "CRL changed the verification state of local credentials");
    }

    Ok(registration.expiration)
  }
}

/// Keeps every known CRL fresh, either on a schedule or on demand.
pub struct RevocationListMonitor {
  checker: Arc<RevocationListChecker>,
  repository: Arc<dyn CrlRepository>,
  clock: Arc<dyn Clock>,
  check_interval: Duration,
}

impl RevocationListMonitor {
  pub fn new(
    checker: Arc<RevocationListChecker>,
    repository: Arc<dyn CrlRepository>,
  ) -> Self {
    RevocationListMonitor {
      checker,
      repository,
      clock: Arc::new(SystemClock),
      check_interval: DEFAULT_CRL_CHECK_INTERVAL,
    }
  }

  pub fn from_config(
    checker: Arc<RevocationListChecker>,
    repository: Arc<dyn CrlRepository>,
    config: &E2eiConfig,
  ) -> Self {
    RevocationListMonitor::new(checker, repository)
      .with_interval(config.crl_check_interval())
  }

  /// Clamped to [`MIN_CRL_CHECK_INTERVAL`].
  pub fn with_interval(mut self, check_interval: Duration) -> Self {
    self.check_interval = check_interval.max(MIN_CRL_CHECK_INTERVAL);
    self
  }

  pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
    self.clock = clock;
    self
  }

  pub fn check_interval(&self) -> Duration {
    self.check_interval
  }

  /// How long until the next scheduled check is due.
  pub async fn time_until_next_check(&self) -> Result<Duration, Error> {
    let Some(last) = self.repository.last_check_instant().await? else {
      return Ok(Duration::ZERO);
    };
    let elapsed = (self.clock.now() - last)
      .to_std()
      .unwrap_or(Duration::ZERO);
    Ok(self.check_interval.saturating_sub(elapsed))
  }

  /// Refresh the known CRLs.
  ///
  /// Unless `forced`, nothing happens before the check interval has elapsed
  /// since the last check, and only expired entries are refreshed. A forced
  /// run checks every known entry right away. Individual CRL failures are
  /// logged and skipped. A repository failure aborts the run: the remaining
  /// entries are left alone and the last check instant is not moved, so the
  /// next run starts over. Returns the number of entries updated.
  #[instrument(level = Level::INFO, name = "e2ei::RevocationListMonitor::check_and_refresh", err, skip(self))]
  pub async fn check_and_refresh(&self, forced: bool) -> Result<usize, Error> {
    if !forced && !self.time_until_next_check().await?.is_zero() {
      debug!("CRL check interval has not elapsed yet");
      return Ok(0);
    }

    let started = self.clock.now();
    let now = u64::try_from(started.timestamp()).unwrap_or_default();
    let entries = self.repository.crl_entries().await?;
    let mut seen = HashSet::new();
    let mut refreshed = 0;

    for entry in entries {
      if !seen.insert(entry.url.clone()) {
        continue;
      }
      if !forced && entry.expiration > now {
        continue;
      }

      match self.checker.check(&entry.url).await {
        Ok(Some(expiration)) => {
          self
            .repository
            .add_or_update_crl(&entry.url, expiration)
            .await?;
          refreshed += 1;
        }
        Ok(None) => {
          debug!(url = %entry.url, "CRL carries no expiration, keeping entry");
        }
        Err(err) => report_worker_failure("crl_check", &err),
      }
    }

    self.repository.set_last_check_instant(started).await?;
    debug!(refreshed, "CRL check completed");
    Ok(refreshed)
  }

  /// Run the scheduled checks until `cancel` fires.
  ///
  /// Checks only run while `sync` reports [`SyncState::Live`]; time spent
  /// offline is skipped, not made up for. A check in flight finishes before
  /// cancellation is observed.
  pub async fn run(
    self: Arc<Self>,
    mut sync: watch::Receiver<SyncState>,
    cancel: CancellationToken,
  ) {
    info!(
      check_interval_secs = self.check_interval.as_secs(),
      "Starting CRL monitor"
    );

    loop {
      let live = tokio::select! {
        _ = cancel.cancelled() => break,
        res = sync.wait_for(SyncState::is_live) => res.is_ok(),
      };
      if !live {
        info!("Sync status source closed, stopping CRL monitor");
        break;
      }

      let delay = match self.time_until_next_check().await {
        Ok(delay) => delay,
        Err(err) => {
          report_worker_failure("crl_monitor", &err);
          FAILURE_BACKOFF.min(self.check_interval)
        }
      };

      if !delay.is_zero() {
        tokio::select! {
          _ = cancel.cancelled() => break,
          _ = tokio::time::sleep(delay) => {}
        }
      }

      if !sync.borrow().is_live() {
        debug!("Sync is not live anymore, skipping CRL check");
        continue;
      }

      if let Err(err) = self.check_and_refresh(false).await {
        report_worker_failure("crl_monitor", &err);
        tokio::select! {
          _ = cancel.cancelled() => break,
          _ = tokio::time::sleep(FAILURE_BACKOFF.min(self.check_interval)) => {}
        }
      }
    }

    info!("CRL monitor stopped");
  }

  pub fn spawn(
    self: Arc<Self>,
    sync: watch::Receiver<SyncState>,
    cancel: CancellationToken,
  ) -> JoinHandle<()> {
    tokio::spawn(self.run(sync, cancel).instrument(info_span!("crl_monitor")))
  }
}
