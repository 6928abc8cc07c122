use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

/// Feature switches of the local account.
pub trait FeatureFlagSource: Send + Sync {
  fn is_e2ei_enabled(&self) -> bool;

  fn is_mls_enabled(&self) -> bool;
}

/// E2EI only does anything when both the E2EI feature and MLS are enabled.
pub fn is_e2ei_enabled(flags: &dyn FeatureFlagSource) -> bool {
  flags.is_e2ei_enabled() && flags.is_mls_enabled()
}

/// Flags held in memory and flipped by the host.
#[derive(Debug, Default)]
pub struct StaticFeatureFlags {
  e2ei: AtomicBool,
  mls: AtomicBool,
}

impl StaticFeatureFlags {
  pub fn new(e2ei: bool, mls: bool) -> Self {
    StaticFeatureFlags {
      e2ei: AtomicBool::new(e2ei),
      mls: AtomicBool::new(mls),
    }
  }

  pub fn set_e2ei_enabled(&self, enabled: bool) {
    self.e2ei.store(enabled, Ordering::Release);
  }

  pub fn set_mls_enabled(&self, enabled: bool) {
    self.mls.store(enabled, Ordering::Release);
  }
}

impl FeatureFlagSource for StaticFeatureFlags {
  fn is_e2ei_enabled(&self) -> bool {
    self.e2ei.load(Ordering::Acquire)
  }

  fn is_mls_enabled(&self) -> bool {
    self.mls.load(Ordering::Acquire)
  }
}

/// Incremental sync state as published by the host, usually through a
/// `tokio::sync::watch` channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum SyncState {
  #[default]
  Waiting,
  SlowSync,
  GatheringPendingEvents,
  Live,
  Failed,
}

impl SyncState {
  pub fn is_live(&self) -> bool {
    *self == SyncState::Live
  }
}
