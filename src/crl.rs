//! Persistence of CRL freshness.
//!
//! One entry per distribution point URL, updated in place. Next to the
//! entries the store keeps the instant of the last completed check.

use crate::error::*;
use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use std::path::Path;
use std::path::PathBuf;
use tokio::sync::Mutex;
use tokio::sync::RwLock;
use tracing::debug;
use tracing::info;

#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CrlEntry {
  pub url: String,
  /// Seconds since the unix epoch after which the CRL must be fetched again.
  pub expiration: u64,
}

#[async_trait]
pub trait CrlRepository: Send + Sync {
  async fn crl_entries(&self) -> Result<Vec<CrlEntry>, Error>;

  /// Insert the entry for `url`, or replace its expiration if it is known.
  async fn add_or_update_crl(&self, url: &str, expiration: u64)
    -> Result<(), Error>;

  async fn last_check_instant(&self) -> Result<Option<DateTime<Utc>>, Error>;

  async fn set_last_check_instant(&self, at: DateTime<Utc>) -> Result<(), Error>;
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
struct CrlState {
  entries: Vec<CrlEntry>,
  last_check: Option<DateTime<Utc>>,
}

impl CrlState {
  fn upsert(&mut self, url: &str, expiration: u64) {
    match self.entries.iter_mut().find(|entry| entry.url == url) {
      Some(entry) => entry.expiration = expiration,
      None => self.entries.push(CrlEntry {
        url: url.to_string(),
        expiration,
      }),
    }
  }
}

/// A [`CrlRepository`] that lives as long as the process.
#[derive(Debug, Default)]
pub struct MemoryCrlStore {
  state: RwLock<CrlState>,
}

impl MemoryCrlStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_entries(entries: Vec<CrlEntry>) -> Self {
    let mut state = CrlState::default();
    for entry in entries {
      state.upsert(&entry.url, entry.expiration);
    }
    MemoryCrlStore {
      state: RwLock::new(state),
    }
  }
}

#[async_trait]
impl CrlRepository for MemoryCrlStore {
  async fn crl_entries(&self) -> Result<Vec<CrlEntry>, Error> {
    Ok(self.state.read().await.entries.clone())
  }

  async fn add_or_update_crl(
    &self,
    url: &str,
    expiration: u64,
  ) -> Result<(), Error> {
    self.state.write().await.upsert(url, expiration);
    Ok(())
  }

  async fn last_check_instant(&self) -> Result<Option<DateTime<Utc>>, Error> {
    Ok(self.state.read().await.last_check)
  }

  async fn set_last_check_instant(&self, at: DateTime<Utc>) -> Result<(), Error> {
    self.state.write().await.last_check = Some(at);
    Ok(())
  }
}

/// A [`CrlRepository`] kept in a single JSON document.
///
/// Writes go to a sibling temporary file which is then renamed over the
/// document, so a crash never leaves a torn file behind.
#[derive(Debug)]
pub struct FileCrlStore {
  path: PathBuf,
  lock: Mutex<()>,
}

impl FileCrlStore {
  pub async fn open(path: &Path) -> Result<Self, Error> {
    if let Some(parent) = path.parent() {
      tokio::fs::create_dir_all(parent).await.map_err(storage_err)?;
    }
    info!(path = %path.display(), "Opened CRL store");
    Ok(FileCrlStore {
      path: path.to_path_buf(),
      lock: Mutex::new(()),
    })
  }

  async fn load(&self) -> Result<CrlState, Error> {
    match tokio::fs::read(&self.path).await {
      Ok(raw) => serde_json::from_slice(&raw).map_err(storage_err),
      Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
        debug!(path = %self.path.display(), "No CRL store on disk yet");
        Ok(CrlState::default())
      }
      Err(err) => Err(storage_err(err)),
    }
  }

  async fn store(&self, state: &CrlState) -> Result<(), Error> {
    let raw = serde_json::to_vec_pretty(state).map_err(storage_err)?;
    let tmp = self.path.with_extension("tmp");
    tokio::fs::write(&tmp, raw).await.map_err(storage_err)?;
    tokio::fs::rename(&tmp, &self.path)
      .await
      .map_err(storage_err)
  }

  async fn update<F: FnOnce(&mut CrlState)>(&self, f: F) -> Result<(), Error> {
    let _guard = self.lock.lock().await;
    let mut state = self.load().await?;
    f(&mut state);
    self.store(&state).await
  }
}

#[async_trait]
impl CrlRepository for FileCrlStore {
  async fn crl_entries(&self) -> Result<Vec<CrlEntry>, Error> {
    let _guard = self.lock.lock().await;
    Ok(self.load().await?.entries)
  }

  async fn add_or_update_crl(
    &self,
    url: &str,
    expiration: u64,
  ) -> Result<(), Error> {
    self.update(|state| state.upsert(url, expiration)).await
  }

  async fn last_check_instant(&self) -> Result<Option<DateTime<Utc>>, Error> {
    let _guard = self.lock.lock().await;
    Ok(self.load().await?.last_check)
  }

  async fn set_last_check_instant(&self, at: DateTime<Utc>) -> Result<(), Error> {
    self.update(|state| state.last_check = Some(at)).await
  }
}
