use serde::Deserialize;

/// Coarse classification of an [`Error`], used by the background workers to
/// tell ordinary fetch failures apart from local corruption signals.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ErrorKind {
  /// No connectivity, 5xx server error, timeout.
  Network,
  /// Challenge rejected, order not ready, malformed response, 4xx problem
  /// document.
  Protocol,
  /// Key generation, CSR signing, group rotation.
  Crypto,
  /// CRL or feature flag persistence.
  Storage,
  /// The E2EI feature (or MLS) is switched off.
  Disabled,
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
  #[error("validation error: {0}")]
  Validation(&'static str),

  #[error("the order is not ready to be finalized")]
  OrderNotReady,

  #[error("the {challenge} challenge was rejected with status {status}")]
  ChallengeRejected {
    challenge: &'static str,
    status: String,
  },

  #[error("the step `{0}` timed out")]
  Timeout(&'static str),

  #[error("end-to-end identity is disabled")]
  Disabled,

  #[error(transparent)]
  Server(#[from] ServerError),

  #[error(transparent)]
  Transport(Box<dyn std::error::Error + Send + Sync>),

  #[error("malformed response: {0}")]
  Malformed(Box<dyn std::error::Error + Send + Sync>),

  #[error("crypto error: {0}")]
  Crypto(Box<dyn std::error::Error + Send + Sync>),

  #[error("storage error: {0}")]
  Storage(Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Error::Server(err) if err.is_client_error() => ErrorKind::Protocol,
      Error::Transport(_) | Error::Server(_) | Error::Timeout(_) => {
        ErrorKind::Network
      }
      Error::Validation(_)
      | Error::Malformed(_)
      | Error::OrderNotReady
      | Error::ChallengeRejected { .. } => ErrorKind::Protocol,
      Error::Crypto(_) => ErrorKind::Crypto,
      Error::Storage(_) => ErrorKind::Storage,
      Error::Disabled => ErrorKind::Disabled,
    }
  }

  /// Whether the caller may retry the whole phase that produced this error.
  pub fn is_retryable(&self) -> bool {
    match self {
      Error::OrderNotReady => true,
      _ => self.kind() == ErrorKind::Network,
    }
  }
}

#[derive(Debug, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(&'static str);

pub fn transport_err(msg: &'static str) -> Error {
  Error::Transport(Box::new(TransportError(msg)))
}

pub fn map_transport_err<T, E: std::error::Error + Send + Sync + 'static>(
  res: Result<T, E>,
) -> Result<T, Error> {
  res.map_err(|err| Error::Transport(Box::new(err)))
}

pub fn crypto_err<E: std::error::Error + Send + Sync + 'static>(
  err: E,
) -> Error {
  Error::Crypto(Box::new(err))
}

pub fn storage_err<E: std::error::Error + Send + Sync + 'static>(
  err: E,
) -> Error {
  Error::Storage(Box::new(err))
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self {
    if err.is_decode() {
      Self::Malformed(Box::new(err))
    } else {
      Self::Transport(Box::new(err))
    }
  }
}

/// Decoding failures of a server payload.
impl From<serde_json::Error> for Error {
  fn from(err: serde_json::Error) -> Self {
    Self::Malformed(Box::new(err))
  }
}

impl From<openssl::error::ErrorStack> for Error {
  fn from(err: openssl::error::ErrorStack) -> Self {
    Self::Crypto(Box::new(err))
  }
}

/// Log a failure swallowed by a background worker. Local corruption
/// (crypto or storage) is logged as an error, everything else as a warning.
pub(crate) fn report_worker_failure(worker: &'static str, err: &Error) {
  match err.kind() {
    ErrorKind::Crypto | ErrorKind::Storage => {
      tracing::error!(worker, kind = ?err.kind(), error = %err, "E2EI background task failed")
    }
    ErrorKind::Disabled => {
      tracing::debug!(worker, "E2EI is disabled, nothing to do")
    }
    ErrorKind::Network | ErrorKind::Protocol => {
      tracing::warn!(worker, kind = ?err.kind(), error = %err, "E2EI background task failed")
    }
  }
}

/// The result of an operation that can return a [`ServerError`].
#[derive(Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum ServerResult<T> {
  Ok(T),
  Err(ServerError),
}

impl<T> From<ServerResult<T>> for Result<T, Error> {
  fn from(res: ServerResult<T>) -> Self {
    match res {
      ServerResult::Ok(t) => Ok(t),
      ServerResult::Err(err) => Err(err.into()),
    }
  }
}

/// This is an error as returned by the ACME server or the backend.
#[derive(Deserialize, Debug, Clone, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("ServerError({}): {}: {}", r#type.clone().unwrap_or_default(), title.clone().unwrap_or_default(), detail.clone().unwrap_or_default())]
pub struct ServerError {
  /// The type of this error.
  pub r#type: Option<String>,
  /// The human readable title of this error.
  pub title: Option<String>,
  /// The status code of this error.
  pub status: Option<u16>,
  /// The human readable extra description for this error.
  pub detail: Option<String>,
}

impl ServerError {
  /// A 4xx problem document: the request itself was wrong, sending it again
  /// will not help.
  pub fn is_client_error(&self) -> bool {
    self.status.map_or(false, |status| (400..500).contains(&status))
  }
}
