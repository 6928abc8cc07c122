use crate::error::*;
use chrono::DateTime;
use chrono::Utc;
use reqwest::header::HeaderMap;
use serde::Deserialize;
use serde::Serialize;

pub(crate) const REPLAY_NONCE: &str = "replay-nonce";

/// A single-use anti-replay token.
///
/// Not `Clone`. Every ACME call takes the nonce it is given by value and
/// hands back exactly one fresh nonce.
#[derive(Serialize, Deserialize, Eq, PartialEq)]
#[serde(transparent)]
pub struct Nonce(String);

impl Nonce {
  pub fn new(value: impl Into<String>) -> Self {
    Nonce(value.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn into_inner(self) -> String {
    self.0
  }
}

impl std::fmt::Debug for Nonce {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str("Nonce(..)")
  }
}

/// Source of wall-clock time for the background workers.
pub trait Clock: Send + Sync {
  fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] reading the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

pub(crate) fn b64(data: &[u8]) -> String {
  data_encoding::BASE64URL_NOPAD.encode(data)
}

/// Serde adapter storing opaque byte blobs as unpadded base64url strings.
pub(crate) mod base64url {
  use serde::de::Error as _;
  use serde::Deserialize;
  use serde::Deserializer;
  use serde::Serializer;

  pub fn serialize<S: Serializer>(
    data: &[u8],
    serializer: S,
  ) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&super::b64(data))
  }

  pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
  ) -> Result<Vec<u8>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    data_encoding::BASE64URL_NOPAD
      .decode(raw.as_bytes())
      .map_err(D::Error::custom)
  }
}

pub(crate) fn extract_nonce(headers: &HeaderMap) -> Result<Option<Nonce>, Error> {
  match headers.get(REPLAY_NONCE) {
    Some(hv) => Ok(Some(Nonce::new(map_transport_err(hv.to_str())?))),
    None => Ok(None),
  }
}

pub(crate) fn require_nonce(headers: &HeaderMap) -> Result<Nonce, Error> {
  extract_nonce(headers)?
    .ok_or_else(|| transport_err("response must carry a replay-nonce header"))
}

pub(crate) fn extract_location(
  headers: &HeaderMap,
) -> Result<Option<String>, Error> {
  match headers.get(reqwest::header::LOCATION) {
    Some(hv) => Ok(Some(map_transport_err(hv.to_str())?.to_string())),
    None => Ok(None),
  }
}
