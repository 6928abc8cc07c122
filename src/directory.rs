use crate::error::*;
use serde::Deserialize;
use serde::Serialize;

/// The subset of the ACME directory document an enrollment needs.
///
/// Fetched once per enrollment session and never persisted.
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AcmeDirectory {
  pub new_nonce: String,
  pub new_account: String,
  pub new_order: String,
}

impl AcmeDirectory {
  /// Parse the raw directory document returned by the ACME server.
  ///
  /// Unknown fields (`revokeCert`, `keyChange`, `meta`, ...) are ignored.
  /// A problem document in place of a directory is surfaced as
  /// [`Error::Server`].
  pub fn parse(raw: &[u8]) -> Result<AcmeDirectory, Error> {
    let res: ServerResult<AcmeDirectory> = serde_json::from_slice(raw)?;
    let res: Result<AcmeDirectory, Error> = res.into();
    let directory = res?;

    if directory.new_nonce.is_empty()
      || directory.new_account.is_empty()
      || directory.new_order.is_empty()
    {
      return Err(Error::Validation("the ACME directory is missing endpoints"));
    }

    Ok(directory)
  }
}
